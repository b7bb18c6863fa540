//! Resume checkpoint.
//!
//! A small JSON file recording which query was being collected and where the
//! next run should start. It is only trusted when the query string and both
//! keyword lists still match the active configuration.

use crate::config::KeywordConfig;
use crate::error::Result;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Persisted resume state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub query: String,
    pub ita_keywords: Vec<String>,
    pub assessment_keywords: Vec<String>,
    pub chunk_size: usize,
    pub max_results: usize,
    /// Sequence number the next run starts from
    pub next_index: usize,
    pub last_updated: NaiveDateTime,
    #[serde(default)]
    pub completed: bool,
}

impl Checkpoint {
    pub fn new(
        query: &str,
        keywords: &KeywordConfig,
        chunk_size: usize,
        max_results: usize,
        next_index: usize,
        completed: bool,
    ) -> Self {
        Self {
            query: query.to_string(),
            ita_keywords: keywords.ita_keywords.clone(),
            assessment_keywords: keywords.assessment_keywords.clone(),
            chunk_size,
            max_results,
            next_index,
            last_updated: Local::now().naive_local(),
            completed,
        }
    }

    /// True only if the stored query and both keyword lists are unchanged.
    pub fn is_compatible(&self, query: &str, keywords: &KeywordConfig) -> bool {
        if self.query != query {
            info!("Keyword expression changed since the last run; will start fresh.");
            return false;
        }
        if self.ita_keywords != keywords.ita_keywords
            || self.assessment_keywords != keywords.assessment_keywords
        {
            info!("Keyword lists were edited; will start a new search.");
            return false;
        }
        true
    }
}

/// Checkpoint file on disk
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint.
    ///
    /// A missing or unreadable file is logged and reported as `None`.
    pub fn load(&self) -> Option<Checkpoint> {
        if !self.path.exists() {
            debug!("Checkpoint not found: {:?}", self.path);
            return None;
        }

        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<Checkpoint>(&content) {
                Ok(checkpoint) => Some(checkpoint),
                Err(e) => {
                    warn!("Could not parse checkpoint at {:?}: {}", self.path, e);
                    None
                }
            },
            Err(e) => {
                warn!("Could not load checkpoint at {:?}: {}", self.path, e);
                None
            }
        }
    }

    /// Overwrite the checkpoint file.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let content = serde_json::to_string_pretty(checkpoint)?;
        std::fs::write(&self.path, content)?;
        info!(next_index = checkpoint.next_index, "Checkpoint updated at {:?}", self.path);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            info!("Removed checkpoint at {:?}", self.path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn keywords() -> KeywordConfig {
        KeywordConfig {
            ita_keywords: vec!["ITA".to_string()],
            assessment_keywords: vec!["rubric*".to_string()],
            exclusions: Vec::new(),
        }
    }

    #[test]
    fn test_load_missing() {
        let store = CheckpointStore::new("/nonexistent/checkpoint.json");
        assert!(store.load().is_none());
    }

    #[test]
    fn test_save_load_clear() -> Result<()> {
        let dir = TempDir::new()?;
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        let checkpoint = Checkpoint::new("q", &keywords(), 50, 1000, 51, false);

        store.save(&checkpoint)?;
        assert_eq!(store.load(), Some(checkpoint));

        store.clear()?;
        assert!(store.load().is_none());
        store.clear()?;
        Ok(())
    }

    #[test]
    fn test_corrupt_file_is_absent() -> Result<()> {
        let dir = TempDir::new()?;
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        std::fs::write(store.path(), "{ not json")?;
        assert!(store.load().is_none());
        Ok(())
    }

    #[test]
    fn test_reads_python_era_timestamps() {
        let json = r#"{
            "query": "q",
            "ita_keywords": ["ITA"],
            "assessment_keywords": ["rubric*"],
            "chunk_size": 50,
            "max_results": 1000,
            "next_index": 101,
            "last_updated": "2024-03-01T14:22:05.123456",
            "completed": false
        }"#;
        let checkpoint: Checkpoint = serde_json::from_str(json).expect("valid checkpoint");
        assert_eq!(checkpoint.next_index, 101);
    }

    #[test]
    fn test_compatibility() {
        let config = keywords();
        let checkpoint = Checkpoint::new("q", &config, 50, 1000, 51, false);

        assert!(checkpoint.is_compatible("q", &config));
        assert!(!checkpoint.is_compatible("other", &config));

        let mut edited = config.clone();
        edited.ita_keywords.push("International teaching assistant*".to_string());
        assert!(!checkpoint.is_compatible("q", &edited));

        let mut edited = config.clone();
        edited.assessment_keywords = vec!["rubrics".to_string()];
        assert!(!checkpoint.is_compatible("q", &edited));

        // Exclusions are only reflected through the query string
        let mut edited = config;
        edited.exclusions.push("Italian".to_string());
        assert!(checkpoint.is_compatible("q", &edited));
    }
}
