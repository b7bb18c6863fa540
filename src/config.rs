//! Run configuration.
//!
//! Keyword lists and run limits are plain values handed to each component,
//! so tests can build any combination without touching global state.

use crate::error::{Result, ScholarError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// ITA-related keywords. A trailing `*` marks a prefix match.
pub const DEFAULT_ITA_KEYWORDS: &[&str] = &[
    "ITA",
    "Foreign teaching assistant*",
    "International teaching assistant*",
    "Non-native teaching assistant*",
];

/// Assessment-related keywords.
pub const DEFAULT_ASSESSMENT_KEYWORDS: &[&str] = &[
    "speaking assessment*",
    "rubric*",
    "language proficiency",
    "oral proficiency",
    "language assessment",
    "accent assessment",
    "intelligibility assessment",
];

/// Terms excluded from the query so "ITA" is not read as Italian.
pub const DEFAULT_EXCLUSIONS: &[&str] = &["Italian", "lingua"];

/// Total papers collected across all runs
pub const DEFAULT_MAX_RESULTS: usize = 1000;

/// Cap applied to both chunk size and max results under `--test`
pub const TEST_MODE_LIMIT: usize = 10;

/// The two keyword groups and the exclusion terms of a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordConfig {
    pub ita_keywords: Vec<String>,
    pub assessment_keywords: Vec<String>,
    #[serde(default)]
    pub exclusions: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            ita_keywords: to_owned(DEFAULT_ITA_KEYWORDS),
            assessment_keywords: to_owned(DEFAULT_ASSESSMENT_KEYWORDS),
            exclusions: to_owned(DEFAULT_EXCLUSIONS),
        }
    }
}

impl KeywordConfig {
    /// Load keyword lists from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScholarError::Config(format!("Cannot read keyword file {:?}: {}", path, e))
        })?;
        let config: KeywordConfig = serde_json::from_str(&content)?;

        if config.ita_keywords.is_empty() || config.assessment_keywords.is_empty() {
            return Err(ScholarError::Config(
                "Both keyword groups need at least one keyword".to_string(),
            ));
        }

        info!(
            path = ?path,
            ita = config.ita_keywords.len(),
            assessment = config.assessment_keywords.len(),
            "Loaded keyword lists"
        );
        Ok(config)
    }
}

fn to_owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

/// Chunk and pacing limits of a single invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunLimits {
    /// Accepted papers to collect per run
    pub chunk_size: usize,
    /// Total papers across all runs
    pub max_results: usize,
    /// Minimum pause between requests, in seconds
    pub min_delay: f64,
    /// Maximum pause between requests, in seconds
    pub max_delay: f64,
}

impl RunLimits {
    /// Reject values the fetch loop cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ScholarError::Validation(
                "Chunk size must be a positive integer.".to_string(),
            ));
        }
        if self.max_results == 0 {
            return Err(ScholarError::Validation(
                "Max results must be a positive integer.".to_string(),
            ));
        }
        if !self.min_delay.is_finite() || !self.max_delay.is_finite() {
            return Err(ScholarError::Validation(
                "Delays must be finite numbers.".to_string(),
            ));
        }
        if self.min_delay < 0.0 || self.max_delay < 0.0 {
            return Err(ScholarError::Validation(
                "Delays must be non-negative.".to_string(),
            ));
        }
        if Duration::try_from_secs_f64(self.min_delay).is_err()
            || Duration::try_from_secs_f64(self.max_delay).is_err()
        {
            return Err(ScholarError::Validation(
                "Delays are too large.".to_string(),
            ));
        }
        if self.min_delay > self.max_delay {
            return Err(ScholarError::Validation(
                "Minimum delay cannot exceed maximum delay.".to_string(),
            ));
        }
        Ok(())
    }

    /// Cap chunk size and max results for a quick verification run.
    pub fn into_test_mode(self) -> Self {
        Self {
            chunk_size: self.chunk_size.min(TEST_MODE_LIMIT),
            max_results: self.max_results.min(TEST_MODE_LIMIT),
            ..self
        }
    }

    /// Valid after [`RunLimits::validate`]; out-of-range values saturate.
    pub fn min_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.min_delay).unwrap_or(Duration::MAX)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_delay).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn limits() -> RunLimits {
        RunLimits {
            chunk_size: 50,
            max_results: 1000,
            min_delay: 0.5,
            max_delay: 1.3,
        }
    }

    #[test]
    fn test_valid_limits() {
        assert!(limits().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_limits() {
        let cases = [
            RunLimits { chunk_size: 0, ..limits() },
            RunLimits { max_results: 0, ..limits() },
            RunLimits { min_delay: -1.0, ..limits() },
            RunLimits { min_delay: 2.0, max_delay: 1.0, ..limits() },
            RunLimits { max_delay: f64::NAN, ..limits() },
            RunLimits { max_delay: 1e30, ..limits() },
            RunLimits { min_delay: 1e30, max_delay: 1e30, ..limits() },
        ];
        for case in cases {
            assert!(
                matches!(case.validate(), Err(ScholarError::Validation(_))),
                "{:?} should be rejected",
                case
            );
        }
    }

    #[test]
    fn test_test_mode_caps() {
        let capped = limits().into_test_mode();
        assert_eq!(capped.chunk_size, 10);
        assert_eq!(capped.max_results, 10);

        let small = RunLimits { chunk_size: 3, ..limits() }.into_test_mode();
        assert_eq!(small.chunk_size, 3);
    }

    #[test]
    fn test_default_keywords() {
        let config = KeywordConfig::default();
        assert_eq!(config.ita_keywords[0], "ITA");
        assert_eq!(config.assessment_keywords.len(), 7);
        assert_eq!(config.exclusions, vec!["Italian", "lingua"]);
    }

    #[test]
    fn test_keyword_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(
            file,
            r#"{{"ita_keywords": ["ITA"], "assessment_keywords": ["rubric*"]}}"#
        )?;

        let config = KeywordConfig::from_file(file.path())?;
        assert_eq!(config.ita_keywords, vec!["ITA"]);
        assert!(config.exclusions.is_empty());
        Ok(())
    }

    #[test]
    fn test_keyword_file_rejects_empty_group() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(file, r#"{{"ita_keywords": [], "assessment_keywords": ["x"]}}"#)?;
        assert!(KeywordConfig::from_file(file.path()).is_err());
        Ok(())
    }
}
