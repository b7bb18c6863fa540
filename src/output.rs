//! Output files: CSV rows, JSON snapshot, and housekeeping.
//!
//! The JSON snapshot always holds the full merged result set. The CSV only
//! ever receives the rows fetched by the current run.

use crate::error::Result;
use crate::paper::Paper;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CHECKPOINT_FILE: &str = "checkpoint.json";
pub const JSON_FILE: &str = "scholar_results.json";
pub const CSV_FILE: &str = "scholar_results.csv";
pub const REPORT_FILE: &str = "scholar_report.txt";

/// CSV column order
pub const CSV_COLUMNS: &[&str] = &[
    "number", "title", "authors", "year", "venue", "citations", "abstract", "url",
];

/// Locations of the checkpoint and the three outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub checkpoint: PathBuf,
    pub json: PathBuf,
    pub csv: PathBuf,
    pub report: PathBuf,
}

impl OutputPaths {
    /// Fixed file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            checkpoint: dir.join(CHECKPOINT_FILE),
            json: dir.join(JSON_FILE),
            csv: dir.join(CSV_FILE),
            report: dir.join(REPORT_FILE),
        }
    }

    /// The three result files, without the checkpoint.
    pub fn outputs(&self) -> [&Path; 3] {
        [&self.json, &self.csv, &self.report]
    }
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self::in_dir(Path::new("."))
    }
}

/// Delete files; failures are logged, not returned.
pub fn remove_files(paths: &[&Path]) {
    for path in paths {
        if !path.exists() {
            continue;
        }
        match std::fs::remove_file(path) {
            Ok(()) => info!("Removed stale file: {:?}", path),
            Err(e) => warn!("Could not delete {:?}: {}", path, e),
        }
    }
}

/// Rename `path` to `<stem>.old-<timestamp><ext>` if it exists.
///
/// Returns the new path, or `None` if there was nothing to rotate or the
/// rename failed (logged).
pub fn rotate_file(path: &Path) -> Option<PathBuf> {
    if !path.exists() {
        return None;
    }

    let stem = path.file_stem()?.to_string_lossy();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let timestamp = Local::now().format("%Y%m%d-%H%M%S");
    let rotated = path.with_file_name(format!("{}.old-{}{}", stem, timestamp, extension));

    match std::fs::rename(path, &rotated) {
        Ok(()) => {
            info!("Rotated {:?} to {:?}", path, rotated);
            Some(rotated)
        }
        Err(e) => {
            warn!("Could not rotate {:?}: {}", path, e);
            None
        }
    }
}

/// Search metadata stored alongside the papers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryInfo {
    pub search_query: String,
    pub search_date: String,
    pub total_papers: usize,
}

/// Layout of `scholar_results.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub query_info: QueryInfo,
    pub papers: Vec<Paper>,
}

/// Papers from an earlier snapshot; empty if missing or unreadable (logged).
pub fn read_snapshot(path: &Path) -> Vec<Paper> {
    if !path.exists() {
        return Vec::new();
    }

    let parsed = std::fs::read_to_string(path)
        .map_err(crate::error::ScholarError::from)
        .and_then(|content| Ok(serde_json::from_str::<Snapshot>(&content)?));

    match parsed {
        Ok(snapshot) => snapshot.papers,
        Err(e) => {
            warn!("Could not read {:?}: {}", path, e);
            Vec::new()
        }
    }
}

/// Rewrite the snapshot with the full merged set.
pub fn write_snapshot(path: &Path, papers: &[Paper], query: &str) -> Result<()> {
    let snapshot = Snapshot {
        query_info: QueryInfo {
            search_query: query.to_string(),
            search_date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            total_papers: papers.len(),
        },
        papers: papers.to_vec(),
    };

    std::fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
    info!(papers = papers.len(), "Saved JSON data to {:?}", path);
    Ok(())
}

/// Append rows; the header is written only into an absent or empty file.
pub fn append_csv(path: &Path, papers: &[Paper]) -> Result<()> {
    if papers.is_empty() {
        return Ok(());
    }

    let write_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(write_header)
        .from_writer(file);

    for paper in papers {
        wtr.serialize(paper)?;
    }
    wtr.flush()?;

    info!("Appended {} rows to {:?}", papers.len(), path);
    Ok(())
}
