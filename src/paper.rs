//! Paper records and the aggregate result set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder for fields that could not be extracted.
pub const SENTINEL: &str = "N/A";

/// A single bibliographic record.
///
/// Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    /// 1-based rank in the overall search result ordering
    pub number: usize,
    pub title: String,
    #[serde(default = "sentinel")]
    pub authors: String,
    #[serde(default = "sentinel")]
    pub year: String,
    #[serde(default = "sentinel")]
    pub venue: String,
    #[serde(default)]
    pub citations: u32,
    #[serde(rename = "abstract", default = "sentinel")]
    pub abstract_text: String,
    #[serde(default = "sentinel")]
    pub url: String,
}

fn sentinel() -> String {
    SENTINEL.to_string()
}

/// Turn an optional, possibly blank, field into its value or [`SENTINEL`].
pub fn or_sentinel(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(sentinel)
}

impl Paper {
    pub fn has_abstract(&self) -> bool {
        self.abstract_text != SENTINEL
    }

    pub fn has_url(&self) -> bool {
        self.url != SENTINEL
    }

    /// One-line progress summary, title cut to `width` characters.
    pub fn progress_line(&self, width: usize) -> String {
        let title: String = self.title.chars().take(width).collect();
        format!(
            "[{}] {}... ({}) - {} citations",
            self.number, title, self.year, self.citations
        )
    }
}

/// All papers collected so far, keyed by sequence number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    papers: BTreeMap<usize, Paper>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay `papers`; an incoming record replaces one with the same number.
    pub fn merge<I>(&mut self, papers: I)
    where
        I: IntoIterator<Item = Paper>,
    {
        for paper in papers {
            self.papers.insert(paper.number, paper);
        }
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    pub fn get(&self, number: usize) -> Option<&Paper> {
        self.papers.get(&number)
    }

    /// Papers in ascending sequence-number order.
    pub fn iter(&self) -> impl Iterator<Item = &Paper> {
        self.papers.values()
    }

    pub fn to_vec(&self) -> Vec<Paper> {
        self.papers.values().cloned().collect()
    }
}

impl FromIterator<Paper> for ResultSet {
    fn from_iter<I: IntoIterator<Item = Paper>>(iter: I) -> Self {
        let mut set = ResultSet::new();
        set.merge(iter);
        set
    }
}

#[cfg(test)]
pub(crate) fn sample_paper(number: usize, title: &str) -> Paper {
    Paper {
        number,
        title: title.to_string(),
        authors: "A Author, B Author".to_string(),
        year: "2019".to_string(),
        venue: "Language Testing".to_string(),
        citations: 12,
        abstract_text: SENTINEL.to_string(),
        url: SENTINEL.to_string(),
    }
}
