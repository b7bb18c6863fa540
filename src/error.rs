//! Custom error types for itascholar.
//!
//! All library functions return `Result<T, ScholarError>`. Only rate limiting
//! and bad configuration are meant to end a run; per-record problems are
//! logged and skipped where they happen.

use thiserror::Error;

/// Main error type for itascholar operations.
#[derive(Debug, Error)]
pub enum ScholarError {
    /// Browser automation error (Chrome / CDP)
    #[error("Browser error: {0}")]
    Browser(String),

    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// HTML parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Google Scholar throttled us. Never retried automatically.
    #[error("Rate limited by Google Scholar: {0}")]
    RateLimited(String),

    /// Upstream returned a non-success status
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Invalid run arguments
    #[error("Validation error: {0}")]
    Validation(String),
}

impl ScholarError {
    /// True for the throttling condition the operator must resolve by hand.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ScholarError::RateLimited(_))
    }
}

/// Result type alias using `ScholarError`
pub type Result<T> = std::result::Result<T, ScholarError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| ScholarError::Parse(msg.to_string()))
    }
}
