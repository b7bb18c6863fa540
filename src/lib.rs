//! # itascholar
//!
//! Resumable Google Scholar harvester for literature on language assessment
//! of International Teaching Assistants.
//!
//! Each run collects one chunk of results for a fixed keyword query, merges
//! it into the papers already on disk, and records where the next run should
//! pick up.
//!
//! ## Modules
//!
//! - [`query`] - Boolean query string and keyword post-filter
//! - [`source`] - Result streams (plain HTTP, or Chrome with the `browser` feature)
//! - [`fetch`] - Chunked collection with pacing
//! - [`session`] - Checkpoint reconciliation and output writing
//! - [`cookies`] - Cookie persistence shared by both backends
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use itascholar::config::KeywordConfig;
//! use itascholar::fetch::Pacing;
//! use itascholar::output::OutputPaths;
//! use itascholar::session::{Plan, Session, SessionConfig};
//! use itascholar::source::http::{HttpOptions, HttpSource};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = Session::new(SessionConfig {
//!         keywords: KeywordConfig::default(),
//!         chunk_size: 50,
//!         max_results: 1000,
//!         pacing: Pacing::none(),
//!         keyword_filter: true,
//!         reset: false,
//!         paths: OutputPaths::default(),
//!     });
//!
//!     if let Plan::Fetch(run) = session.plan()? {
//!         let mut source = HttpSource::new(session.query(), &HttpOptions::default())?;
//!         let summary = session.execute(run, &mut source).await?;
//!         println!("Collected {} papers", summary.new_papers);
//!     }
//!     Ok(())
//! }
//! ```

pub mod captcha;
pub mod checkpoint;
pub mod config;
pub mod cookies;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod output;
pub mod paper;
pub mod query;
pub mod report;
pub mod session;
pub mod source;

pub use error::{Result, ScholarError};
