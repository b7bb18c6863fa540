//! One collection run: checkpoint reconciliation, fetch, merge, write.
//!
//! [`Session::plan`] decides where this run starts without touching the
//! network, so the caller can skip opening a backend when nothing is left.
//! [`Session::execute`] then fetches the chunk and writes every output.

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::KeywordConfig;
use crate::error::Result;
use crate::extract::Extractor;
use crate::fetch::{fetch_chunk, ChunkRequest, Pacing, StopReason};
use crate::output::{append_csv, read_snapshot, remove_files, rotate_file, write_snapshot, OutputPaths};
use crate::paper::ResultSet;
use crate::query::{build_query, KeywordFilter};
use crate::report::write_report;
use crate::source::ResultSource;
use tracing::{info, warn};

/// Everything a run needs to know.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub keywords: KeywordConfig,
    pub chunk_size: usize,
    pub max_results: usize,
    pub pacing: Pacing,
    /// Enforce AND of both keyword groups on title + abstract
    pub keyword_filter: bool,
    /// Delete checkpoint and outputs before planning
    pub reset: bool,
    pub paths: OutputPaths,
}

/// Where the run starts and what was collected before.
#[derive(Debug, Clone)]
pub struct PendingRun {
    pub request: ChunkRequest,
    pub existing: ResultSet,
    pub resumed: bool,
}

/// Outcome of [`Session::plan`].
#[derive(Debug, Clone)]
pub enum Plan {
    Fetch(PendingRun),
    /// `max_results` already reached; nothing to fetch or write
    NothingRemaining { next_index: usize },
}

/// What a finished run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub new_papers: usize,
    pub total_papers: usize,
    pub next_index: usize,
    pub completed: bool,
    pub stop: StopReason,
}

pub struct Session {
    config: SessionConfig,
    query: String,
    store: CheckpointStore,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let query = build_query(&config.keywords);
        let store = CheckpointStore::new(config.paths.checkpoint.clone());
        Self {
            config,
            query,
            store,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Reconcile the checkpoint with the active configuration.
    pub fn plan(&self) -> Result<Plan> {
        let paths = &self.config.paths;

        if self.config.reset {
            let [json, csv, report] = paths.outputs();
            remove_files(&[&paths.checkpoint, json, csv, report]);
        }

        let checkpoint = self.store.load();
        let resume = checkpoint
            .as_ref()
            .is_some_and(|c| c.is_compatible(&self.query, &self.config.keywords));

        let mut existing = ResultSet::new();
        let mut start = 1;

        if resume {
            existing = read_snapshot(&paths.json).into_iter().collect();
            start = checkpoint.as_ref().map_or(1, |c| c.next_index.max(1));
            info!(start, stored = existing.len(), "Resuming from paper number {}", start);
        } else if checkpoint.is_some() {
            for path in paths.outputs() {
                rotate_file(path);
            }
            if let Err(e) = self.store.clear() {
                warn!("Could not remove stale checkpoint: {}", e);
            }
        } else if paths.json.exists() || paths.csv.exists() {
            warn!(
                "Outputs from a previous run remain on disk. Use --reset to discard them \
                 before collecting new keywords."
            );
        }

        if start > self.config.max_results {
            info!(next_index = start, "Maximum result limit already reached");
            return Ok(Plan::NothingRemaining { next_index: start });
        }

        let remaining = self.config.max_results - (start - 1);
        let chunk = self.config.chunk_size.min(remaining);
        let request = ChunkRequest::new(start, start + chunk - 1);

        Ok(Plan::Fetch(PendingRun {
            request,
            existing,
            resumed: resume,
        }))
    }

    /// Fetch the planned chunk, merge, and write all outputs and the checkpoint.
    pub async fn execute<S: ResultSource>(
        &self,
        run: PendingRun,
        source: &mut S,
    ) -> Result<RunSummary> {
        let extractor = Extractor::new()?;
        let filter = self
            .config
            .keyword_filter
            .then(|| KeywordFilter::new(&self.config.keywords));

        let PendingRun {
            request,
            existing: mut merged,
            ..
        } = run;

        info!(
            start = request.start,
            end = request.end,
            "Fetching papers {} through {}",
            request.start,
            request.end
        );

        let outcome = fetch_chunk(
            source,
            request,
            &extractor,
            filter.as_ref(),
            &self.config.pacing,
        )
        .await?;

        merged.merge(outcome.papers.iter().cloned());
        let paths = &self.config.paths;

        write_snapshot(&paths.json, &merged.to_vec(), &self.query)?;
        append_csv(&paths.csv, &outcome.papers)?;
        write_report(&paths.report, &merged, &self.query)?;

        let next_index = if outcome.last_index >= request.start {
            outcome.last_index + 1
        } else {
            request.start
        };
        let completed =
            outcome.stop == StopReason::Exhausted || next_index > self.config.max_results;

        self.store.save(&Checkpoint::new(
            &self.query,
            &self.config.keywords,
            self.config.chunk_size,
            self.config.max_results,
            next_index,
            completed,
        ))?;

        Ok(RunSummary {
            new_papers: outcome.papers.len(),
            total_papers: merged.len(),
            next_index,
            completed,
            stop: outcome.stop,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScholarError;
    use crate::paper::sample_paper;
    use crate::source::scripted::{entry, ScriptedSource, Step};
    use tempfile::TempDir;

    fn ita_keywords() -> KeywordConfig {
        KeywordConfig {
            ita_keywords: vec!["ITA".to_string()],
            assessment_keywords: vec!["rubric*".to_string()],
            exclusions: Vec::new(),
        }
    }

    fn config(dir: &TempDir, chunk_size: usize, max_results: usize) -> SessionConfig {
        SessionConfig {
            keywords: ita_keywords(),
            chunk_size,
            max_results,
            pacing: Pacing::none(),
            keyword_filter: true,
            reset: false,
            paths: OutputPaths::in_dir(dir.path()),
        }
    }

    fn matching(count: usize) -> ScriptedSource {
        let titles: Vec<String> = (1..=count).map(|i| format!("ITA rubric study {}", i)).collect();
        let items: Vec<(&str, &str)> = titles.iter().map(|t| (t.as_str(), "")).collect();
        ScriptedSource::from_titles(&items)
    }

    fn expect_fetch(plan: Plan) -> PendingRun {
        match plan {
            Plan::Fetch(run) => run,
            Plan::NothingRemaining { next_index } => {
                panic!("expected a fetch, got nothing remaining at {}", next_index)
            }
        }
    }

    async fn run_once(session: &Session, source: &mut ScriptedSource) -> Result<RunSummary> {
        let run = expect_fetch(session.plan()?);
        session.execute(run, source).await
    }

    #[tokio::test]
    async fn test_filtered_chunk_scenario() -> Result<()> {
        let dir = TempDir::new()?;
        let session = Session::new(config(&dir, 2, 2));
        assert_eq!(session.query(), r#"("ITA") AND ("rubric*")"#);

        let mut source = ScriptedSource::from_titles(&[
            ("ITA rubric design", ""),
            ("ITA classroom talk", ""),
            ("Rubrics for ITAs", ""),
        ]);
        let summary = run_once(&session, &mut source).await?;

        assert_eq!(summary.new_papers, 2);
        assert_eq!(summary.next_index, 4);
        assert!(summary.completed);

        let papers = read_snapshot(&session.config().paths.json);
        let numbers: Vec<usize> = papers.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 3]);

        let checkpoint = session.store.load().expect("checkpoint written");
        assert_eq!(checkpoint.next_index, 4);
        assert_eq!(checkpoint.query, session.query());
        Ok(())
    }

    #[tokio::test]
    async fn test_nothing_remaining_does_not_write() -> Result<()> {
        let dir = TempDir::new()?;
        let session = Session::new(config(&dir, 5, 10));
        session.store.save(&Checkpoint::new(
            session.query(),
            &ita_keywords(),
            5,
            10,
            11,
            true,
        ))?;

        match session.plan()? {
            Plan::NothingRemaining { next_index } => assert_eq!(next_index, 11),
            Plan::Fetch(_) => panic!("nothing should remain"),
        }
        assert!(!session.config().paths.json.exists());
        assert!(!session.config().paths.csv.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_consecutive_runs_are_additive() -> Result<()> {
        let dir = TempDir::new()?;
        let session = Session::new(config(&dir, 2, 100));

        let first = run_once(&session, &mut matching(10)).await?;
        assert_eq!(first.next_index, 3);
        assert!(!first.completed);

        let mut source = matching(10);
        let run = expect_fetch(session.plan()?);
        assert!(run.resumed);
        assert_eq!(run.request, ChunkRequest::new(3, 4));
        assert_eq!(run.existing.len(), 2);

        let second = session.execute(run, &mut source).await?;
        assert_eq!(second.new_papers, 2);
        assert_eq!(second.total_papers, 4);
        assert_eq!(second.next_index, 5);

        let csv = std::fs::read_to_string(&session.config().paths.csv)?;
        assert_eq!(csv.lines().count(), 5);
        assert_eq!(csv.matches("number,title").count(), 1);

        let report = std::fs::read_to_string(&session.config().paths.report)?;
        assert!(report.contains("Total Papers Found: 4"));
        Ok(())
    }

    #[tokio::test]
    async fn test_chunk_clamped_to_remaining_budget() -> Result<()> {
        let dir = TempDir::new()?;
        let session = Session::new(config(&dir, 50, 7));
        session.store.save(&Checkpoint::new(
            session.query(),
            &ita_keywords(),
            50,
            7,
            6,
            false,
        ))?;

        let run = expect_fetch(session.plan()?);
        assert_eq!(run.request, ChunkRequest::new(6, 7));
        Ok(())
    }

    #[tokio::test]
    async fn test_reset_starts_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let session = Session::new(config(&dir, 2, 100));
        run_once(&session, &mut matching(10)).await?;
        run_once(&session, &mut matching(10)).await?;
        assert_eq!(read_snapshot(&session.config().paths.json).len(), 4);

        let reset = Session::new(SessionConfig {
            reset: true,
            ..config(&dir, 2, 100)
        });
        let run = expect_fetch(reset.plan()?);
        assert!(!run.resumed);
        assert!(run.existing.is_empty());
        assert_eq!(run.request.start, 1);
        assert!(!reset.config().paths.checkpoint.exists());
        assert!(!reset.config().paths.csv.exists());

        let summary = reset.execute(run, &mut matching(10)).await?;
        assert_eq!(summary.total_papers, 2);
        let csv = std::fs::read_to_string(&reset.config().paths.csv)?;
        assert_eq!(csv.lines().count(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_changed_keywords_rotate_outputs() -> Result<()> {
        let dir = TempDir::new()?;
        let session = Session::new(config(&dir, 2, 100));
        run_once(&session, &mut matching(10)).await?;

        let mut edited = config(&dir, 2, 100);
        edited.keywords.assessment_keywords.push("oral proficiency".to_string());
        let changed = Session::new(edited);

        let run = expect_fetch(changed.plan()?);
        assert!(!run.resumed);
        assert!(run.existing.is_empty());
        assert!(!changed.config().paths.checkpoint.exists());
        assert!(!changed.config().paths.json.exists());

        let rotated = std::fs::read_dir(dir.path())?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".old-"))
            .count();
        assert_eq!(rotated, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_rate_limit_writes_nothing() -> Result<()> {
        let dir = TempDir::new()?;
        let session = Session::new(config(&dir, 5, 100));
        let mut source = ScriptedSource::new(vec![
            Step::Entry(entry("ITA rubric", "")),
            Step::RateLimit,
        ]);

        let result = run_once(&session, &mut source).await;
        assert!(matches!(result, Err(ScholarError::RateLimited(_))));
        assert!(!session.config().paths.json.exists());
        assert!(!session.config().paths.checkpoint.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_captcha_timeout_is_resumable() -> Result<()> {
        let dir = TempDir::new()?;
        let session = Session::new(config(&dir, 5, 100));
        let mut source = ScriptedSource::new(vec![
            Step::Entry(entry("ITA rubric", "")),
            Step::Blocked,
        ]);

        let summary = run_once(&session, &mut source).await?;
        assert_eq!(summary.stop, StopReason::CaptchaTimedOut);
        assert!(!summary.completed);
        assert_eq!(summary.next_index, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_exhausted_stream_completes() -> Result<()> {
        let dir = TempDir::new()?;
        let mut unfiltered = config(&dir, 10, 100);
        unfiltered.keyword_filter = false;
        let session = Session::new(unfiltered);

        let summary = run_once(&session, &mut ScriptedSource::from_titles(&[("any", "")])).await?;
        assert_eq!(summary.stop, StopReason::Exhausted);
        assert!(summary.completed);
        assert_eq!(summary.next_index, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_refetch_overwrites_by_number() -> Result<()> {
        let dir = TempDir::new()?;
        let session = Session::new(config(&dir, 2, 100));
        write_snapshot(
            &session.config().paths.json,
            &[sample_paper(1, "stale title"), sample_paper(7, "kept")],
            session.query(),
        )?;
        // JSON ahead of checkpoint: next run refetches 1 and overwrites it
        session.store.save(&Checkpoint::new(
            session.query(),
            &ita_keywords(),
            2,
            100,
            1,
            false,
        ))?;

        let summary = run_once(&session, &mut matching(5)).await?;
        assert_eq!(summary.total_papers, 3);

        let papers: ResultSet = read_snapshot(&session.config().paths.json)
            .into_iter()
            .collect();
        assert_eq!(
            papers.get(1).map(|p| p.title.as_str()),
            Some("ITA rubric study 1")
        );
        assert!(papers.get(7).is_some());
        Ok(())
    }
}
