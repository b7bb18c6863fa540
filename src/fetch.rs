//! Chunked fetch loop.
//!
//! Walks the ordered result stream from the start, discards positions an
//! earlier run already stored, then collects accepted papers until the chunk
//! is full or the stream ends. Records dropped by extraction or by the
//! keyword filter do not count toward the chunk.

use crate::error::Result;
use crate::extract::Extractor;
use crate::paper::Paper;
use crate::query::KeywordFilter;
use crate::source::{Pulled, ResultSource, ResultStream, StreamEnd, RESULTS_PER_PAGE};
use rand::Rng;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Random pause between consecutive result fetches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// No pauses at all.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn is_disabled(&self) -> bool {
        self.max.is_zero()
    }

    /// Duration of the next pause, uniform in `[min, max]`.
    pub fn next_delay(&self) -> Duration {
        if self.is_disabled() {
            return Duration::ZERO;
        }
        if self.max <= self.min {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }

    pub async fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "Pacing");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Inclusive range of sequence numbers a run asks for.
///
/// `end - start + 1` is the number of accepted papers the chunk can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRequest {
    pub start: usize,
    pub end: usize,
}

impl ChunkRequest {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn capacity(&self) -> usize {
        (self.end + 1).saturating_sub(self.start)
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The chunk holds `capacity` accepted papers
    Filled,
    /// The stream has no more results
    Exhausted,
    /// A CAPTCHA was not solved in time
    CaptchaTimedOut,
    /// `start > end`; nothing was requested
    EmptyRange,
}

/// Papers collected by one chunk and how far the stream was walked.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutcome {
    pub papers: Vec<Paper>,
    /// Position of the last raw result consumed (`start - 1` if none)
    pub last_index: usize,
    pub stop: StopReason,
}

impl ChunkOutcome {
    /// True when the loop stopped before the chunk was full.
    pub fn exhausted(&self) -> bool {
        matches!(self.stop, StopReason::Exhausted | StopReason::CaptchaTimedOut)
    }
}

impl From<StreamEnd> for StopReason {
    fn from(end: StreamEnd) -> Self {
        match end {
            StreamEnd::Exhausted => StopReason::Exhausted,
            StreamEnd::Blocked => StopReason::CaptchaTimedOut,
        }
    }
}

/// Collect up to `request.capacity()` accepted papers.
///
/// With a `filter`, a paper is accepted only if its title and abstract match
/// both keyword groups. Rate limiting from the source is returned as an
/// error immediately; nothing collected so far is kept.
pub async fn fetch_chunk<S: ResultSource>(
    source: &mut S,
    request: ChunkRequest,
    extractor: &Extractor,
    filter: Option<&KeywordFilter>,
    pacing: &Pacing,
) -> Result<ChunkOutcome> {
    let start = request.start.max(1);
    let capacity = request.capacity();

    if capacity == 0 {
        return Ok(ChunkOutcome {
            papers: Vec::new(),
            last_index: start - 1,
            stop: StopReason::EmptyRange,
        });
    }

    let mut stream = ResultStream::new(source);
    let mut papers = Vec::with_capacity(capacity.min(RESULTS_PER_PAGE * 10));

    if let Some(end) = stream.skip_until(start).await.inspect_err(log_throttle)? {
        info!(reached = stream.position(), "Stream ended before the resume point");
        return Ok(ChunkOutcome {
            papers,
            last_index: stream.position(),
            stop: end.into(),
        });
    }

    let stop = loop {
        let (index, raw) = match stream.next().await.inspect_err(log_throttle)? {
            Pulled::Record(index, raw) => (index, raw),
            Pulled::End(end) => break StopReason::from(end),
        };

        match extractor.extract(raw, index) {
            Some(paper) if filter.map_or(true, |f| f.accepts(&paper.title, &paper.abstract_text)) => {
                info!("{}", paper.progress_line(80));
                papers.push(paper);
            }
            Some(paper) => {
                debug!(index, title = %paper.title, "Dropped: does not match both keyword groups");
            }
            None => {}
        }

        if papers.len() >= capacity {
            break StopReason::Filled;
        }
        pacing.pause().await;
    };

    let last_index = stream.position().max(start - 1);
    if stop == StopReason::CaptchaTimedOut {
        warn!(last_index, "Stopped early: CAPTCHA was not solved");
    }

    Ok(ChunkOutcome {
        papers,
        last_index,
        stop,
    })
}

fn log_throttle(e: &crate::error::ScholarError) {
    if e.is_rate_limit() {
        error!(
            error = %e,
            "Google Scholar throttling detected. Switch VPN/proxy and retry the same chunk."
        );
    }
}
