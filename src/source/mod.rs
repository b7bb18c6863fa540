//! Ordered result streams.
//!
//! A [`ResultSource`] hands out raw results one at a time in Scholar's
//! ranking order. [`ResultStream`] numbers them and provides
//! [`ResultStream::skip_until`], which walks past results an earlier run
//! already stored.

use crate::error::Result;
use crate::extract::RawResult;
use tracing::debug;

#[cfg(feature = "browser")]
pub mod browser;
pub mod http;

/// Results shown per Scholar page
pub const RESULTS_PER_PAGE: usize = 10;

/// What a source produced on one pull.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// The next raw result
    Result(RawResult),
    /// No further results exist
    Exhausted,
    /// A CAPTCHA was not solved in time; the stream was not exhausted
    Blocked,
}

/// A backend that yields Scholar results in ranking order.
///
/// A rate-limit condition is returned as
/// [`ScholarError::RateLimited`](crate::error::ScholarError::RateLimited)
/// and must end the run.
#[allow(async_fn_in_trait)]
pub trait ResultSource {
    async fn next_event(&mut self) -> Result<SourceEvent>;

    /// Jump over up to `count` leading results without fetching them.
    ///
    /// Only called before the first pull. Returns how many results were
    /// actually skipped; sources that cannot seek skip none.
    fn fast_forward(&mut self, _count: usize) -> usize {
        0
    }
}

/// Why a stream stopped producing results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Exhausted,
    Blocked,
}

/// One numbered pull from a [`ResultStream`].
#[derive(Debug, Clone, PartialEq)]
pub enum Pulled {
    /// Raw result and its 1-based position in the full ordering
    Record(usize, RawResult),
    End(StreamEnd),
}

/// Numbers the results of a source, starting at 1.
pub struct ResultStream<'a, S> {
    source: &'a mut S,
    position: usize,
}

impl<'a, S: ResultSource> ResultStream<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        Self {
            source,
            position: 0,
        }
    }

    /// Position of the last result pulled (0 before the first pull).
    pub fn position(&self) -> usize {
        self.position
    }

    pub async fn next(&mut self) -> Result<Pulled> {
        match self.source.next_event().await? {
            SourceEvent::Result(raw) => {
                self.position += 1;
                Ok(Pulled::Record(self.position, raw))
            }
            SourceEvent::Exhausted => Ok(Pulled::End(StreamEnd::Exhausted)),
            SourceEvent::Blocked => Ok(Pulled::End(StreamEnd::Blocked)),
        }
    }

    /// Discard results until the next pull yields position `start`.
    ///
    /// Returns `Some(end)` if the stream stopped first; [`Self::position`]
    /// then tells how far it got.
    pub async fn skip_until(&mut self, start: usize) -> Result<Option<StreamEnd>> {
        let target = start.saturating_sub(1);

        if self.position == 0 && target > 0 {
            let skipped = self.source.fast_forward(target);
            self.position += skipped;
            if skipped > 0 {
                debug!(skipped, "Fast-forwarded result stream");
            }
        }

        while self.position < target {
            if let Pulled::End(end) = self.next().await? {
                return Ok(Some(end));
            }
        }
        Ok(None)
    }
}
