//! CAPTCHA detection and the manual solving stall.
//!
//! Solving is always done by a human in a visible browser window. The gate
//! only polls until the page stops looking like a challenge, up to a hard
//! ceiling, and tells the caller which of the two happened.

use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Lower-case substrings that identify a Scholar challenge page.
pub const CAPTCHA_MARKERS: &[&str] = &[
    "unusual traffic",
    "solving the above captcha",
    "recaptcha",
    "gs_captcha",
    "captcha-form",
];

/// Default ceiling for a human to solve a CAPTCHA
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);

/// Default polling interval while waiting
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Heuristic check on page HTML.
pub fn is_captcha_page(html: &str) -> bool {
    let lower = html.to_lowercase();
    CAPTCHA_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Result of waiting for a human to clear a CAPTCHA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaOutcome {
    Resolved,
    TimedOut,
}

/// Bounded polling wait for a CAPTCHA to be solved.
#[derive(Debug, Clone, Copy)]
pub struct CaptchaGate {
    max_wait: Duration,
    poll_interval: Duration,
}

impl Default for CaptchaGate {
    fn default() -> Self {
        Self {
            max_wait: DEFAULT_MAX_WAIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl CaptchaGate {
    pub fn new(max_wait: Duration) -> Self {
        Self {
            max_wait,
            ..Default::default()
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Poll `still_blocked` until it reports false or `max_wait` elapses.
    pub async fn wait<F, Fut>(&self, mut still_blocked: F) -> CaptchaOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        println!("\n{}", "=".repeat(80));
        println!("CAPTCHA DETECTED!");
        println!("{}", "=".repeat(80));
        println!("Please solve the CAPTCHA in the browser window.");
        println!("Scraping continues automatically once it is solved.");
        println!("Maximum wait time: {} seconds", self.max_wait.as_secs());
        println!("{}\n", "=".repeat(80));

        let started = Instant::now();
        let mut last_notice = 0;

        while started.elapsed() < self.max_wait {
            tokio::time::sleep(self.poll_interval).await;

            if !still_blocked().await {
                info!(waited_secs = started.elapsed().as_secs(), "CAPTCHA solved");
                return CaptchaOutcome::Resolved;
            }

            let elapsed = started.elapsed().as_secs();
            if elapsed / 10 > last_notice {
                last_notice = elapsed / 10;
                info!(elapsed_secs = elapsed, "Still waiting for CAPTCHA");
            }
        }

        warn!(
            max_wait_secs = self.max_wait.as_secs(),
            "Timed out waiting for CAPTCHA to be solved"
        );
        CaptchaOutcome::TimedOut
    }
}
