//! Chrome backend with manual CAPTCHA solving.
//!
//! Opens a visible Chrome window and loads result pages in it. When Scholar
//! shows a challenge, the run stalls until a human solves it in that window
//! or the gate times out. After a solve, the browser's cookies are written
//! to the cookie file so later HTTP runs reuse the unlocked session.

use super::http::{build_search_url, DEFAULT_SCHOLAR_URL};
use super::{ResultSource, SourceEvent, RESULTS_PER_PAGE};
use crate::captcha::{is_captcha_page, CaptchaGate, CaptchaOutcome};
use crate::cookies::{Cookie, CookieJar};
use crate::error::{Result, ScholarError};
use crate::extract::{Extractor, RawResult};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use rand::Rng;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Launch options for the browser backend
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    /// No window; CAPTCHAs cannot be solved
    pub headless: bool,
    /// Chrome binary; searched in the usual places when `None`
    pub chrome_path: Option<PathBuf>,
    pub captcha: CaptchaGate,
    /// Where solved-session cookies are written
    pub cookie_path: Option<PathBuf>,
}

enum PageLoad {
    Loaded(String),
    Blocked,
}

/// Result stream driven through a real Chrome page.
pub struct BrowserSource {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    query: String,
    extractor: Extractor,
    options: BrowserOptions,
    jar: CookieJar,
    next_offset: usize,
    buffer: VecDeque<String>,
    done: bool,
    blocked: bool,
}

impl BrowserSource {
    pub async fn launch(query: &str, options: BrowserOptions) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");

        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = find_chrome_binary(options.chrome_path.as_ref()) {
            builder = builder.chrome_executable(path);
        }

        let config = builder
            .build()
            .map_err(|e| ScholarError::Browser(format!("Failed to build browser config: {}", e)))?;

        info!(headless = options.headless, "Starting Chrome");
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScholarError::Browser(format!("Failed to launch Chrome: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler event error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScholarError::Browser(format!("Failed to create page: {}", e)))?;

        Ok(Self {
            browser,
            page,
            handler,
            query: query.to_string(),
            extractor: Extractor::new()?,
            jar: CookieJar::at(options.cookie_path.as_deref()),
            options,
            next_offset: 0,
            buffer: VecDeque::new(),
            done: false,
            blocked: false,
        })
    }

    /// Close Chrome and stop the CDP handler.
    pub async fn close(mut self) -> Result<()> {
        info!("Closing browser");
        let closed = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| ScholarError::Browser(format!("Failed to close browser: {}", e)));
        self.handler.abort();
        closed
    }

    async fn page_html(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| ScholarError::Browser(format!("Failed to read page: {}", e)))
    }

    async fn load_page(&mut self) -> Result<PageLoad> {
        let url = build_search_url(DEFAULT_SCHOLAR_URL, &self.query, self.next_offset)?;
        debug!(offset = self.next_offset, url = %url, "Navigating");

        self.page
            .goto(url.as_str())
            .await
            .map_err(|e| ScholarError::Browser(format!("Navigation failed: {}", e)))?;

        let settle = rand::thread_rng().gen_range(2000..4000);
        tokio::time::sleep(Duration::from_millis(settle)).await;

        let html = self.page_html().await?;
        if !is_captcha_page(&html) {
            return Ok(PageLoad::Loaded(html));
        }

        if self.options.headless {
            warn!("CAPTCHA shown in headless mode; it cannot be solved");
            return Ok(PageLoad::Blocked);
        }

        let page = &self.page;
        let outcome = self
            .options
            .captcha
            .wait(|| async move {
                match page.content().await {
                    Ok(html) => is_captcha_page(&html),
                    Err(_) => true,
                }
            })
            .await;

        match outcome {
            CaptchaOutcome::Resolved => {
                println!("CAPTCHA solved! Continuing...");
                self.export_cookies().await;
                Ok(PageLoad::Loaded(self.page_html().await?))
            }
            CaptchaOutcome::TimedOut => Ok(PageLoad::Blocked),
        }
    }

    async fn export_cookies(&self) {
        let cookies = match self.page.get_cookies().await {
            Ok(cookies) => cookies,
            Err(e) => {
                warn!(error = %e, "Could not read browser cookies");
                return;
            }
        };

        let converted: Vec<Cookie> = cookies
            .into_iter()
            .map(|c| Cookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                secure: c.secure,
                http_only: c.http_only,
                expires: Some(c.expires),
            })
            .collect();

        if let Err(e) = self.jar.save(&converted) {
            warn!(error = %e, "Could not save browser cookies");
        }
    }
}

impl ResultSource for BrowserSource {
    async fn next_event(&mut self) -> Result<SourceEvent> {
        loop {
            if let Some(fragment) = self.buffer.pop_front() {
                return Ok(SourceEvent::Result(RawResult::Fragment(fragment)));
            }
            if self.blocked {
                return Ok(SourceEvent::Blocked);
            }
            if self.done {
                return Ok(SourceEvent::Exhausted);
            }

            match self.load_page().await? {
                PageLoad::Loaded(html) => {
                    let fragments = self.extractor.split_page(&html);
                    info!(offset = self.next_offset, count = fragments.len(), "Parsed page");
                    if fragments.is_empty() {
                        info!("No results on page; reached the end");
                        self.done = true;
                    } else {
                        self.buffer.extend(fragments);
                        self.next_offset += RESULTS_PER_PAGE;
                    }
                }
                PageLoad::Blocked => self.blocked = true,
            }
        }
    }

    fn fast_forward(&mut self, count: usize) -> usize {
        let skip = count / RESULTS_PER_PAGE * RESULTS_PER_PAGE;
        self.next_offset += skip;
        skip
    }
}

/// Find a Chrome or Chromium binary on the system.
fn find_chrome_binary(configured: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Some(path.clone());
        }
        warn!(path = ?path, "Configured Chrome binary not found");
    }

    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    };

    // Fall back to chromiumoxide's own lookup when none of these exist
    candidates
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}
