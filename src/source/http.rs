//! Plain HTTP backend.
//!
//! Pages through `/scholar?q=..&start=N` ten results at a time and hands out
//! structured entries one by one. A challenge page or HTTP 429 means Scholar
//! is throttling this address; that is fatal and never retried here.

use super::{ResultSource, SourceEvent, RESULTS_PER_PAGE};
use crate::captcha::is_captcha_page;
use crate::cookies::CookieJar;
use crate::error::{Result, ScholarError};
use crate::extract::{Extractor, RawResult, ScholarEntry};
use rand::Rng;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Default Google Scholar URL
pub const DEFAULT_SCHOLAR_URL: &str = "https://scholar.google.com";

/// User agent string for requests
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Transport options for the HTTP backend
#[derive(Debug, Clone, Default)]
pub struct HttpOptions {
    /// Proxy URL (e.g., "http://127.0.0.1:7890")
    pub proxy: Option<String>,
    /// Custom base URL for mirror sites
    pub base_url: Option<String>,
    /// Cookie file; the default location when `None`
    pub cookie_path: Option<PathBuf>,
    /// Skip the random wait before each page request
    pub no_page_delay: bool,
}

/// Result stream over Scholar's HTML pages.
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
    query: String,
    cookie_header: String,
    extractor: Extractor,
    next_offset: usize,
    buffer: VecDeque<ScholarEntry>,
    done: bool,
    page_delay: bool,
}

impl HttpSource {
    pub fn new(query: &str, options: &HttpOptions) -> Result<Self> {
        let base_url = options
            .base_url
            .as_ref()
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_SCHOLAR_URL.to_string());

        let jar = CookieJar::at(options.cookie_path.as_deref());
        let cookie_header = jar.scholar_header();
        if cookie_header.is_empty() {
            warn!(
                path = ?jar.path(),
                "No Google cookies loaded; a solved browser session makes throttling less likely"
            );
        }

        info!(query, url = %base_url, "Opening Google Scholar result stream");

        Ok(Self {
            client: build_http_client(options.proxy.as_deref())?,
            base_url,
            query: query.to_string(),
            cookie_header,
            extractor: Extractor::new()?,
            next_offset: 0,
            buffer: VecDeque::new(),
            done: false,
            page_delay: !options.no_page_delay,
        })
    }

    async fn fetch_next_page(&mut self) -> Result<()> {
        let url = build_search_url(&self.base_url, &self.query, self.next_offset)?;
        debug!(offset = self.next_offset, url = %url, "Fetching page");

        if self.page_delay {
            let delay = rand::thread_rng().gen_range(500..2000);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let html = fetch_page(&self.client, &url, &self.cookie_header).await?;
        self.accept_page(&html)
    }

    /// Buffer the entries of one result page; an empty page ends the stream.
    fn accept_page(&mut self, html: &str) -> Result<()> {
        if is_captcha_page(html) {
            warn!(offset = self.next_offset, "CAPTCHA page served");
            return Err(ScholarError::RateLimited(format!(
                "CAPTCHA page served for results starting at {}",
                self.next_offset + 1
            )));
        }

        let entries = self.extractor.parse_page(html);
        info!(offset = self.next_offset, count = entries.len(), "Parsed page");

        if entries.is_empty() {
            self.done = true;
        } else {
            self.buffer.extend(entries);
            self.next_offset += RESULTS_PER_PAGE;
        }
        Ok(())
    }
}

impl ResultSource for HttpSource {
    async fn next_event(&mut self) -> Result<SourceEvent> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                return Ok(SourceEvent::Result(RawResult::Entry(entry)));
            }
            if self.done {
                return Ok(SourceEvent::Exhausted);
            }
            self.fetch_next_page().await?;
        }
    }

    fn fast_forward(&mut self, count: usize) -> usize {
        let skip = count / RESULTS_PER_PAGE * RESULTS_PER_PAGE;
        self.next_offset += skip;
        skip
    }
}

/// Build HTTP client with optional proxy
fn build_http_client(proxy: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .cookie_store(true);

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
            ScholarError::Config(format!("Invalid proxy URL '{}': {}", proxy_url, e))
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ScholarError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Build Google Scholar search URL
pub fn build_search_url(base_url: &str, query: &str, start: usize) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/scholar", base_url))
        .map_err(|e| ScholarError::Config(format!("Invalid base URL: {}", e)))?;

    url.query_pairs_mut()
        .append_pair("q", query)
        .append_pair("hl", "en") // English locale keeps "Cited by" parseable
        .append_pair("start", &start.to_string());

    Ok(url)
}

async fn fetch_page(client: &reqwest::Client, url: &Url, cookie_header: &str) -> Result<String> {
    let mut request = client
        .get(url.as_str())
        .header(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        )
        .header("Accept-Language", "en-US,en;q=0.9")
        .header("Cache-Control", "no-cache")
        .header("Upgrade-Insecure-Requests", "1");

    if !cookie_header.is_empty() {
        request = request.header("Cookie", cookie_header);
    }

    let response = request.send().await?;

    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ScholarError::RateLimited("HTTP 429 Too Many Requests".to_string()));
    }
    // Google redirects throttled clients to its /sorry/ interstitial
    if response.url().path().starts_with("/sorry") {
        return Err(ScholarError::RateLimited(format!(
            "redirected to {}",
            response.url()
        )));
    }
    if !status.is_success() {
        return Err(ScholarError::Api {
            code: status.as_u16() as i32,
            message: format!("HTTP error: {}", status),
        });
    }

    Ok(response.text().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::SAMPLE_PAGE;
    use crate::fetch::{fetch_chunk, ChunkRequest, Pacing, StopReason};
    use crate::source::{Pulled, ResultStream, StreamEnd};

    fn offline_source() -> Result<HttpSource> {
        let options = HttpOptions {
            cookie_path: Some(PathBuf::from("/nonexistent/cookies.json")),
            no_page_delay: true,
            ..Default::default()
        };
        HttpSource::new("q", &options)
    }

    #[test]
    fn test_build_search_url() -> Result<()> {
        let url = build_search_url(DEFAULT_SCHOLAR_URL, r#"("ITA") AND ("rubric*")"#, 20)?;
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert_eq!(url.path(), "/scholar");
        assert_eq!(pairs[0], ("q".to_string(), r#"("ITA") AND ("rubric*")"#.to_string()));
        assert!(pairs.contains(&("start".to_string(), "20".to_string())));
        assert!(pairs.contains(&("hl".to_string(), "en".to_string())));
        Ok(())
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            build_search_url("not a url", "q", 0),
            Err(ScholarError::Config(_))
        ));
    }

    #[test]
    fn test_mirror_trailing_slash() -> Result<()> {
        let options = HttpOptions {
            base_url: Some("https://scholar.example.org/".to_string()),
            cookie_path: Some(PathBuf::from("/nonexistent/cookies.json")),
            ..Default::default()
        };
        let source = HttpSource::new("q", &options)?;
        assert_eq!(source.base_url, "https://scholar.example.org");
        Ok(())
    }

    #[test]
    fn test_fast_forward_whole_pages() -> Result<()> {
        let options = HttpOptions {
            cookie_path: Some(PathBuf::from("/nonexistent/cookies.json")),
            ..Default::default()
        };
        let mut source = HttpSource::new("q", &options)?;
        assert_eq!(source.fast_forward(27), 20);
        assert_eq!(source.next_offset, 20);
        Ok(())
    }

    #[test]
    fn test_captcha_page_is_rate_limit() -> Result<()> {
        let mut source = offline_source()?;
        let page = r#"<html><body><form id="gs_captcha_f">Our systems have detected unusual traffic</form></body></html>"#;

        assert!(matches!(source.accept_page(page), Err(ScholarError::RateLimited(_))));
        assert!(source.buffer.is_empty());
        assert!(!source.done);
        assert_eq!(source.next_offset, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_page_exhausts_stream() -> Result<()> {
        let mut source = offline_source()?;
        source.accept_page("<html><body><div id=\"gs_res_ccl_mid\"></div></body></html>")?;
        assert!(source.done);
        assert_eq!(source.next_offset, 0);
        assert_eq!(source.next_event().await?, SourceEvent::Exhausted);
        Ok(())
    }

    #[tokio::test]
    async fn test_untitled_entries_keep_positions() -> Result<()> {
        let mut source = offline_source()?;
        source.accept_page(SAMPLE_PAGE)?;
        source.accept_page(SAMPLE_PAGE)?;
        source.accept_page("<html><body></body></html>")?;
        assert_eq!(source.next_offset, 2 * RESULTS_PER_PAGE);

        let mut stream = ResultStream::new(&mut source);
        let mut titles = Vec::new();
        loop {
            match stream.next().await? {
                Pulled::Record(index, RawResult::Entry(entry)) => titles.push((index, entry.title)),
                Pulled::Record(_, other) => panic!("unexpected raw result: {:?}", other),
                Pulled::End(end) => {
                    assert_eq!(end, StreamEnd::Exhausted);
                    break;
                }
            }
        }
        assert_eq!(titles.len(), 6);
        assert_eq!(titles[2], (3, String::new()));
        assert_eq!(titles[5], (6, String::new()));
        Ok(())
    }

    #[tokio::test]
    async fn test_chunk_over_buffered_pages() -> Result<()> {
        let mut source = offline_source()?;
        source.accept_page(SAMPLE_PAGE)?;
        source.accept_page(SAMPLE_PAGE)?;
        source.accept_page("<html><body></body></html>")?;

        let outcome = fetch_chunk(
            &mut source,
            ChunkRequest::new(1, 10),
            &Extractor::new()?,
            None,
            &Pacing::none(),
        )
        .await?;

        let numbers: Vec<usize> = outcome.papers.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2, 4, 5]);
        assert_eq!(outcome.last_index, 6);
        assert_eq!(outcome.stop, StopReason::Exhausted);
        Ok(())
    }
}
