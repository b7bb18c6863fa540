//! Result extraction.
//!
//! Turns one raw unit from a result page into a [`Paper`]. A unit is either
//! the outer HTML of a single result block (browser backend) or an already
//! structured [`ScholarEntry`] (HTTP backend). Extraction never fails the
//! caller: a unit that cannot be turned into a paper is logged and skipped.

use crate::error::{OptionExt, Result, ScholarError};
use crate::paper::{or_sentinel, Paper};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Structured search result, before sentinel defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScholarEntry {
    pub title: String,
    pub author: Option<String>,
    pub pub_year: Option<String>,
    pub venue: Option<String>,
    pub abstract_text: Option<String>,
    pub num_citations: Option<u32>,
    pub pub_url: Option<String>,
}

/// One unit of the ordered result stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResult {
    /// Outer HTML of a single `gs_r` result block
    Fragment(String),
    /// Result already split into bibliographic fields
    Entry(ScholarEntry),
}

/// Compiled selectors and patterns for Scholar result markup.
pub struct Extractor {
    item: Selector,
    item_fallback: Selector,
    title: Selector,
    link: Selector,
    meta: Selector,
    snippet: Selector,
    footer_links: Selector,
    year: Regex,
    cited_by: Regex,
    title_marker: Regex,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScholarError::Parse(format!("{}: {}", css, e)))
}

fn pattern(re: &str) -> Result<Regex> {
    Regex::new(re).map_err(|e| ScholarError::Parse(e.to_string()))
}

/// Collect element text with whitespace (including `&nbsp;`) collapsed.
fn clean_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl Extractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            item: selector("div.gs_r.gs_or.gs_scl")?,
            item_fallback: selector("div.gs_ri")?,
            title: selector("h3.gs_rt")?,
            link: selector("h3.gs_rt a")?,
            meta: selector("div.gs_a")?,
            snippet: selector("div.gs_rs")?,
            footer_links: selector("div.gs_fl a")?,
            year: pattern(r"\b(19|20)\d{2}\b")?,
            // English and Chinese interface strings
            cited_by: pattern(r"(?:Cited by\s*|被引用\s*)(\d+)")?,
            title_marker: pattern(r"\[(?:PDF|HTML|BOOK|B|CITATION|C|DOC|PS)\]")?,
        })
    }

    /// Split a result page into per-result HTML fragments, in page order.
    pub fn split_page(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let mut items: Vec<String> = document.select(&self.item).map(|e| e.html()).collect();
        if items.is_empty() {
            items = document
                .select(&self.item_fallback)
                .map(|e| e.html())
                .collect();
        }
        items
    }

    /// Parse a result page straight into structured entries, in page order.
    ///
    /// Entries without a title are kept so result positions stay aligned
    /// with the page; [`Extractor::extract`] drops them later.
    pub fn parse_page(&self, html: &str) -> Vec<ScholarEntry> {
        let document = Html::parse_document(html);
        let mut items: Vec<ScholarEntry> = document
            .select(&self.item)
            .map(|e| self.read_entry(e))
            .collect();
        if items.is_empty() {
            items = document
                .select(&self.item_fallback)
                .map(|e| self.read_entry(e))
                .collect();
        }
        items
    }

    /// Map one raw unit to a paper numbered `number`.
    ///
    /// Returns `None` (and logs why) when the unit has no usable title.
    pub fn extract(&self, raw: RawResult, number: usize) -> Option<Paper> {
        let entry = match raw {
            RawResult::Entry(entry) => entry,
            RawResult::Fragment(html) => self.read_fragment(&html),
        };

        match self.to_paper(entry, number) {
            Ok(paper) => Some(paper),
            Err(e) => {
                warn!(index = number, error = %e, "Failed to parse result");
                None
            }
        }
    }

    fn read_fragment(&self, html: &str) -> ScholarEntry {
        let fragment = Html::parse_fragment(html);
        let root = fragment.root_element();
        self.read_entry(root)
    }

    fn read_entry(&self, item: ElementRef<'_>) -> ScholarEntry {
        let mut entry = ScholarEntry::default();

        if let Some(link) = item.select(&self.link).next() {
            entry.pub_url = link.value().attr("href").map(|s| s.to_string());
        }
        // The [PDF]/[BOOK] tags sit outside the link, so take the whole heading
        if let Some(title_elem) = item.select(&self.title).next() {
            entry.title = clean_text(title_elem);
        }

        if let Some(meta_elem) = item.select(&self.meta).next() {
            self.split_meta(&clean_text(meta_elem), &mut entry);
        }

        if let Some(snippet_elem) = item.select(&self.snippet).next() {
            entry.abstract_text = Some(clean_text(snippet_elem));
        }

        for link in item.select(&self.footer_links) {
            let text = link.text().collect::<String>();
            if let Some(count) = self
                .cited_by
                .captures(&text)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse().ok())
            {
                entry.num_citations = Some(count);
                break;
            }
        }

        debug!(title = %entry.title, "Read result entry");
        entry
    }

    /// Split "authors - venue, year - publisher" into its parts.
    fn split_meta(&self, meta_text: &str, entry: &mut ScholarEntry) {
        let mut parts = meta_text.split(" - ");

        if let Some(authors) = parts.next() {
            entry.author = Some(authors.trim().to_string());
        }

        if let Some(venue_year) = parts.next() {
            let venue_year = venue_year.trim();
            match self.year.find(venue_year) {
                Some(year) => {
                    entry.pub_year = Some(year.as_str().to_string());
                    let venue = format!(
                        "{}{}",
                        &venue_year[..year.start()],
                        &venue_year[year.end()..]
                    );
                    entry.venue = Some(venue.trim().trim_end_matches(',').trim().to_string());
                }
                None => entry.venue = Some(venue_year.to_string()),
            }
        }
    }

    fn strip_title_markers(&self, title: &str) -> String {
        self.title_marker
            .replace_all(title, "")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_paper(&self, entry: ScholarEntry, number: usize) -> Result<Paper> {
        let title = Some(self.strip_title_markers(&entry.title))
            .filter(|t| !t.is_empty())
            .ok_or_parse("result has no title")?;

        Ok(Paper {
            number,
            title,
            authors: or_sentinel(entry.author),
            year: or_sentinel(entry.pub_year),
            venue: or_sentinel(entry.venue),
            citations: entry.num_citations.unwrap_or(0),
            abstract_text: or_sentinel(entry.abstract_text),
            url: or_sentinel(entry.pub_url),
        })
    }
}

#[cfg(test)]
pub(crate) const SAMPLE_PAGE: &str = r##"
<html><body><div id="gs_res_ccl_mid">
  <div class="gs_r gs_or gs_scl" data-rp="0">
    <div class="gs_ri">
      <h3 class="gs_rt"><span class="gs_ctg2">[PDF]</span> <a href="https://example.org/ita.pdf">Assessing the oral proficiency of International Teaching Assistants</a></h3>
      <div class="gs_a">J Smith, K&nbsp;Lee&nbsp;- Language Testing, 2019 - journals.sagepub.com</div>
      <div class="gs_rs">We examine rubric design for ITA speaking tests.</div>
      <div class="gs_fl gs_flb"><a href="#">Save</a> <a href="/scholar?cites=42&amp;hl=en">Cited by 37</a> <a href="/scholar?q=related">Related articles</a></div>
    </div>
  </div>
  <div class="gs_r gs_or gs_scl" data-rp="1">
    <div class="gs_ri">
      <h3 class="gs_rt"><span class="gs_ctu"><span class="gs_ct1">[BOOK]</span><span class="gs_ct2">[B]</span></span> Teaching assistants abroad</h3>
      <div class="gs_a">M Chen - 2004 - books.google.com</div>
    </div>
  </div>
  <div class="gs_r gs_or gs_scl" data-rp="2">
    <div class="gs_ri">
      <div class="gs_a">Nobody - Nowhere</div>
    </div>
  </div>
</div></body></html>
"##;
