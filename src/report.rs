//! Plain-text report of the merged result set.

use crate::error::Result;
use crate::paper::ResultSet;
use chrono::Local;
use std::fmt::{self, Write as _};
use std::path::Path;
use tracing::info;

/// Render the report, papers in sequence-number order.
pub fn render_report(papers: &ResultSet, query: &str) -> String {
    let mut out = String::new();
    // fmt::Write into a String never fails
    let _ = write_body(&mut out, papers, query);
    out
}

fn write_body(out: &mut String, papers: &ResultSet, query: &str) -> fmt::Result {
    let rule = "=".repeat(80);
    let thin = "-".repeat(80);

    writeln!(out, "{}", rule)?;
    writeln!(out, "GOOGLE SCHOLAR SEARCH REPORT")?;
    writeln!(out, "ITA Language Assessment Research")?;
    writeln!(out, "{}\n", rule)?;
    writeln!(out, "Search Date: {}", Local::now().format("%Y-%m-%d"))?;
    writeln!(out, "Search Query: {}", query)?;
    writeln!(out, "Total Papers Found: {}\n", papers.len())?;
    writeln!(out, "{}", thin)?;
    writeln!(out, "PAPERS")?;
    writeln!(out, "{}\n", thin)?;

    for paper in papers.iter() {
        writeln!(out, "[{}] {}", paper.number, paper.title)?;
        writeln!(out, "Authors: {}", paper.authors)?;
        writeln!(out, "Year: {}", paper.year)?;
        writeln!(out, "Venue: {}", paper.venue)?;
        writeln!(out, "Citations: {}", paper.citations)?;
        if paper.has_abstract() {
            writeln!(out, "Abstract: {}", paper.abstract_text)?;
        }
        if paper.has_url() {
            writeln!(out, "URL: {}", paper.url)?;
        }
        writeln!(out, "\n{}\n", thin)?;
    }
    Ok(())
}

pub fn write_report(path: &Path, papers: &ResultSet, query: &str) -> Result<()> {
    std::fs::write(path, render_report(papers, query))?;
    info!("Report saved to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::sample_paper;

    #[test]
    fn test_report_sorted_and_optional_fields() {
        let mut second = sample_paper(2, "Second paper");
        second.abstract_text = "An abstract.".to_string();
        second.url = "https://example.org/2".to_string();
        let set: ResultSet = vec![second, sample_paper(1, "First paper")]
            .into_iter()
            .collect();

        let report = render_report(&set, "q");
        assert!(report.contains("Total Papers Found: 2"));
        assert!(report.contains("Search Query: q"));

        let first = report.find("[1] First paper").expect("first listed");
        let second = report.find("[2] Second paper").expect("second listed");
        assert!(first < second);

        assert_eq!(report.matches("Abstract: ").count(), 1);
        assert!(report.contains("URL: https://example.org/2"));
        assert!(report.contains("Venue: Language Testing"));
    }

    #[test]
    fn test_empty_report() {
        let report = render_report(&ResultSet::new(), "q");
        assert!(report.contains("Total Papers Found: 0"));
        assert!(!report.contains("[1]"));
    }
}
