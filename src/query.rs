//! Query building and client-side keyword matching.

use crate::config::KeywordConfig;

/// Render the keyword groups as `("a" OR "b") AND ("c" OR "d") -x -y`.
///
/// Every keyword is quoted as a phrase, wildcard marker included; Scholar
/// ignores the `*` inside quotes, which is why [`KeywordFilter`] exists.
pub fn build_query(keywords: &KeywordConfig) -> String {
    let mut query = format!(
        "({}) AND ({})",
        or_group(&keywords.ita_keywords),
        or_group(&keywords.assessment_keywords)
    );

    for term in &keywords.exclusions {
        if term.split_whitespace().nth(1).is_some() {
            query.push_str(&format!(" -\"{}\"", term.trim()));
        } else {
            query.push_str(" -");
            query.push_str(term.trim());
        }
    }

    query
}

fn or_group(keywords: &[String]) -> String {
    keywords
        .iter()
        .map(|kw| format!("\"{}\"", kw))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Check if `text` contains any keyword, case-insensitively.
///
/// A keyword ending in `*` matches when its prefix occurs anywhere.
pub fn matches_keywords(text: &str, keywords: &[String]) -> bool {
    if text.is_empty() {
        return false;
    }

    let text_lower = text.to_lowercase();
    keywords.iter().any(|kw| {
        let needle = kw.strip_suffix('*').unwrap_or(kw).to_lowercase();
        text_lower.contains(&needle)
    })
}

/// AND-of-two-groups filter applied to title and abstract.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    ita_keywords: Vec<String>,
    assessment_keywords: Vec<String>,
}

impl KeywordFilter {
    pub fn new(keywords: &KeywordConfig) -> Self {
        Self {
            ita_keywords: keywords.ita_keywords.clone(),
            assessment_keywords: keywords.assessment_keywords.clone(),
        }
    }

    /// True when the text matches at least one keyword of each group.
    pub fn accepts(&self, title: &str, abstract_text: &str) -> bool {
        let haystack = format!("{} {}", title, abstract_text);
        matches_keywords(&haystack, &self.ita_keywords)
            && matches_keywords(&haystack, &self.assessment_keywords)
    }
}
