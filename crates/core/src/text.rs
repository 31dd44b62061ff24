//! Page text utilities: per-page extraction and regex search with context.

use regex::RegexBuilder;
use serde::Serialize;

use crate::document::Document;
use crate::error::ToolError;
use crate::tools::select_pages;

/// Characters of context kept on each side of a search hit.
pub const CONTEXT_CHARS: usize = 50;
pub const DEFAULT_MAX_MATCHES: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageText {
    pub page: usize,
    pub text: String,
    pub char_count: usize,
}

/// Text of the selected pages, or of every page when `pages` is `None`.
pub fn extract_text_by_page(
    document: &Document,
    pages: Option<&[usize]>,
) -> Result<Vec<PageText>, ToolError> {
    Ok(select_pages(document, pages)?
        .into_iter()
        .map(|page| {
            let text = document.text(page);
            PageText {
                page: page.number(),
                text: text.to_string(),
                char_count: text.chars().count(),
            }
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchMatch {
    pub page: usize,
    #[serde(rename = "match")]
    pub matched: String,
    pub context_before: String,
    pub context_after: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub pattern: String,
    pub total_matches: usize,
    pub truncated: bool,
    pub matches: Vec<SearchMatch>,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub max_matches: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            max_matches: DEFAULT_MAX_MATCHES,
        }
    }
}

/// Search every page for `pattern`. Stops collecting after
/// `options.max_matches` hits but still counts the rest.
pub fn search_text(
    document: &Document,
    pattern: &str,
    options: &SearchOptions,
) -> Result<SearchOutcome, ToolError> {
    if pattern.is_empty() {
        return Err(ToolError::InvalidArgument("pattern must not be empty".into()));
    }
    let re = RegexBuilder::new(pattern)
        .case_insensitive(!options.case_sensitive)
        .build()
        .map_err(|e| ToolError::InvalidArgument(format!("invalid pattern: {e}")))?;

    let mut matches = Vec::new();
    let mut total = 0;

    for page in document.pages() {
        let text = document.text(page);
        for m in re.find_iter(text) {
            if m.as_str().is_empty() {
                continue;
            }
            total += 1;
            if matches.len() < options.max_matches {
                matches.push(SearchMatch {
                    page: page.number(),
                    matched: m.as_str().to_string(),
                    context_before: tail_chars(&text[..m.start()], CONTEXT_CHARS).to_string(),
                    context_after: head_chars(&text[m.end()..], CONTEXT_CHARS).to_string(),
                });
            }
        }
    }

    Ok(SearchOutcome {
        pattern: pattern.to_string(),
        total_matches: total,
        truncated: total > matches.len(),
        matches,
    })
}

fn head_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn tail_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    match s.char_indices().nth(count - n) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::testing::*;

    #[test]
    fn test_extract_text_by_page() {
        let doc = document(vec![text_page("première page"), blank_page()]);
        let pages = extract_text_by_page(&doc, None).unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].char_count, 13);
        assert_eq!(pages[1].text, "");

        let only_first = extract_text_by_page(&doc, Some(&[1])).unwrap();
        assert_eq!(only_first.len(), 1);
        assert!(extract_text_by_page(&doc, Some(&[3])).is_err());
    }

    #[test]
    fn test_search_is_case_insensitive_by_default() {
        let doc = document(vec![
            text_page("Total income: 52,000"),
            text_page("TOTAL INCOME restated"),
        ]);
        let outcome = search_text(&doc, "total income", &SearchOptions::default()).unwrap();

        assert_eq!(outcome.total_matches, 2);
        assert_eq!(outcome.matches[1].page, 2);
        assert_eq!(outcome.matches[0].context_after, ": 52,000");

        let strict = SearchOptions {
            case_sensitive: true,
            ..Default::default()
        };
        assert_eq!(search_text(&doc, "total income", &strict).unwrap().total_matches, 0);
    }

    #[test]
    fn test_context_is_bounded_by_chars() {
        let before = "é".repeat(80);
        let doc = document(vec![text_page(&format!("{before}SIN{}", "x".repeat(10)))]);
        let outcome = search_text(&doc, "sin", &SearchOptions::default()).unwrap();

        let hit = &outcome.matches[0];
        assert_eq!(hit.context_before.chars().count(), CONTEXT_CHARS);
        assert_eq!(hit.context_after, "x".repeat(10));
    }

    #[test]
    fn test_max_matches_truncates() {
        let doc = document(vec![text_page("a a a a a")]);
        let options = SearchOptions {
            case_sensitive: false,
            max_matches: 2,
        };
        let outcome = search_text(&doc, "a", &options).unwrap();

        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.total_matches, 5);
        assert!(outcome.truncated);
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let doc = document(vec![blank_page()]);
        let err = search_text(&doc, "(unclosed", &SearchOptions::default()).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument(_)));
    }
}
