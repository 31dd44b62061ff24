use crate::prelude::{println, *};
use colored::Colorize;
use doctriage_core::text::{self, PageText, SearchOutcome, DEFAULT_MAX_MATCHES};

#[derive(Debug, clap::Args, Clone)]
pub struct TextOptions {
    /// PDF to read: a path, file:// URL or http(s):// URL
    reference: String,

    /// 1-based page to print (repeatable). Every page when omitted.
    #[arg(short, long = "page", value_name = "N")]
    pages: Vec<usize>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, clap::Args, Clone)]
pub struct SearchOptions {
    /// PDF to search: a path, file:// URL or http(s):// URL
    reference: String,

    /// Regular expression
    pattern: String,

    /// Match case exactly
    #[arg(long)]
    case_sensitive: bool,

    /// Stop listing matches after this many
    #[arg(short, long, default_value_t = DEFAULT_MAX_MATCHES)]
    max_matches: usize,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run_text(options: TextOptions, global: crate::Global) -> Result<()> {
    let session = crate::session::Session::from_global(&global)?;
    let document = session
        .load(&options.reference)
        .await
        .map_err(Error::from)?;

    let selection = (!options.pages.is_empty()).then_some(options.pages.as_slice());
    let pages = text::extract_text_by_page(&document, selection)?;

    if options.json {
        let json = serde_json::to_string_pretty(&pages)
            .map_err(|e| eyre!("JSON serialization failed: {}", e))?;
        println!("{}", json);
    } else {
        println!("{}", format_pages(&pages));
    }
    Ok(())
}

pub async fn run_search(options: SearchOptions, global: crate::Global) -> Result<()> {
    let session = crate::session::Session::from_global(&global)?;
    let document = session
        .load(&options.reference)
        .await
        .map_err(Error::from)?;

    let search = text::SearchOptions {
        case_sensitive: options.case_sensitive,
        max_matches: options.max_matches,
    };
    let outcome = text::search_text(&document, &options.pattern, &search)?;

    if options.json {
        let json = serde_json::to_string_pretty(&outcome)
            .map_err(|e| eyre!("JSON serialization failed: {}", e))?;
        println!("{}", json);
    } else {
        println!("{}", format_matches(&outcome));
    }
    Ok(())
}

fn format_pages(pages: &[PageText]) -> String {
    let mut result = String::new();
    for page in pages {
        result.push_str(&f!(
            "{} {}\n",
            f!("Page {}", page.page).bright_white().bold(),
            f!("({} chars)", page.char_count).dimmed()
        ));
        result.push_str(page.text.trim_end());
        result.push_str("\n\n");
    }
    result
}

fn format_matches(outcome: &SearchOutcome) -> String {
    let mut result = String::new();
    for m in &outcome.matches {
        result.push_str(&f!(
            "{} {}{}{}\n",
            f!("p.{}:", m.page).cyan(),
            m.context_before.replace('\n', " "),
            m.matched.yellow().bold(),
            m.context_after.replace('\n', " ")
        ));
    }

    result.push_str(&f!("\n{} match(es)", outcome.total_matches));
    if outcome.truncated {
        result.push_str(&f!(", first {} shown", outcome.matches.len()));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use doctriage_core::text::SearchMatch;

    #[test]
    fn test_format_pages() {
        colored::control::set_override(false);
        let pages = vec![PageText {
            page: 2,
            text: "Line one\n".into(),
            char_count: 9,
        }];
        assert_eq!(format_pages(&pages), "Page 2 (9 chars)\nLine one\n\n");
    }

    #[test]
    fn test_format_matches_truncated() {
        colored::control::set_override(false);
        let outcome = SearchOutcome {
            pattern: "T4".into(),
            total_matches: 3,
            truncated: true,
            matches: vec![SearchMatch {
                page: 1,
                matched: "T4".into(),
                context_before: "Form\n".into(),
                context_after: " slip".into(),
            }],
        };
        assert_eq!(
            format_matches(&outcome),
            "p.1: Form T4 slip\n\n3 match(es), first 1 shown"
        );
    }
}
