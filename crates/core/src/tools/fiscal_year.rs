//! Fiscal year extraction.
//!
//! Every run of exactly four digits inside the plausible window counts as a
//! year mention. The most frequent year wins; ties go to the most recent one.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::AnalysisContext;
use crate::document::Document;
use crate::error::ToolError;
use crate::result::Analysis;

use super::{parse_args, round2};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Args {
    reference_year: Option<i32>,
    lookback_years: Option<i32>,
    lookahead_years: Option<i32>,
}

/// Inclusive range of years considered plausible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearWindow {
    pub earliest: i32,
    pub latest: i32,
}

impl YearWindow {
    /// Fails on negative spans and on windows that leave the `i32` range.
    pub fn new(reference_year: i32, lookback_years: i32, lookahead_years: i32) -> Result<Self, ToolError> {
        if lookback_years < 0 || lookahead_years < 0 {
            return Err(ToolError::InvalidArgument(
                "lookback_years and lookahead_years must not be negative".into(),
            ));
        }
        let earliest = reference_year.checked_sub(lookback_years);
        let latest = reference_year.checked_add(lookahead_years);
        match (earliest, latest) {
            (Some(earliest), Some(latest)) => Ok(YearWindow { earliest, latest }),
            _ => Err(ToolError::InvalidArgument(format!(
                "year window {reference_year} -{lookback_years}/+{lookahead_years} is out of range"
            ))),
        }
    }

    pub fn from_context(ctx: &AnalysisContext) -> Result<Self, ToolError> {
        let config = &ctx.config.fiscal_year;
        YearWindow::new(
            ctx.reference_year,
            config.lookback_years,
            config.lookahead_years,
        )
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.earliest..=self.latest).contains(&year)
    }
}

fn digit_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid digit pattern"))
}

fn labelled_patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        [
            r"(?i)(?:tax|fiscal|taxation)\s+year\s*:?\s*(\d{4})\b",
            r"(?i)ann[ée]e\s+(?:d.imposition|fiscale)\s*:?\s*(\d{4})\b",
            r"(?i)(?:for\s+the\s+year|pour\s+l.ann[ée]e)\s+(?:ending\s+|se\s+terminant\s+le\s+)?(?:[a-zé]+\s+\d{1,2},?\s+)?(\d{4})\b",
            r"(?i)\b(\d{4})\s+(?:tax\s+return|income\s+tax|notice\s+of\s+assessment|d[ée]claration|avis\s+de\s+cotisation)",
            r"(?i)as\s+of\s+(?:december|d[ée]cembre)\s+\d{1,2},?\s+(\d{4})\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid year label pattern"))
        .collect()
    })
}

/// Plausible years in order of appearance.
pub fn years_in_text(text: &str, window: &YearWindow) -> Vec<i32> {
    digit_runs()
        .find_iter(text)
        .filter(|m| m.as_str().len() == 4)
        .filter_map(|m| m.as_str().parse::<i32>().ok())
        .filter(|year| window.contains(*year))
        .collect()
}

/// Plausible years that appear next to a year label ("tax year 2023", ...).
pub fn labelled_years(text: &str, window: &YearWindow) -> Vec<i32> {
    let mut years: Vec<i32> = labelled_patterns()
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| caps.get(1)?.as_str().parse::<i32>().ok())
        .filter(|year| window.contains(*year))
        .collect();
    years.sort_unstable();
    years.dedup();
    years
}

/// Most frequent year and its count. Equal counts resolve to the later year.
pub fn most_frequent_year(years: &[i32]) -> Option<(i32, usize)> {
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for year in years {
        *counts.entry(*year).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)))
}

#[derive(Debug, Serialize)]
struct Output {
    most_common_year: Option<i32>,
    per_page: BTreeMap<usize, i32>,
    year_counts: BTreeMap<i32, usize>,
    labelled_years: Vec<i32>,
    window: YearWindow,
}

#[derive(Debug, Serialize)]
struct Hints {
    fiscal_year: Option<i32>,
    pages_with_year: usize,
    message: String,
}

pub fn analyze(document: &Document, args: &Value, ctx: &AnalysisContext) -> Result<Analysis, ToolError> {
    let args: Args = parse_args(args)?;
    let config = &ctx.config.fiscal_year;

    let lookback = args.lookback_years.unwrap_or(config.lookback_years);
    let lookahead = args.lookahead_years.unwrap_or(config.lookahead_years);
    let window = YearWindow::new(
        args.reference_year.unwrap_or(ctx.reference_year),
        lookback,
        lookahead,
    )?;

    let mut all_years = Vec::new();
    let mut labelled = Vec::new();
    let mut per_page = BTreeMap::new();

    for page in document.pages() {
        let text = document.text(page);
        let years = years_in_text(text, &window);
        if let Some((year, _)) = most_frequent_year(&years) {
            per_page.insert(page.number(), year);
        }
        labelled.extend(labelled_years(text, &window));
        all_years.extend(years);
    }
    labelled.sort_unstable();
    labelled.dedup();

    let winner = most_frequent_year(&all_years);
    let mut year_counts: BTreeMap<i32, usize> = BTreeMap::new();
    for year in &all_years {
        *year_counts.entry(*year).or_default() += 1;
    }

    let (confidence, message) = match winner {
        Some((year, count)) => {
            let mut confidence = count as f64 / all_years.len() as f64;
            if labelled.contains(&year) {
                confidence += config.labelled_bonus;
            }
            let confidence = confidence.min(config.max_confidence);
            (
                confidence,
                format!(
                    "Fiscal year {year} ({count} of {} year mentions, confidence {:.2})",
                    all_years.len(),
                    confidence
                ),
            )
        }
        None => (
            config.absent_confidence,
            format!(
                "No year between {} and {} found",
                window.earliest, window.latest
            ),
        ),
    };

    let hints = Hints {
        fiscal_year: winner.map(|(year, _)| year),
        pages_with_year: per_page.len(),
        message,
    };

    let output = Output {
        most_common_year: winner.map(|(year, _)| year),
        per_page,
        year_counts,
        labelled_years: labelled,
        window,
    };

    Analysis::new(&output, &hints, round2(confidence))
}
