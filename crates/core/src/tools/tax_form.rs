//! Canadian tax slip identification (T4, T5, RL-1, ...).
//!
//! Title phrases are checked first, then form codes, then box-label keywords.
//! The tax year comes from the same per-page text as the fiscal-year tool.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{AnalysisContext, TaxFormConfig};
use crate::document::Document;
use crate::error::ToolError;
use crate::result::Analysis;

use super::fiscal_year::{labelled_years, most_frequent_year, years_in_text, YearWindow};
use super::rules::{compile, first_match, Rule, Strength};
use super::{parse_args, round2, select_pages};

pub const UNKNOWN: &str = "unknown";

/// Who normally issues each slip.
pub fn issuer_for(form: &str) -> Option<&'static str> {
    let issuer = match form {
        "T4" => "employer",
        "T4A" => "various",
        "T4E" => "service_canada",
        "T5" => "financial_institution",
        "T5007" => "government",
        "T1" => "taxpayer",
        "T2202" => "educational_institution",
        "T3" => "trust",
        "RL-1" => "employer_quebec",
        "RL-2" => "financial_institution_quebec",
        _ => return None,
    };
    Some(issuer)
}

fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        use Strength::{FormCode, Keyword, Title};
        compile(&[
            ("T4", Title, r"(?i)statement\s+of\s+remuneration\s+paid"),
            ("T4A", Title, r"(?i)statement\s+of\s+pension"),
            ("T4E", Title, r"(?i)statement\s+of\s+employment\s+insurance"),
            ("T5", Title, r"(?i)statement\s+of\s+investment\s+income"),
            ("T5007", Title, r"(?i)statement\s+of\s+benefits"),
            ("T1", Title, r"(?i)income\s+tax\s+and\s+benefit\s+return"),
            ("T1", Title, r"(?i)\bT1\s+general\b"),
            ("T2202", Title, r"(?i)tuition\s+and\s+enrol?ment\s+certificate"),
            ("T3", Title, r"(?i)statement\s+of\s+trust\s+income"),
            ("RL-1", Title, r"(?i)relev[ée]\s+1\b"),
            ("RL-2", Title, r"(?i)relev[ée]\s+2\b"),
            // Longer codes first so T4A is not read as T4.
            ("T5007", FormCode, r"\bT5007\b"),
            ("T2202", FormCode, r"\bT2202A?\b"),
            ("T4A", FormCode, r"\bT4A\b"),
            ("T4E", FormCode, r"\bT4E\b"),
            ("T4", FormCode, r"\bT4\b"),
            ("T5", FormCode, r"\bT5\b"),
            ("T3", FormCode, r"\bT3\b"),
            ("T1", FormCode, r"\bT1\b"),
            ("RL-1", FormCode, r"\bRL-?1\b"),
            ("RL-2", FormCode, r"\bRL-?2\b"),
            ("T4", Keyword, r"(?i)employment\s+income|income\s+tax\s+deducted"),
            ("T4A", Keyword, r"(?i)pension|annuities"),
            ("T4E", Keyword, r"(?i)employment\s+insurance\s+benefits|benefits\s+paid"),
            ("T5", Keyword, r"(?i)investment\s+income|dividends|interest\s+from\s+canadian"),
            ("T5007", Keyword, r"(?i)social\s+assistance|workers'?\s+compensation"),
            ("T1", Keyword, r"(?i)taxable\s+income|total\s+income|federal\s+tax"),
            ("T2202", Keyword, r"(?i)tuition|eligible\s+fees"),
            ("T3", Keyword, r"(?i)trust\s+income|capital\s+gains\s+allocat"),
            ("RL-1", Keyword, r"(?i)revenus?\s+d'emploi"),
            ("RL-2", Keyword, r"(?i)revenus?\s+de\s+placements?"),
        ])
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormMatch {
    pub page: usize,
    pub form_type: &'static str,
    pub issuer: Option<&'static str>,
    pub tax_year: Option<i32>,
    pub match_strength: Strength,
    pub matched_phrase: String,
    pub confidence: f64,
}

/// Tax year for a page: a labelled year if any, else the most frequent one.
pub fn tax_year(text: &str, window: &YearWindow) -> Option<i32> {
    if let Some(year) = labelled_years(text, window).last() {
        return Some(*year);
    }
    most_frequent_year(&years_in_text(text, window)).map(|(year, _)| year)
}

pub fn classify_text(
    page: usize,
    text: &str,
    window: &YearWindow,
    config: &TaxFormConfig,
) -> Option<FormMatch> {
    let hit = first_match(rules(), text)?;
    let tax_year = tax_year(text, window);

    let base = match hit.strength {
        Strength::Title => config.title_confidence,
        Strength::FormCode => config.code_confidence,
        Strength::Keyword => config.keyword_confidence,
    };
    let bonus = if tax_year.is_some() { config.year_bonus } else { 0.0 };

    Some(FormMatch {
        page,
        form_type: hit.label,
        issuer: issuer_for(hit.label),
        tax_year,
        match_strength: hit.strength,
        matched_phrase: hit.matched,
        confidence: round2((base + bonus).min(config.max_confidence)),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Args {
    pages: Option<Vec<usize>>,
}

#[derive(Debug, Serialize)]
struct FormSummary {
    form_type: &'static str,
    pages: Vec<usize>,
}

#[derive(Debug, Serialize)]
struct Output {
    form_type: &'static str,
    issuer: Option<&'static str>,
    tax_year: Option<i32>,
    page: Option<usize>,
    forms: Vec<FormSummary>,
    matches: Vec<FormMatch>,
}

#[derive(Debug, Serialize)]
struct Hints {
    form_type: &'static str,
    tax_year: Option<i32>,
    forms: Vec<&'static str>,
    message: String,
}

pub fn analyze(document: &Document, args: &Value, ctx: &AnalysisContext) -> Result<Analysis, ToolError> {
    let args: Args = parse_args(args)?;
    let config = &ctx.config.tax_form;
    let window = YearWindow::from_context(ctx)?;

    let matches: Vec<FormMatch> = select_pages(document, args.pages.as_deref())?
        .into_iter()
        .filter_map(|page| classify_text(page.number(), document.text(page), &window, config))
        .collect();

    let mut best: Option<&FormMatch> = None;
    for m in &matches {
        if best.map_or(true, |b| m.confidence > b.confidence) {
            best = Some(m);
        }
    }

    let mut forms: Vec<FormSummary> = Vec::new();
    for m in &matches {
        match forms.iter_mut().find(|f| f.form_type == m.form_type) {
            Some(summary) => summary.pages.push(m.page),
            None => forms.push(FormSummary {
                form_type: m.form_type,
                pages: vec![m.page],
            }),
        }
    }

    let form_type = best.map_or(UNKNOWN, |b| b.form_type);
    let tax_year = best.and_then(|b| b.tax_year);
    let confidence = best.map_or(0.0, |b| b.confidence);

    let message = match best {
        Some(b) => match b.tax_year {
            Some(year) => format!("{} slip for tax year {year} (page {})", b.form_type, b.page),
            None => format!("{} slip, tax year not found (page {})", b.form_type, b.page),
        },
        None => "No known tax form found".to_string(),
    };

    let hints = Hints {
        form_type,
        tax_year,
        forms: forms.iter().map(|f| f.form_type).collect(),
        message,
    };

    let output = Output {
        form_type,
        issuer: best.and_then(|b| b.issuer),
        tax_year,
        page: best.map(|b| b.page),
        forms,
        matches,
    };

    Analysis::new(&output, &hints, confidence)
}
