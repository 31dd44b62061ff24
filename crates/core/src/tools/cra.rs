//! Canada Revenue Agency document classification.
//!
//! Rules are tried in list order and the first hit wins, so every title
//! phrase outranks every keyword no matter where it appears in the text.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{AnalysisContext, CraConfig};
use crate::document::Document;
use crate::error::ToolError;
use crate::result::Analysis;

use super::rules::{compile, first_match, Rule, Strength};
use super::{parse_args, round2, select_pages};

pub const UNKNOWN: &str = "unknown";
pub const CRA_ISSUER: &str = "canada_revenue_agency";

const ISSUER_PHRASES: [&str; 5] = [
    "canada revenue agency",
    "agence du revenu du canada",
    "revenue canada",
    "revenu canada",
    "cra-arc",
];

fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        use Strength::{Keyword, Title};
        compile(&[
            ("notice_of_assessment", Title, r"(?i)notice\s+of\s+(?:re)?assessment"),
            ("notice_of_assessment", Title, r"(?i)avis\s+de\s+(?:nouvelle\s+)?cotisation"),
            ("family_allowance", Title, r"(?i)canada\s+child\s+benefit"),
            ("family_allowance", Title, r"(?i)allocation\s+canadienne\s+pour\s+enfants"),
            ("gst_hst_credit", Title, r"(?i)GST/HST\s+credit"),
            ("gst_hst_credit", Title, r"(?i)cr[ée]dit\s+(?:pour\s+la\s+)?TPS/TVH"),
            ("statement_of_account", Title, r"(?i)statement\s+of\s+account"),
            ("statement_of_account", Title, r"(?i)[ée]tat\s+de\s+compte"),
            ("tax_return", Title, r"(?i)income\s+tax\s+(?:and\s+benefit\s+)?return"),
            ("tax_return", Title, r"(?i)d[ée]claration\s+de\s+revenus?"),
            ("proof_of_income", Title, r"(?i)proof\s+of\s+income"),
            ("proof_of_income", Title, r"(?i)option\s+C\s+print"),
            ("notice_of_assessment", Keyword, r"(?i)\bNOA\b"),
            ("notice_of_assessment", Keyword, r"(?i)\bassessment\b"),
            ("family_allowance", Keyword, r"\bCCB\b"),
            ("family_allowance", Keyword, r"(?i)child\s+benefit"),
            ("gst_hst_credit", Keyword, r"(?i)\bRC151\b"),
            ("gst_hst_credit", Keyword, r"(?i)\bGST/HST\b"),
            ("statement_of_account", Keyword, r"(?i)balance\s+owing"),
            ("statement_of_account", Keyword, r"(?i)solde\s+(?:[àa]\s+payer|d[ûu])"),
            ("tax_return", Keyword, r"(?i)\bT1\s+General\b"),
            ("proof_of_income", Keyword, r"(?i)revenue\s+statement"),
        ])
    })
}

fn form_number_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(T1|T4[A-Z]?|T5[A-Z]?|RC\d{3}|T2202A?|RRSP)\b")
            .expect("valid form number pattern")
    })
}

/// CRA form numbers in order of first appearance, upper-cased.
pub fn form_numbers(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for caps in form_number_pattern().captures_iter(text) {
        let number = caps[1].to_uppercase();
        if !found.contains(&number) {
            found.push(number);
        }
    }
    found
}

pub fn has_issuer_phrase(text: &str) -> bool {
    let lower = text.to_lowercase();
    ISSUER_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageClassification {
    pub page: usize,
    pub document_type: &'static str,
    pub issuer: Option<&'static str>,
    pub issuer_confirmed: bool,
    pub match_strength: Option<&'static str>,
    pub matched_phrase: Option<String>,
    pub form_numbers: Vec<String>,
    pub confidence: f64,
}

/// Classify a single page of text.
pub fn classify_text(page: usize, text: &str, config: &CraConfig) -> PageClassification {
    let issuer_confirmed = has_issuer_phrase(text);
    let form_numbers = form_numbers(text);

    match first_match(rules(), text) {
        Some(hit) => {
            let (base, strength) = match hit.strength {
                Strength::Title => (config.title_confidence, "title"),
                Strength::FormCode | Strength::Keyword => (config.keyword_confidence, "keyword"),
            };
            let bonus = if issuer_confirmed { config.issuer_bonus } else { 0.0 };
            PageClassification {
                page,
                document_type: hit.label,
                issuer: Some(CRA_ISSUER),
                issuer_confirmed,
                match_strength: Some(strength),
                matched_phrase: Some(hit.matched),
                form_numbers,
                confidence: round2((base + bonus).min(config.max_confidence)),
            }
        }
        None => PageClassification {
            page,
            document_type: UNKNOWN,
            issuer: issuer_confirmed.then_some(CRA_ISSUER),
            issuer_confirmed,
            match_strength: None,
            matched_phrase: None,
            form_numbers,
            confidence: 0.0,
        },
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Args {
    pages: Option<Vec<usize>>,
}

#[derive(Debug, Serialize)]
struct Output {
    document_type: &'static str,
    issuer: Option<&'static str>,
    page: Option<usize>,
    matched_phrase: Option<String>,
    form_numbers: Vec<String>,
    pages: Vec<PageClassification>,
}

#[derive(Debug, Serialize)]
struct Hints {
    document_type: &'static str,
    issuer: Option<&'static str>,
    form_numbers: Vec<String>,
    message: String,
}

pub fn analyze(document: &Document, args: &Value, ctx: &AnalysisContext) -> Result<Analysis, ToolError> {
    let args: Args = parse_args(args)?;
    let config = &ctx.config.cra;

    let pages: Vec<PageClassification> = select_pages(document, args.pages.as_deref())?
        .into_iter()
        .map(|page| classify_text(page.number(), document.text(page), config))
        .collect();

    // Strictly greater keeps the earliest page on ties.
    let mut best: Option<&PageClassification> = None;
    for page in pages.iter().filter(|p| p.document_type != UNKNOWN) {
        if best.map_or(true, |b| page.confidence > b.confidence) {
            best = Some(page);
        }
    }

    let mut all_forms: Vec<String> = Vec::new();
    for number in pages.iter().flat_map(|p| &p.form_numbers) {
        if !all_forms.contains(number) {
            all_forms.push(number.clone());
        }
    }

    let issuer = best
        .and_then(|b| b.issuer)
        .or_else(|| pages.iter().find_map(|p| p.issuer));
    let document_type = best.map_or(UNKNOWN, |b| b.document_type);
    let confidence = best.map_or(0.0, |b| b.confidence);

    let message = match best {
        Some(b) => format!(
            "Page {} looks like a CRA {} (matched \"{}\")",
            b.page,
            b.document_type,
            b.matched_phrase.as_deref().unwrap_or_default()
        ),
        None => "No CRA document type recognized".to_string(),
    };

    let hints = Hints {
        document_type,
        issuer,
        form_numbers: all_forms.clone(),
        message,
    };

    let output = Output {
        document_type,
        issuer,
        page: best.map(|b| b.page),
        matched_phrase: best.and_then(|b| b.matched_phrase.clone()),
        form_numbers: all_forms,
        pages,
    };

    Analysis::new(&output, &hints, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::testing::*;
    use crate::tools::ToolName;
    use serde_json::json;

    fn ctx() -> AnalysisContext {
        AnalysisContext::new(Default::default(), 2024)
    }

    fn config() -> CraConfig {
        CraConfig::default()
    }

    // ========================================================================
    // classify_text
    // ========================================================================

    #[test]
    fn test_exact_title_beats_partial_keyword() {
        let exact = classify_text(1, "2023 Notice of Assessment", &config());
        let partial = classify_text(1, "Your assessment is enclosed", &config());

        assert_eq!(exact.document_type, "notice_of_assessment");
        assert_eq!(partial.document_type, "notice_of_assessment");
        assert_eq!(exact.match_strength, Some("title"));
        assert_eq!(partial.match_strength, Some("keyword"));
        assert!(exact.confidence > partial.confidence);
    }

    #[test]
    fn test_title_rule_wins_regardless_of_position() {
        let text = "Statement of Account ... see your Notice of Assessment";
        let hit = classify_text(1, text, &config());
        assert_eq!(hit.document_type, "notice_of_assessment");
    }

    #[test]
    fn test_issuer_phrase_adds_bonus_up_to_cap() {
        let hit = classify_text(1, "Canada Revenue Agency\nNotice of Assessment", &config());
        assert!(hit.issuer_confirmed);
        assert_eq!(hit.confidence, 0.95);

        let keyword = classify_text(1, "Agence du revenu du Canada - solde à payer", &config());
        assert_eq!(keyword.document_type, "statement_of_account");
        assert_eq!(keyword.confidence, 0.6);
    }

    #[test]
    fn test_french_titles() {
        let hit = classify_text(1, "Avis de cotisation 2023", &config());
        assert_eq!(hit.document_type, "notice_of_assessment");
        let hit = classify_text(1, "Allocation canadienne pour enfants", &config());
        assert_eq!(hit.document_type, "family_allowance");
    }

    #[test]
    fn test_no_match_is_unknown_with_zero_confidence() {
        let hit = classify_text(1, "Grocery receipt", &config());
        assert_eq!(hit.document_type, UNKNOWN);
        assert_eq!(hit.confidence, 0.0);
        assert_eq!(hit.issuer, None);
    }

    #[test]
    fn test_form_numbers_are_deduplicated_and_uppercased() {
        assert_eq!(
            form_numbers("Attach t4 and T4A slips, RC151, T4 again, T2202"),
            vec!["T4", "T4A", "RC151", "T2202"]
        );
        assert!(form_numbers("T400 RC15").is_empty());
    }

    // ========================================================================
    // analyze
    // ========================================================================

    #[test]
    fn test_document_result_is_best_page() {
        let doc = document(vec![
            text_page("balance owing"),
            text_page("Canada Revenue Agency Notice of Assessment"),
            text_page("Proof of income"),
        ]);
        let result = ToolName::DetectCraDocumentType.analyze(&doc, &Value::Null, &ctx());

        assert!(result.success);
        assert_eq!(result.data["document_type"], json!("notice_of_assessment"));
        assert_eq!(result.data["page"], json!(2));
        assert_eq!(result.data["issuer"], json!(CRA_ISSUER));
        assert_eq!(result.confidence, 0.95);
    }

    #[test]
    fn test_ties_keep_earliest_page() {
        let doc = document(vec![
            text_page("Statement of account"),
            text_page("Proof of income"),
        ]);
        let result = ToolName::DetectCraDocumentType.analyze(&doc, &Value::Null, &ctx());
        assert_eq!(result.data["page"], json!(1));
        assert_eq!(result.data["document_type"], json!("statement_of_account"));
    }

    #[test]
    fn test_unknown_document_still_succeeds() {
        let doc = document(vec![text_page("Hydro bill"), blank_page()]);
        let result = ToolName::DetectCraDocumentType.analyze(&doc, &Value::Null, &ctx());

        assert!(result.success);
        assert_eq!(result.data["document_type"], json!("unknown"));
        assert_eq!(result.confidence, 0.0);
        assert!(result.hints.unwrap()["message"].is_string());
    }

    #[test]
    fn test_page_selection() {
        let doc = document(vec![text_page("Notice of Assessment"), text_page("Statement of account")]);
        let result = ToolName::DetectCraDocumentType.analyze(&doc, &json!({"pages": [2]}), &ctx());
        assert_eq!(result.data["document_type"], json!("statement_of_account"));

        let result = ToolName::DetectCraDocumentType.analyze(&doc, &json!({"pages": [9]}), &ctx());
        assert!(!result.success);
    }

    // -- patterns --

    #[test]
    fn test_static_patterns_compile() {
        assert!(rules().len() > 10);
        assert!(rules().iter().all(|rule| !rule.pattern.as_str().is_empty()));
        assert!(form_number_pattern().is_match("rc151"));
    }
}
