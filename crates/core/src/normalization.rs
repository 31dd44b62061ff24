//! Normalizers for values extracted from documents: dates, amounts, person
//! names and Canadian addresses. English and French inputs are accepted.

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::{Captures, Regex};
use serde::Serialize;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Similarity at or above which two addresses are the same place.
pub const ADDRESS_MATCH_PERCENT: f64 = 80.0;
/// Similarity at or above which two addresses deserve a manual review.
pub const ADDRESS_LIKELY_MATCH_PERCENT: f64 = 60.0;

const MONTHS: [(&str, u32); 31] = [
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
    ("janvier", 1),
    ("fevrier", 2),
    ("mars", 3),
    ("avril", 4),
    ("mai", 5),
    ("juin", 6),
    ("juillet", 7),
    ("aout", 8),
    ("septembre", 9),
    ("octobre", 10),
    ("novembre", 11),
    ("decembre", 12),
    ("sept", 9),
    ("janv", 1),
    ("fevr", 2),
    ("avr", 4),
    ("juil", 7),
    ("oct", 10),
    ("dec", 12),
];

/// Remove diacritics: `é` becomes `e`, `Ç` becomes `C`.
pub fn strip_accents(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// -- Dates --

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedDate {
    pub original: String,
    /// `YYYY-MM-DD`.
    pub iso_format: String,
    /// `December 16, 2024`.
    pub human_format: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// Midnight UTC, in seconds since the epoch.
    pub timestamp: i64,
}

impl ParsedDate {
    fn new(original: &str, date: NaiveDate) -> Self {
        ParsedDate {
            original: original.to_string(),
            iso_format: date.format("%Y-%m-%d").to_string(),
            human_format: date.format("%B %d, %Y").to_string(),
            year: date.year(),
            month: date.month(),
            day: date.day(),
            timestamp: date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp(),
        }
    }
}

fn month_alternation() -> String {
    let mut names: Vec<&str> = MONTHS.iter().map(|(name, _)| *name).collect();
    // Longest first so "sept" does not shadow "septembre".
    names.sort_by_key(|name| std::cmp::Reverse(name.len()));
    names.join("|")
}

fn month_number(name: &str) -> Option<u32> {
    let name = name.trim_end_matches('.');
    MONTHS
        .iter()
        .find(|(full, _)| *full == name)
        .map(|(_, n)| *n)
        .or_else(|| {
            // English three-letter abbreviations: "jan", "feb", ...
            (name.len() == 3)
                .then(|| MONTHS[..12].iter().find(|(full, _)| full.starts_with(name)))
                .flatten()
                .map(|(_, n)| *n)
        })
}

fn iso_date() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})\b").expect("valid ISO date pattern")
    })
}

fn numeric_date() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})[-/.](\d{1,2})[-/.](\d{4})\b").expect("valid numeric date pattern")
    })
}

fn day_month_year() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let months = month_alternation();
        Regex::new(&format!(
            r"\b(\d{{1,2}})(?:er|st|nd|rd|th)?\s+({months}|[a-z]{{3}}\.?)\.?,?\s+(\d{{4}})\b"
        ))
        .expect("valid day-month-year pattern")
    })
}

fn month_day_year() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let months = month_alternation();
        Regex::new(&format!(
            r"\b({months}|[a-z]{{3}})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})\b"
        ))
        .expect("valid month-day-year pattern")
    })
}

fn number<T: std::str::FromStr>(caps: &Captures, i: usize) -> Option<T> {
    caps.get(i)?.as_str().parse().ok()
}

/// Parse the first date found in `input`.
///
/// Numeric dates are read month first (`05/06/2024` is May 6) unless the
/// first number cannot be a month (`16/12/2024` is December 16).
pub fn parse_date(input: &str) -> Option<ParsedDate> {
    let folded = strip_accents(&input.to_lowercase());

    let from_iso = || {
        iso_date().captures_iter(&folded).find_map(|caps| {
            NaiveDate::from_ymd_opt(number(&caps, 1)?, number(&caps, 2)?, number(&caps, 3)?)
        })
    };
    let from_numeric = || {
        numeric_date().captures_iter(&folded).find_map(|caps| {
            let (first, second, year): (u32, u32, i32) =
                (number(&caps, 1)?, number(&caps, 2)?, number(&caps, 3)?);
            NaiveDate::from_ymd_opt(year, first, second)
                .or_else(|| NaiveDate::from_ymd_opt(year, second, first))
        })
    };
    let from_day_month = || {
        day_month_year().captures_iter(&folded).find_map(|caps| {
            let month = month_number(caps.get(2)?.as_str())?;
            NaiveDate::from_ymd_opt(number(&caps, 3)?, month, number(&caps, 1)?)
        })
    };
    let from_month_day = || {
        month_day_year().captures_iter(&folded).find_map(|caps| {
            let month = month_number(caps.get(1)?.as_str())?;
            NaiveDate::from_ymd_opt(number(&caps, 3)?, month, number(&caps, 2)?)
        })
    };

    let date = from_iso()
        .or_else(from_numeric)
        .or_else(from_day_month)
        .or_else(from_month_day)?;
    log::debug!("parsed date {:?} as {}", input, date);
    Some(ParsedDate::new(input, date))
}

// -- Currency --

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrencyAmount {
    pub original: String,
    pub amount: f64,
    pub currency: String,
    /// Two decimals with comma thousands separators: `15,000.50`.
    pub formatted: String,
}

fn currency_marks() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)[$€£¥]|\b(?:CAD|USD|EUR|GBP)\b|\bCA\$").expect("valid currency pattern")
    })
}

fn trailing_cents() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\d{2}$").expect("valid cents pattern"))
}

/// Parse an amount written in North American (`$1,234.56`), European
/// (`1.234,56 €`) or French Canadian (`1 234,56 $`) style. Parentheses mark
/// a negative amount, as in accounting statements.
pub fn parse_amount(input: &str) -> Option<f64> {
    let stripped = currency_marks().replace_all(input, "");
    let mut cleaned = stripped.trim();

    let negative = cleaned.starts_with('(') && cleaned.ends_with(')') && cleaned.len() >= 2;
    if negative {
        cleaned = &cleaned[1..cleaned.len() - 1];
    }

    let compact: String = cleaned.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty()
        || !compact
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '+'))
    {
        return None;
    }

    let dots = compact.matches('.').count();
    let commas = compact.matches(',').count();
    let numeric = match (dots, commas) {
        (_, 0) if dots <= 1 => compact,
        (0, 1) if trailing_cents().is_match(&compact) => compact.replace(',', "."),
        (0, _) => compact.replace(',', ""),
        _ => {
            let last_dot = compact.rfind('.');
            let last_comma = compact.rfind(',');
            if last_dot > last_comma {
                compact.replace(',', "")
            } else {
                compact.replace('.', "").replace(',', ".")
            }
        }
    };

    let value: f64 = numeric.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// `1234567.891` becomes `1,234,567.89`.
pub fn format_amount(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((&fixed, "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{cents}")
}

pub fn parse_currency(input: &str, currency: &str) -> Option<CurrencyAmount> {
    let amount = parse_amount(input)?;
    Some(CurrencyAmount {
        original: input.to_string(),
        amount,
        currency: currency.trim().to_uppercase(),
        formatted: format_amount(amount),
    })
}

// -- Names --

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedName {
    pub original: String,
    pub normalized: String,
    pub without_accents: String,
}

fn name_noise() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s'-]").expect("valid name noise pattern"))
}

fn name_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(Mc|O')(\p{Ll})").expect("valid name prefix pattern"))
}

/// Capitalize the first letter of every run of letters.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// Title-case a person name, keeping hyphens and apostrophes and fixing the
/// `Mc` and `O'` prefixes: `MARIE-PIERRE O'BRIEN` becomes `Marie-Pierre O'Brien`.
pub fn normalize_name(raw: &str, remove_accents: bool) -> NormalizedName {
    let collapsed = collapse_whitespace(raw);
    let cleaned = name_noise().replace_all(&collapsed, "");
    let titled = title_case(&cleaned);
    let prefixed = name_prefix()
        .replace_all(&titled, |caps: &Captures| {
            format!("{}{}", &caps[1], caps[2].to_uppercase())
        })
        .into_owned();

    let without_accents = strip_accents(&prefixed);
    NormalizedName {
        original: raw.to_string(),
        normalized: if remove_accents {
            without_accents.clone()
        } else {
            prefixed
        },
        without_accents,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameParts {
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub parts_count: usize,
}

/// Split a full name on its last word. A single word is taken as the last
/// name. `None` for an empty name.
pub fn split_full_name(full_name: &str) -> Option<NameParts> {
    let parts: Vec<&str> = full_name.split_whitespace().collect();
    let (last_name, first) = parts.split_last()?;
    Some(NameParts {
        full_name: full_name.to_string(),
        first_name: first.join(" "),
        last_name: last_name.to_string(),
        parts_count: parts.len(),
    })
}

// -- Addresses --

const STREET_TYPES: &[(&str, &str)] = &[
    ("AVENUE", "AVE"),
    ("BOULEVARD", "BLVD"),
    ("CHEMIN", "CH"),
    ("CIRCLE", "CIR"),
    ("COURT", "CRT"),
    ("CRESCENT", "CRES"),
    ("DRIVE", "DR"),
    ("PLACE", "PL"),
    ("ROAD", "RD"),
    ("ROUTE", "RTE"),
    ("STREET", "ST"),
    ("TERRACE", "TERR"),
    ("RANG", "RG"),
    ("MONTEE", "MTEE"),
    ("NORTH", "N"),
    ("SOUTH", "S"),
    ("EAST", "E"),
    ("WEST", "W"),
    ("NORD", "N"),
    ("SUD", "S"),
    ("EST", "E"),
    ("OUEST", "O"),
];

fn address_noise() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s#-]").expect("valid address noise pattern"))
}

fn address_words() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let words: Vec<&str> = STREET_TYPES.iter().map(|(word, _)| *word).collect();
        Regex::new(&format!(r"\b(?:{})\b", words.join("|"))).expect("valid address word pattern")
    })
}

/// Uppercase, accent-free address with abbreviated street types and
/// directions: `123 Avenue North, Montréal` becomes `123 AVE N MONTREAL`.
pub fn normalize_address(raw: &str) -> String {
    let upper = strip_accents(&collapse_whitespace(raw).to_uppercase());
    let cleaned = address_noise().replace_all(&upper, " ");
    let abbreviated = address_words().replace_all(&cleaned, |caps: &Captures| {
        let word = &caps[0];
        STREET_TYPES
            .iter()
            .find(|(full, _)| *full == word)
            .map_or(word, |(_, short)| *short)
            .to_string()
    });
    collapse_whitespace(&abbreviated)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressSimilarity {
    pub address1: String,
    pub address2: String,
    pub normalized1: String,
    pub normalized2: String,
    pub similarity_ratio: f64,
    /// Ratio in percent, one decimal.
    pub similarity_percent: f64,
    pub is_match: bool,
    pub is_likely_match: bool,
}

/// Compare two addresses after [`normalize_address`].
pub fn address_similarity(address1: &str, address2: &str) -> AddressSimilarity {
    let normalized1 = normalize_address(address1);
    let normalized2 = normalize_address(address2);
    let ratio = similarity_ratio(&normalized1, &normalized2);
    let percent = (ratio * 1000.0).round() / 10.0;

    AddressSimilarity {
        address1: address1.to_string(),
        address2: address2.to_string(),
        normalized1,
        normalized2,
        similarity_ratio: ratio,
        similarity_percent: percent,
        is_match: percent >= ADDRESS_MATCH_PERCENT,
        is_likely_match: percent >= ADDRESS_LIKELY_MATCH_PERCENT,
    }
}

/// Ratcliff/Obershelp similarity: twice the matched characters over the total
/// length, matching the longest common block first and recursing on both sides.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / total as f64
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let (start_a, start_b, len) = longest_common_block(a, b);
    if len == 0 {
        return 0;
    }
    len + matched_chars(&a[..start_a], &b[..start_b])
        + matched_chars(&a[start_a + len..], &b[start_b + len..])
}

/// Longest common substring, earliest in `a` then in `b` on ties.
fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut previous = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        let mut current = vec![0usize; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            if ca == cb {
                let len = previous[j] + 1;
                current[j + 1] = len;
                if len > best.2 {
                    best = (i + 1 - len, j + 1 - len, len);
                }
            }
        }
        previous = current;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- parse_date --

    #[test]
    fn test_parse_date_formats() {
        let iso = |s: &str| parse_date(s).map(|d| d.iso_format);
        assert_eq!(iso("2024-12-16").as_deref(), Some("2024-12-16"));
        assert_eq!(iso("December 16, 2024").as_deref(), Some("2024-12-16"));
        assert_eq!(iso("16 December 2024").as_deref(), Some("2024-12-16"));
        assert_eq!(iso("16 décembre 2024").as_deref(), Some("2024-12-16"));
        assert_eq!(iso("1er janvier 2025").as_deref(), Some("2025-01-01"));
        assert_eq!(iso("Dec. 5th, 2023").as_deref(), Some("2023-12-05"));
        assert_eq!(iso("Issued on 15 août 2023 in Montréal").as_deref(), Some("2023-08-15"));
    }

    #[test]
    fn test_numeric_dates_are_month_first_when_possible() {
        let iso = |s: &str| parse_date(s).map(|d| d.iso_format);
        assert_eq!(iso("12/16/2024").as_deref(), Some("2024-12-16"));
        assert_eq!(iso("16/12/2024").as_deref(), Some("2024-12-16"));
        assert_eq!(iso("05/06/2024").as_deref(), Some("2024-05-06"));
    }

    #[test]
    fn test_parsed_date_fields() {
        let date = parse_date("16 décembre 2024").unwrap();
        assert_eq!(date.original, "16 décembre 2024");
        assert_eq!(date.human_format, "December 16, 2024");
        assert_eq!((date.year, date.month, date.day), (2024, 12, 16));
        assert_eq!(date.timestamp, 1_734_307_200);
    }

    #[test]
    fn test_unparseable_dates() {
        assert_eq!(parse_date("no date here"), None);
        assert_eq!(parse_date("2024-02-30"), None);
        assert_eq!(parse_date("31 février 2024"), None);
    }

    // -- parse_currency --

    #[test]
    fn test_parse_amount_styles() {
        assert_eq!(parse_amount("$15,000.50"), Some(15000.50));
        assert_eq!(parse_amount("15 000,50 $"), Some(15000.50));
        assert_eq!(parse_amount("1.234,56 €"), Some(1234.56));
        assert_eq!(parse_amount("1234,56"), Some(1234.56));
        assert_eq!(parse_amount("1,234"), Some(1234.0));
        assert_eq!(parse_amount("1,234,567"), Some(1234567.0));
        assert_eq!(parse_amount("(1,234.56)"), Some(-1234.56));
        assert_eq!(parse_amount("CAD 42"), Some(42.0));
        assert_eq!(parse_amount("-7.5"), Some(-7.5));
    }

    #[test]
    fn test_parse_amount_rejects_text() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("$"), None);
        assert_eq!(parse_amount("inf"), None);
        assert_eq!(parse_amount("twelve dollars"), None);
        assert_eq!(parse_amount("1.2.3"), None);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(15000.5), "15,000.50");
        assert_eq!(format_amount(999.999), "1,000.00");
        assert_eq!(format_amount(-1234567.891), "-1,234,567.89");
        assert_eq!(format_amount(0.0), "0.00");
    }

    #[test]
    fn test_parse_currency() {
        let amount = parse_currency("15 000,50 $", "cad").unwrap();
        assert_eq!(amount.amount, 15000.50);
        assert_eq!(amount.currency, "CAD");
        assert_eq!(amount.formatted, "15,000.50");
        assert!(parse_currency("n/a", "CAD").is_none());
    }

    // -- names --

    #[test]
    fn test_normalize_name() {
        let name = normalize_name("  JEAN-FRANÇOIS   TREMBLAY ", true);
        assert_eq!(name.normalized, "Jean-Francois Tremblay");
        assert_eq!(name.without_accents, "Jean-Francois Tremblay");

        let kept = normalize_name("jean-françois tremblay", false);
        assert_eq!(kept.normalized, "Jean-François Tremblay");
        assert_eq!(kept.without_accents, "Jean-Francois Tremblay");

        assert_eq!(normalize_name("MARIE-PIERRE O'BRIEN", true).normalized, "Marie-Pierre O'Brien");
        assert_eq!(normalize_name("ronald mcdonald", true).normalized, "Ronald McDonald");
        assert_eq!(normalize_name("Dr. John Smith!", true).normalized, "Dr John Smith");
    }

    #[test]
    fn test_split_full_name() {
        let parts = split_full_name("Jean-François Marie Tremblay").unwrap();
        assert_eq!(parts.first_name, "Jean-François Marie");
        assert_eq!(parts.last_name, "Tremblay");
        assert_eq!(parts.parts_count, 3);

        let single = split_full_name(" Tremblay ").unwrap();
        assert_eq!(single.first_name, "");
        assert_eq!(single.last_name, "Tremblay");

        assert_eq!(split_full_name("   "), None);
    }

    // -- addresses --

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("123 Avenue North, Montreal"), "123 AVE N MONTREAL");
        assert_eq!(
            normalize_address("123 rue de l'Église, Montréal"),
            "123 RUE DE L EGLISE MONTREAL"
        );
        assert_eq!(normalize_address("45 boul. Saint-Joseph Est #200"), "45 BOUL SAINT-JOSEPH E #200");
        assert_eq!(normalize_address("9 Westmount Road"), "9 WESTMOUNT RD");
    }

    #[test]
    fn test_address_similarity() {
        let same = address_similarity("123 Main Street, Montreal", "123 MAIN ST MONTREAL");
        assert_eq!(same.similarity_percent, 100.0);
        assert!(same.is_match);

        let close = address_similarity("123 Rue de l'Église, Montreal", "123 rue Eglise Montreal");
        assert_eq!(close.normalized2, "123 RUE EGLISE MONTREAL");
        assert_eq!(close.similarity_percent, 90.2);
        assert!(close.is_match);

        let far = address_similarity("123 Main Street, Montreal", "9 Elm Road, Halifax");
        assert!(!far.is_likely_match);
    }

    #[test]
    fn test_similarity_ratio() {
        assert_eq!(similarity_ratio("", ""), 1.0);
        assert_eq!(similarity_ratio("abcd", "abcd"), 1.0);
        assert_eq!(similarity_ratio("abcd", "wxyz"), 0.0);
        // "ab" then "d" match: 2 * 3 / 8.
        assert_eq!(similarity_ratio("abcd", "abxd"), 0.75);
    }

    // -- patterns --

    #[test]
    fn test_static_patterns_compile() {
        assert!(iso_date().is_match("2024-01-31"));
        assert!(numeric_date().is_match("31/01/2024"));
        assert!(day_month_year().is_match("31 janvier 2024"));
        assert!(month_day_year().is_match("january 31, 2024"));
        assert!(currency_marks().is_match("CAD"));
        assert!(trailing_cents().is_match("12,50"));
        assert!(name_noise().is_match("!"));
        assert!(name_prefix().is_match("Mcd"));
        assert!(address_noise().is_match(","));
        assert!(address_words().is_match("STREET"));
    }
}
