//! Validators for Canadian identifiers and contact details found on triaged
//! documents.

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;

use crate::error::ToolError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinCheck {
    pub valid: bool,
    pub normalized: String,
    /// `XXX XXX XXX`, only for valid numbers.
    pub formatted: Option<String>,
    pub reason: Option<String>,
}

/// Check a Social Insurance Number: nine digits, not starting with 0 or 8,
/// passing the Luhn checksum. Spaces and dashes are ignored.
pub fn validate_sin(input: &str) -> SinCheck {
    let normalized: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    let reason = if normalized.len() != 9 || !normalized.chars().all(|c| c.is_ascii_digit()) {
        Some("SIN must contain exactly 9 digits")
    } else if normalized.starts_with('0') || normalized.starts_with('8') {
        Some("SIN cannot start with 0 or 8")
    } else if !luhn(&normalized) {
        Some("SIN fails the checksum")
    } else {
        None
    };

    let formatted = reason.is_none().then(|| {
        format!(
            "{} {} {}",
            &normalized[0..3],
            &normalized[3..6],
            &normalized[6..9]
        )
    });

    SinCheck {
        valid: reason.is_none(),
        normalized,
        formatted,
        reason: reason.map(str::to_string),
    }
}

/// Luhn checksum over an ASCII digit string.
fn luhn(digits: &str) -> bool {
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = (b - b'0') as u32;
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Country {
    #[serde(rename = "CA")]
    Canada,
    #[serde(rename = "US")]
    UnitedStates,
}

impl std::str::FromStr for Country {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CA" | "CAN" | "CANADA" => Ok(Country::Canada),
            "US" | "USA" => Ok(Country::UnitedStates),
            other => Err(format!("Unsupported country: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostalCheck {
    pub valid: bool,
    pub normalized: String,
    pub country: Country,
    pub reason: Option<String>,
}

const CA_EXCLUDED: &[char] = &['D', 'F', 'I', 'O', 'Q', 'U'];

/// Check a postal code for the given country and normalize its spacing.
pub fn validate_postal_code(input: &str, country: Country) -> PostalCheck {
    let upper = input.trim().to_ascii_uppercase();
    let (normalized, reason) = match country {
        Country::Canada => canadian_postal_code(&upper),
        Country::UnitedStates => zip_code(&upper),
    };

    PostalCheck {
        valid: reason.is_none(),
        normalized,
        country,
        reason: reason.map(str::to_string),
    }
}

fn canadian_postal_code(upper: &str) -> (String, Option<&'static str>) {
    let compact: Vec<char> = upper.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() != 6 {
        return (compact.into_iter().collect(), Some("Canadian postal codes have 6 characters"));
    }

    let shape_ok = compact.iter().enumerate().all(|(i, c)| {
        if i % 2 == 0 {
            c.is_ascii_alphabetic()
        } else {
            c.is_ascii_digit()
        }
    });
    let normalized = format!(
        "{} {}",
        compact[..3].iter().collect::<String>(),
        compact[3..].iter().collect::<String>()
    );

    if !shape_ok {
        return (normalized, Some("Expected the A1A 1A1 pattern"));
    }
    if compact.iter().any(|c| CA_EXCLUDED.contains(c)) {
        return (normalized, Some("Letters D, F, I, O, Q and U are not used"));
    }
    if matches!(compact[0], 'W' | 'Z') {
        return (normalized, Some("W and Z are not used as the first letter"));
    }
    (normalized, None)
}

fn zip_code(upper: &str) -> (String, Option<&'static str>) {
    let compact: String = upper.chars().filter(|c| !c.is_whitespace()).collect();
    let digits: String = compact.chars().filter(|c| *c != '-').collect();
    let all_digits = digits.chars().all(|c| c.is_ascii_digit());

    match (digits.len(), all_digits) {
        (5, true) if !compact.contains('-') => (digits, None),
        (9, true) if compact.len() == 9 || compact.find('-') == Some(5) => {
            (format!("{}-{}", &digits[..5], &digits[5..]), None)
        }
        _ => (compact, Some("Expected 12345 or 12345-6789")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailCheck {
    pub valid: bool,
    /// Trimmed and lowercased.
    pub normalized: String,
    pub local_part: Option<String>,
    pub domain: Option<String>,
    pub tld: Option<String>,
    pub reason: Option<String>,
}

fn email_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$").expect("valid email pattern")
    })
}

/// Check an email address against a simplified RFC 5322 shape.
pub fn validate_email(input: &str) -> EmailCheck {
    let normalized = input.trim().to_lowercase();
    let valid = email_pattern().is_match(&normalized);

    let (local_part, domain) = match normalized.split_once('@') {
        Some((local, domain)) if valid => (Some(local.to_string()), Some(domain.to_string())),
        _ => (None, None),
    };
    let tld = domain
        .as_deref()
        .and_then(|d| d.rsplit_once('.'))
        .map(|(_, tld)| tld.to_string());

    EmailCheck {
        valid,
        normalized,
        local_part,
        domain,
        tld,
        reason: (!valid).then(|| "Invalid email format".to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhoneCheck {
    pub valid: bool,
    /// Every digit of the input, country code included.
    pub digits: String,
    /// `(514) 555-1234`, or `+1 (514) 555-1234` when dialed with the country code.
    pub formatted: Option<String>,
    pub country: Country,
    pub reason: Option<String>,
}

/// Check a North American Numbering Plan number: ten digits, optionally
/// preceded by 1, with area code and exchange starting with 2 to 9.
pub fn validate_phone(input: &str, country: Country) -> PhoneCheck {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    let national = match digits.strip_prefix('1') {
        Some(rest) if digits.len() == 11 => rest,
        _ => digits.as_str(),
    };

    let reason = if national.len() != 10 {
        Some("Phone numbers have 10 digits, plus an optional leading 1")
    } else if !matches!(national.as_bytes()[0], b'2'..=b'9') {
        Some("Area codes start with a digit from 2 to 9")
    } else if !matches!(national.as_bytes()[3], b'2'..=b'9') {
        Some("Exchanges start with a digit from 2 to 9")
    } else {
        None
    };

    let formatted = reason.is_none().then(|| {
        let local = format!("({}) {}-{}", &national[..3], &national[3..6], &national[6..]);
        if digits.len() == 11 {
            format!("+1 {local}")
        } else {
            local
        }
    });

    PhoneCheck {
        valid: reason.is_none(),
        digits,
        formatted,
        country,
        reason: reason.map(str::to_string),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRangeCheck {
    pub valid: bool,
    /// ISO dates as parsed.
    pub start: String,
    pub end: String,
    pub days_difference: i64,
    pub is_chronological: bool,
    pub within_max_days: bool,
    pub start_in_future: bool,
    pub end_in_future: bool,
    pub reason: Option<String>,
}

/// Accepted date layouts, tried in order after ISO 8601 timestamps.
const RANGE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];

fn parse_range_date(input: &str) -> Result<NaiveDate, ToolError> {
    let input = input.trim();
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .map(|timestamp| timestamp.date())
        .or_else(|| {
            RANGE_DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(input, format).ok())
        })
        .ok_or_else(|| ToolError::InvalidArgument(format!("Cannot parse date: {input}")))
}

/// Check that `end` does not precede `start` and, when `max_days` is given,
/// that the range is at most that long. Future dates are flagged relative to
/// `today`, not rejected.
pub fn validate_date_range(
    start: &str,
    end: &str,
    max_days: Option<i64>,
    today: NaiveDate,
) -> Result<DateRangeCheck, ToolError> {
    let start = parse_range_date(start)?;
    let end = parse_range_date(end)?;

    let days_difference = (end - start).num_days();
    let is_chronological = end >= start;
    let within_max_days = max_days.map_or(true, |max| days_difference <= max);

    let reason = if !is_chronological {
        Some("End date is before the start date".to_string())
    } else if !within_max_days {
        max_days.map(|max| format!("Range exceeds {max} days"))
    } else {
        None
    };

    Ok(DateRangeCheck {
        valid: reason.is_none(),
        start: start.format("%Y-%m-%d").to_string(),
        end: end.format("%Y-%m-%d").to_string(),
        days_difference,
        is_chronological,
        within_max_days,
        start_in_future: start > today,
        end_in_future: end > today,
        reason,
    })
}
