use super::{internal_err, parse_args, to_text_result, JsonRpcError, Tool};
use crate::session::Session;
use doctriage_core::text::{self, DEFAULT_MAX_MATCHES};
use doctriage_core::validation::{self, Country};
use serde::Deserialize;
use serde_json::{json, Value};

pub fn tools() -> Vec<Tool> {
    vec![
        Tool {
            name: "count_pages".to_string(),
            description: "Count the pages of a PDF.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "reference": {
                        "type": "string",
                        "description": "Filesystem path, file:// URL, or http(s):// URL"
                    }
                },
                "required": ["reference"]
            }),
        },
        Tool {
            name: "extract_text_by_page".to_string(),
            description: "Return the text of each page, from the embedded text layer or OCR.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "reference": {
                        "type": "string",
                        "description": "Filesystem path, file:// URL, or http(s):// URL"
                    },
                    "pages": {
                        "type": "array",
                        "items": { "type": "number" },
                        "description": "1-based pages to return (default: every page)"
                    }
                },
                "required": ["reference"]
            }),
        },
        Tool {
            name: "search_text".to_string(),
            description: "Search page text with a regular expression. Returns each match with its page and 50 characters of context on either side.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "reference": {
                        "type": "string",
                        "description": "Filesystem path, file:// URL, or http(s):// URL"
                    },
                    "pattern": {
                        "type": "string",
                        "description": "Regular expression (e.g., 'T4A?\\b')"
                    },
                    "case_sensitive": {
                        "type": "boolean",
                        "description": "Match case exactly (default: false)"
                    },
                    "max_matches": {
                        "type": "number",
                        "description": "Maximum matches to return (default: 100)"
                    }
                },
                "required": ["reference", "pattern"]
            }),
        },
        Tool {
            name: "validate_sin".to_string(),
            description: "Validate a Canadian Social Insurance Number (9 digits, Luhn checksum). Spaces and dashes are ignored.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sin": {
                        "type": "string",
                        "description": "SIN to check (e.g., '130 692 544')"
                    }
                },
                "required": ["sin"]
            }),
        },
        Tool {
            name: "validate_postal_code".to_string(),
            description: "Validate and normalize a Canadian postal code (A1A 1A1) or US ZIP code.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "Postal code to check"
                    },
                    "country": {
                        "type": "string",
                        "description": "Country of the code (default: CA)",
                        "enum": ["CA", "US"]
                    }
                },
                "required": ["code"]
            }),
        },
        Tool {
            name: "validate_email".to_string(),
            description: "Validate an email address and split it into local part, domain and TLD.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "email": {
                        "type": "string",
                        "description": "Email address to check"
                    }
                },
                "required": ["email"]
            }),
        },
        Tool {
            name: "validate_phone".to_string(),
            description: "Validate and format a North American phone number: (514) 555-1234.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "phone": {
                        "type": "string",
                        "description": "Phone number to check"
                    },
                    "country": {
                        "type": "string",
                        "description": "Country of the number (default: CA)",
                        "enum": ["CA", "US"]
                    }
                },
                "required": ["phone"]
            }),
        },
        Tool {
            name: "validate_date_range".to_string(),
            description: "Check that an end date does not precede a start date, optionally within a maximum number of days. Future dates are flagged.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "start_date": {
                        "type": "string",
                        "description": "Start date (YYYY-MM-DD, DD/MM/YYYY, ...)"
                    },
                    "end_date": {
                        "type": "string",
                        "description": "End date"
                    },
                    "max_days": {
                        "type": "number",
                        "description": "Longest accepted range in days"
                    }
                },
                "required": ["start_date", "end_date"]
            }),
        },
    ]
}

fn parse_country(country: Option<&str>) -> Result<Country, JsonRpcError> {
    match country {
        Some(country) => country
            .parse::<Country>()
            .map_err(|e| super::invalid_params(format!("Invalid arguments: {e}"))),
        None => Ok(Country::Canada),
    }
}

#[derive(Deserialize)]
struct ReferenceArgs {
    reference: String,
}

pub async fn handle_count_pages(
    arguments: Option<Value>,
    session: &Session,
) -> Result<Value, JsonRpcError> {
    let args: ReferenceArgs = parse_args(arguments)?;
    let document = session
        .load(&args.reference)
        .await
        .map_err(|e| internal_err(e.to_string()))?;

    to_text_result(&json!({ "page_count": document.page_count() }), false)
}

pub async fn handle_extract_text(
    arguments: Option<Value>,
    session: &Session,
) -> Result<Value, JsonRpcError> {
    #[derive(Deserialize)]
    struct Args {
        reference: String,
        pages: Option<Vec<usize>>,
    }

    let args: Args = parse_args(arguments)?;
    let document = session
        .load(&args.reference)
        .await
        .map_err(|e| internal_err(e.to_string()))?;

    match text::extract_text_by_page(&document, args.pages.as_deref()) {
        Ok(pages) => to_text_result(&pages, false),
        Err(err) => to_text_result(&json!({ "error": err.to_string() }), true),
    }
}

pub async fn handle_search_text(
    arguments: Option<Value>,
    session: &Session,
) -> Result<Value, JsonRpcError> {
    #[derive(Deserialize)]
    struct Args {
        reference: String,
        pattern: String,
        #[serde(default)]
        case_sensitive: bool,
        max_matches: Option<usize>,
    }

    let args: Args = parse_args(arguments)?;
    let document = session
        .load(&args.reference)
        .await
        .map_err(|e| internal_err(e.to_string()))?;

    let options = text::SearchOptions {
        case_sensitive: args.case_sensitive,
        max_matches: args.max_matches.unwrap_or(DEFAULT_MAX_MATCHES),
    };
    match text::search_text(&document, &args.pattern, &options) {
        Ok(outcome) => to_text_result(&outcome, false),
        Err(err) => to_text_result(&json!({ "error": err.to_string() }), true),
    }
}

pub fn handle_validate_sin(arguments: Option<Value>) -> Result<Value, JsonRpcError> {
    #[derive(Deserialize)]
    struct Args {
        sin: String,
    }

    let args: Args = parse_args(arguments)?;
    to_text_result(&validation::validate_sin(&args.sin), false)
}

pub fn handle_validate_postal_code(arguments: Option<Value>) -> Result<Value, JsonRpcError> {
    #[derive(Deserialize)]
    struct Args {
        code: String,
        country: Option<String>,
    }

    let args: Args = parse_args(arguments)?;
    let country = parse_country(args.country.as_deref())?;

    to_text_result(&validation::validate_postal_code(&args.code, country), false)
}

pub fn handle_validate_email(arguments: Option<Value>) -> Result<Value, JsonRpcError> {
    #[derive(Deserialize)]
    struct Args {
        email: String,
    }

    let args: Args = parse_args(arguments)?;
    to_text_result(&validation::validate_email(&args.email), false)
}

pub fn handle_validate_phone(arguments: Option<Value>) -> Result<Value, JsonRpcError> {
    #[derive(Deserialize)]
    struct Args {
        phone: String,
        country: Option<String>,
    }

    let args: Args = parse_args(arguments)?;
    let country = parse_country(args.country.as_deref())?;

    to_text_result(&validation::validate_phone(&args.phone, country), false)
}

pub fn handle_validate_date_range(arguments: Option<Value>) -> Result<Value, JsonRpcError> {
    #[derive(Deserialize)]
    struct Args {
        start_date: String,
        end_date: String,
        max_days: Option<i64>,
    }

    let args: Args = parse_args(arguments)?;
    let today = chrono::Local::now().date_naive();
    match validation::validate_date_range(&args.start_date, &args.end_date, args.max_days, today) {
        Ok(check) => to_text_result(&check, false),
        Err(err) => to_text_result(&json!({ "error": err.to_string() }), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{pdf_file, session};

    fn payload(result: &Value) -> Value {
        serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap()
    }

    // -- validators --

    #[test]
    fn test_validate_postal_code() {
        let result = handle_validate_postal_code(Some(json!({"code": "h2x1y4"}))).unwrap();
        let check = payload(&result);
        assert_eq!(check["valid"], json!(true));
        assert_eq!(check["normalized"], json!("H2X 1Y4"));
        assert_eq!(check["country"], json!("CA"));

        let result =
            handle_validate_postal_code(Some(json!({"code": "90210", "country": "US"}))).unwrap();
        assert_eq!(payload(&result)["valid"], json!(true));

        let err = handle_validate_postal_code(Some(json!({"code": "1", "country": "FR"})))
            .unwrap_err();
        assert_eq!(err.code, -32602);
    }

    #[test]
    fn test_validate_email() {
        let result = handle_validate_email(Some(json!({"email": " Jane.Doe@Example.CA "}))).unwrap();
        let check = payload(&result);
        assert_eq!(check["valid"], json!(true));
        assert_eq!(check["domain"], json!("example.ca"));
        assert_eq!(check["tld"], json!("ca"));

        let result = handle_validate_email(Some(json!({"email": "jane@"}))).unwrap();
        assert_eq!(payload(&result)["valid"], json!(false));
    }

    #[test]
    fn test_validate_phone() {
        let result = handle_validate_phone(Some(json!({"phone": "1-514-555-1234"}))).unwrap();
        let check = payload(&result);
        assert_eq!(check["valid"], json!(true));
        assert_eq!(check["formatted"], json!("+1 (514) 555-1234"));
        assert_eq!(check["country"], json!("CA"));

        let result = handle_validate_phone(Some(json!({"phone": "555-1234", "country": "US"}))).unwrap();
        assert_eq!(payload(&result)["valid"], json!(false));

        let err = handle_validate_phone(Some(json!({"phone": "5145551234", "country": "FR"})))
            .unwrap_err();
        assert_eq!(err.code, -32602);
    }

    #[test]
    fn test_validate_date_range() {
        let result = handle_validate_date_range(Some(json!({
            "start_date": "2024-01-01",
            "end_date": "2024-12-31",
            "max_days": 400
        })))
        .unwrap();
        let check = payload(&result);
        assert_eq!(check["valid"], json!(true));
        assert_eq!(check["days_difference"], json!(365));

        let result = handle_validate_date_range(Some(json!({
            "start_date": "2024-12-31",
            "end_date": "2024-01-01"
        })))
        .unwrap();
        assert_eq!(payload(&result)["is_chronological"], json!(false));

        let result = handle_validate_date_range(Some(json!({
            "start_date": "someday",
            "end_date": "2024-01-01"
        })))
        .unwrap();
        assert_eq!(result["isError"], json!(true));
    }

    // -- text --

    #[tokio::test]
    async fn test_extract_text_by_page() {
        let (_file, path) = pdf_file(&["First page", "Second page"]);
        let session = session();

        let result = handle_extract_text(Some(json!({"reference": path, "pages": [2]})), &session)
            .await
            .unwrap();
        let pages = payload(&result);
        assert_eq!(pages.as_array().unwrap().len(), 1);
        assert_eq!(pages[0]["page"], json!(2));
        assert!(pages[0]["text"].as_str().unwrap().contains("Second page"));

        let result = handle_extract_text(Some(json!({"reference": path, "pages": [9]})), &session)
            .await
            .unwrap();
        assert_eq!(result["isError"], json!(true));
    }

    #[tokio::test]
    async fn test_search_text() {
        let (_file, path) = pdf_file(&["Form T4 for 2023", "Another T4 slip"]);
        let session = session();

        let result = handle_search_text(
            Some(json!({"reference": path, "pattern": "t4", "max_matches": 1})),
            &session,
        )
        .await
        .unwrap();
        let outcome = payload(&result);
        assert_eq!(outcome["total_matches"], json!(2));
        assert_eq!(outcome["truncated"], json!(true));
        assert_eq!(outcome["matches"][0]["page"], json!(1));

        let result = handle_search_text(Some(json!({"reference": path, "pattern": "("})), &session)
            .await
            .unwrap();
        assert_eq!(result["isError"], json!(true));
    }
}
