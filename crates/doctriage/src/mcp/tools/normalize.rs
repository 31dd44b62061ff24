use super::{parse_args, to_text_result, JsonRpcError, Tool};
use doctriage_core::normalization;
use serde::Deserialize;
use serde_json::{json, Value};

fn string_schema(name: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            name: { "type": "string", "description": description }
        },
        "required": [name]
    })
}

pub fn tools() -> Vec<Tool> {
    vec![
        Tool {
            name: "parse_date".to_string(),
            description: "Parse the first date in a string (ISO, 12/16/2024, December 16, 2024, 16 décembre 2024) into YYYY-MM-DD.".to_string(),
            input_schema: string_schema("date_string", "Text containing a date"),
        },
        Tool {
            name: "parse_currency".to_string(),
            description: "Parse an amount such as '$1,234.56', '1.234,56 €', '1 234,56 $' or '(1,234.56)' into a number.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "amount_string": {
                        "type": "string",
                        "description": "Text containing the amount"
                    },
                    "currency": {
                        "type": "string",
                        "description": "Currency code to report (default: CAD)"
                    }
                },
                "required": ["amount_string"]
            }),
        },
        Tool {
            name: "normalize_name".to_string(),
            description: "Title-case a person name, fixing Mc and O' prefixes and optionally removing accents.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "raw_name": {
                        "type": "string",
                        "description": "Name as written on the document"
                    },
                    "remove_accents": {
                        "type": "boolean",
                        "description": "Strip accents from the result (default: true)"
                    }
                },
                "required": ["raw_name"]
            }),
        },
        Tool {
            name: "split_full_name".to_string(),
            description: "Split a full name into first and last name. The last word is the last name.".to_string(),
            input_schema: string_schema("full_name", "Full name"),
        },
        Tool {
            name: "normalize_address".to_string(),
            description: "Uppercase a Canadian address, remove accents and punctuation, and abbreviate street types and directions.".to_string(),
            input_schema: string_schema("raw_address", "Address as written on the document"),
        },
        Tool {
            name: "calculate_address_similarity".to_string(),
            description: "Compare two addresses after normalization. 80% or more is a match, 60% or more a likely match.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "address1": { "type": "string", "description": "First address" },
                    "address2": { "type": "string", "description": "Second address" }
                },
                "required": ["address1", "address2"]
            }),
        },
    ]
}

pub fn handle_parse_date(arguments: Option<Value>) -> Result<Value, JsonRpcError> {
    #[derive(Deserialize)]
    struct Args {
        date_string: String,
    }

    let args: Args = parse_args(arguments)?;
    match normalization::parse_date(&args.date_string) {
        Some(date) => to_text_result(&date, false),
        None => to_text_result(
            &json!({
                "error": format!("Could not parse date: {}", args.date_string),
                "original": args.date_string,
            }),
            true,
        ),
    }
}

pub fn handle_parse_currency(arguments: Option<Value>) -> Result<Value, JsonRpcError> {
    #[derive(Deserialize)]
    struct Args {
        amount_string: String,
        currency: Option<String>,
    }

    let args: Args = parse_args(arguments)?;
    let currency = args.currency.as_deref().unwrap_or("CAD");
    match normalization::parse_currency(&args.amount_string, currency) {
        Some(amount) => to_text_result(&amount, false),
        None => to_text_result(
            &json!({
                "error": format!("Could not parse amount: {}", args.amount_string),
                "original": args.amount_string,
            }),
            true,
        ),
    }
}

pub fn handle_normalize_name(arguments: Option<Value>) -> Result<Value, JsonRpcError> {
    #[derive(Deserialize)]
    struct Args {
        raw_name: String,
        remove_accents: Option<bool>,
    }

    let args: Args = parse_args(arguments)?;
    let name = normalization::normalize_name(&args.raw_name, args.remove_accents.unwrap_or(true));
    to_text_result(&name, false)
}

pub fn handle_split_full_name(arguments: Option<Value>) -> Result<Value, JsonRpcError> {
    #[derive(Deserialize)]
    struct Args {
        full_name: String,
    }

    let args: Args = parse_args(arguments)?;
    match normalization::split_full_name(&args.full_name) {
        Some(parts) => to_text_result(&parts, false),
        None => to_text_result(&json!({ "error": "Empty name" }), true),
    }
}

pub fn handle_normalize_address(arguments: Option<Value>) -> Result<Value, JsonRpcError> {
    #[derive(Deserialize)]
    struct Args {
        raw_address: String,
    }

    let args: Args = parse_args(arguments)?;
    let normalized = normalization::normalize_address(&args.raw_address);
    to_text_result(
        &json!({ "original": args.raw_address, "normalized": normalized }),
        false,
    )
}

pub fn handle_address_similarity(arguments: Option<Value>) -> Result<Value, JsonRpcError> {
    #[derive(Deserialize)]
    struct Args {
        address1: String,
        address2: String,
    }

    let args: Args = parse_args(arguments)?;
    to_text_result(
        &normalization::address_similarity(&args.address1, &args.address2),
        false,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(result: &Value) -> Value {
        serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap()
    }

    #[test]
    fn test_parse_date() {
        let result = handle_parse_date(Some(json!({"date_string": "15 janvier 2025"}))).unwrap();
        let date = payload(&result);
        assert_eq!(date["iso_format"], json!("2025-01-15"));
        assert_eq!(date["year"], json!(2025));

        let result = handle_parse_date(Some(json!({"date_string": "someday"}))).unwrap();
        assert_eq!(result["isError"], json!(true));
        assert_eq!(payload(&result)["original"], json!("someday"));
    }

    #[test]
    fn test_parse_currency() {
        let result = handle_parse_currency(Some(json!({"amount_string": "15 000,50 $"}))).unwrap();
        let amount = payload(&result);
        assert_eq!(amount["amount"], json!(15000.5));
        assert_eq!(amount["currency"], json!("CAD"));
        assert_eq!(amount["formatted"], json!("15,000.50"));

        let result = handle_parse_currency(Some(json!({"amount_string": "(12.00)", "currency": "usd"})))
            .unwrap();
        assert_eq!(payload(&result)["amount"], json!(-12.0));
        assert_eq!(payload(&result)["currency"], json!("USD"));

        let result = handle_parse_currency(Some(json!({"amount_string": "n/a"}))).unwrap();
        assert_eq!(result["isError"], json!(true));
    }

    #[test]
    fn test_normalize_name() {
        let result = handle_normalize_name(Some(json!({"raw_name": "JEAN-FRANÇOIS TREMBLAY"}))).unwrap();
        assert_eq!(payload(&result)["normalized"], json!("Jean-Francois Tremblay"));

        let result = handle_normalize_name(Some(
            json!({"raw_name": "JEAN-FRANÇOIS TREMBLAY", "remove_accents": false}),
        ))
        .unwrap();
        assert_eq!(payload(&result)["normalized"], json!("Jean-François Tremblay"));
    }

    #[test]
    fn test_split_full_name() {
        let result = handle_split_full_name(Some(json!({"full_name": "Marie-Pierre O'Brien"}))).unwrap();
        let parts = payload(&result);
        assert_eq!(parts["first_name"], json!("Marie-Pierre"));
        assert_eq!(parts["last_name"], json!("O'Brien"));

        let result = handle_split_full_name(Some(json!({"full_name": " "}))).unwrap();
        assert_eq!(result["isError"], json!(true));
    }

    #[test]
    fn test_normalize_address() {
        let result = handle_normalize_address(Some(json!({"raw_address": "123 Avenue North, Montreal"})))
            .unwrap();
        assert_eq!(payload(&result)["normalized"], json!("123 AVE N MONTREAL"));
    }

    #[test]
    fn test_address_similarity() {
        let result = handle_address_similarity(Some(json!({
            "address1": "123 Main Street, Montreal",
            "address2": "123 Main St Montreal"
        })))
        .unwrap();
        let similarity = payload(&result);
        assert_eq!(similarity["similarity_percent"], json!(100.0));
        assert_eq!(similarity["is_match"], json!(true));

        let err = handle_address_similarity(Some(json!({"address1": "x"}))).unwrap_err();
        assert_eq!(err.code, -32602);
    }

    #[test]
    fn test_tool_names_are_unique() {
        let names: std::collections::BTreeSet<String> = tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names.len(), 6);
    }
}
