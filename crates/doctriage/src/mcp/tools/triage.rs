use std::collections::BTreeMap;

use super::{internal_err, invalid_params, parse_args, to_text_result, JsonRpcError, Tool};
use crate::session::Session;
use doctriage_core::{ToolName, ToolRequest};
use serde::Deserialize;
use serde_json::{json, Map, Value};

fn reference_property() -> Value {
    json!({
        "type": "string",
        "description": "PDF to analyze: filesystem path, file:// URL, or http(s):// URL (e.g. a presigned blob URL)"
    })
}

fn pages_property() -> Value {
    json!({
        "type": "array",
        "items": { "type": "number" },
        "description": "1-based pages to inspect (default: every page)"
    })
}

/// Optional per-call overrides accepted by each heuristic.
fn arg_properties(tool: ToolName) -> Value {
    match tool {
        ToolName::DetectBlankPages => json!({
            "variance_threshold": {
                "type": "number",
                "description": "Gray-level variance below which a page looks empty (default: 100)"
            },
            "density_threshold": {
                "type": "number",
                "description": "Text characters per square inch below which a page has no text (default: 0.05)"
            },
            "separation_band": {
                "type": "number",
                "description": "Relative margin around a threshold reported as borderline (default: 0.25)"
            }
        }),
        ToolName::DetectIdCardSides => json!({
            "ratio_tolerance": {
                "type": "number",
                "description": "Relative tolerance on the card aspect ratio (default: 0.15)"
            }
        }),
        ToolName::DetectCraDocumentType | ToolName::DetectTaxFormType => json!({
            "pages": pages_property()
        }),
        ToolName::DetectDocumentBoundaries => json!({
            "signature_threshold": {
                "type": "number",
                "description": "Layout distance above which a new document starts (default: 0.35)"
            }
        }),
        ToolName::ExtractFiscalYear => json!({
            "reference_year": {
                "type": "number",
                "description": "Year the plausibility window is anchored on (default: current year)"
            },
            "lookback_years": {
                "type": "number",
                "description": "Oldest accepted year relative to reference_year (default: 15)"
            },
            "lookahead_years": {
                "type": "number",
                "description": "Newest accepted year relative to reference_year (default: 1)"
            }
        }),
        ToolName::AssessImageQuality => json!({
            "assumed_page_long_side_in": {
                "type": "number",
                "description": "Long page side in inches when the PDF has no page size (default: 11)"
            }
        }),
    }
}

pub fn tools() -> Vec<Tool> {
    let mut tools: Vec<Tool> = ToolName::ALL
        .into_iter()
        .map(|tool| {
            let mut properties = Map::new();
            properties.insert("reference".into(), reference_property());
            if let Value::Object(args) = arg_properties(tool) {
                properties.extend(args);
            }
            Tool {
                name: tool.as_str().to_string(),
                description: tool.description().to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": properties,
                    "required": ["reference"]
                }),
            }
        })
        .collect();

    let names: Vec<&str> = ToolName::ALL.iter().map(|tool| tool.as_str()).collect();
    tools.push(Tool {
        name: "analyze_document".to_string(),
        description: "Load a PDF once and run several triage heuristics on it in parallel. Returns one result per tool, keyed by tool name; a failing tool never hides the others.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "reference": reference_property(),
                "tools": {
                    "type": "array",
                    "items": { "type": "string", "enum": names },
                    "description": "Tools to run (default: all)"
                },
                "args": {
                    "type": "object",
                    "description": "Per-tool overrides keyed by tool name, e.g. {\"detect_blank_pages\": {\"variance_threshold\": 80}}"
                }
            },
            "required": ["reference"]
        }),
    });

    tools
}

/// Split `reference` out of the arguments; the rest are the tool's own args.
fn split_reference(arguments: Option<Value>) -> Result<(String, Value), JsonRpcError> {
    let mut map = match arguments {
        Some(Value::Object(map)) => map,
        _ => return Err(invalid_params("Invalid arguments: expected an object".into())),
    };
    match map.remove("reference") {
        Some(Value::String(reference)) => Ok((reference, Value::Object(map))),
        _ => Err(invalid_params(
            "Invalid arguments: missing string field `reference`".into(),
        )),
    }
}

pub async fn handle_tool(
    tool: ToolName,
    arguments: Option<Value>,
    session: &Session,
) -> Result<Value, JsonRpcError> {
    let (reference, args) = split_reference(arguments)?;

    let aggregate = session
        .analyze(&reference, vec![ToolRequest::with_args(tool, args)])
        .await
        .map_err(|e| internal_err(e.to_string()))?;

    let result = aggregate
        .get(tool)
        .ok_or_else(|| internal_err(format!("{tool} produced no result")))?;
    to_text_result(result, !result.success)
}

pub async fn handle_analyze_document(
    arguments: Option<Value>,
    session: &Session,
) -> Result<Value, JsonRpcError> {
    #[derive(Deserialize)]
    struct Args {
        reference: String,
        tools: Option<Vec<String>>,
        #[serde(default)]
        args: BTreeMap<String, Value>,
    }

    let mut args: Args = parse_args(arguments)?;

    for name in args.args.keys() {
        name.parse::<ToolName>()
            .map_err(|e| invalid_params(format!("Invalid arguments: {e}")))?;
    }

    let tools = match args.tools {
        Some(names) => names
            .iter()
            .map(|name| name.parse::<ToolName>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid_params(format!("Invalid arguments: {e}")))?,
        None => ToolName::ALL.to_vec(),
    };

    let requests = tools
        .into_iter()
        .map(|tool| {
            let tool_args = args.args.remove(tool.as_str()).unwrap_or(Value::Null);
            ToolRequest::with_args(tool, tool_args)
        })
        .collect();

    let aggregate = session
        .analyze(&args.reference, requests)
        .await
        .map_err(|e| internal_err(e.to_string()))?;

    to_text_result(&aggregate, false)
}
