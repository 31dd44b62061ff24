mod normalize;
mod triage;
mod utility;

use crate::session::Session;
use doctriage_core::ToolName;
use serde::{Deserialize, Serialize};

// Re-export types needed by tool handlers
pub use super::{JsonRpcError, Tool};

// MCP Protocol types for tools
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ServerCapabilities {
    pub tools: Option<ToolsCapability>,
}

#[derive(Debug, Serialize)]
pub struct ToolsCapability {}

#[derive(Debug, Serialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

#[derive(Debug, Serialize)]
pub struct ToolsList {
    pub tools: Vec<Tool>,
}

#[derive(Debug, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    pub arguments: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum Content {
    #[serde(rename = "text")]
    Text { text: String },
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

fn invalid_params(message: String) -> JsonRpcError {
    JsonRpcError {
        code: INVALID_PARAMS,
        message,
        data: None,
    }
}

fn internal_err(message: String) -> JsonRpcError {
    JsonRpcError {
        code: INTERNAL_ERROR,
        message,
        data: None,
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(
    arguments: Option<serde_json::Value>,
) -> Result<T, JsonRpcError> {
    serde_json::from_value(arguments.unwrap_or(serde_json::Value::Null))
        .map_err(|e| invalid_params(format!("Invalid arguments: {e}")))
}

/// Pretty JSON wrapped in a text content block; `is_error` flags a tool-level failure.
fn to_text_result(
    value: &impl serde::Serialize,
    is_error: bool,
) -> Result<serde_json::Value, JsonRpcError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| internal_err(format!("Serialization error: {e}")))?;

    serde_json::to_value(CallToolResult {
        content: vec![Content::Text { text: json }],
        is_error: is_error.then_some(true),
    })
    .map_err(|e| internal_err(format!("Internal error: {e}")))
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn handle_initialize() -> Result<serde_json::Value, JsonRpcError> {
    let result = InitializeResult {
        protocol_version: "2024-11-05".to_string(),
        capabilities: ServerCapabilities {
            tools: Some(ToolsCapability {}),
        },
        server_info: ServerInfo {
            name: "doctriage".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    };

    serde_json::to_value(result).map_err(|e| internal_err(format!("Internal error: {e}")))
}

pub fn handle_tools_list() -> Result<serde_json::Value, JsonRpcError> {
    let mut tools = triage::tools();
    tools.extend(utility::tools());
    tools.extend(normalize::tools());

    serde_json::to_value(ToolsList { tools })
        .map_err(|e| internal_err(format!("Internal error: {e}")))
}

pub async fn handle_tools_call(
    params: Option<serde_json::Value>,
    session: &Session,
) -> Result<serde_json::Value, JsonRpcError> {
    let params: CallToolParams = serde_json::from_value(params.unwrap_or(serde_json::Value::Null))
        .map_err(|e| invalid_params(format!("Invalid params: {e}")))?;

    match params.name.as_str() {
        "analyze_document" => triage::handle_analyze_document(params.arguments, session).await,
        "count_pages" => utility::handle_count_pages(params.arguments, session).await,
        "extract_text_by_page" => utility::handle_extract_text(params.arguments, session).await,
        "search_text" => utility::handle_search_text(params.arguments, session).await,
        "validate_sin" => utility::handle_validate_sin(params.arguments),
        "validate_postal_code" => utility::handle_validate_postal_code(params.arguments),
        "validate_email" => utility::handle_validate_email(params.arguments),
        "validate_phone" => utility::handle_validate_phone(params.arguments),
        "validate_date_range" => utility::handle_validate_date_range(params.arguments),
        "parse_date" => normalize::handle_parse_date(params.arguments),
        "parse_currency" => normalize::handle_parse_currency(params.arguments),
        "normalize_name" => normalize::handle_normalize_name(params.arguments),
        "split_full_name" => normalize::handle_split_full_name(params.arguments),
        "normalize_address" => normalize::handle_normalize_address(params.arguments),
        "calculate_address_similarity" => normalize::handle_address_similarity(params.arguments),
        name => match name.parse::<ToolName>() {
            Ok(tool) => triage::handle_tool(tool, params.arguments, session).await,
            Err(_) => Err(invalid_params(format!("Unknown tool: {name}"))),
        },
    }
}
