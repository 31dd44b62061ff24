//! The envelope every tool returns, and the aggregate the dispatcher builds.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ToolError;
use crate::tools::ToolName;

/// Serialized shape: `{success, data, hints, confidence, error, execution_time_ms}`.
///
/// Either `success` is true and `data` carries the payload, or `success` is
/// false and `error` carries the message. `confidence` is 0 on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub data: Map<String, Value>,
    pub hints: Option<Map<String, Value>>,
    pub confidence: f64,
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl ToolResult {
    pub fn from_outcome(outcome: Result<Analysis, ToolError>, elapsed: Duration) -> Self {
        let execution_time_ms = elapsed.as_millis() as u64;
        match outcome {
            Ok(analysis) => ToolResult {
                success: true,
                data: analysis.data,
                hints: analysis.hints,
                confidence: clamp_confidence(analysis.confidence),
                error: None,
                execution_time_ms,
            },
            Err(err) => ToolResult::failure(err.to_string(), execution_time_ms),
        }
    }

    pub fn failure(message: impl Into<String>, execution_time_ms: u64) -> Self {
        ToolResult {
            success: false,
            data: Map::new(),
            hints: None,
            confidence: 0.0,
            error: Some(message.into()),
            execution_time_ms,
        }
    }
}

/// Successful tool output before it is wrapped with timing information.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub data: Map<String, Value>,
    pub hints: Option<Map<String, Value>>,
    pub confidence: f64,
}

impl Analysis {
    /// Build an analysis from typed payloads. Both must serialize to JSON objects.
    pub fn new(
        data: &impl Serialize,
        hints: &impl Serialize,
        confidence: f64,
    ) -> Result<Self, ToolError> {
        Ok(Analysis {
            data: to_object(data)?,
            hints: Some(to_object(hints)?),
            confidence,
        })
    }
}

fn to_object(value: &impl Serialize) -> Result<Map<String, Value>, ToolError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ToolError::Analysis(format!(
            "payload must be an object, got {other}"
        ))),
        Err(e) => Err(ToolError::Analysis(format!("serialization error: {e}"))),
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Tool name to result, serialized as a JSON object keyed by tool name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HintsAggregate {
    results: BTreeMap<ToolName, ToolResult>,
}

impl HintsAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tool: ToolName, result: ToolResult) {
        self.results.insert(tool, result);
    }

    pub fn get(&self, tool: ToolName) -> Option<&ToolResult> {
        self.results.get(&tool)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ToolName, &ToolResult)> {
        self.results.iter()
    }

    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }
}

impl FromIterator<(ToolName, ToolResult)> for HintsAggregate {
    fn from_iter<I: IntoIterator<Item = (ToolName, ToolResult)>>(iter: I) -> Self {
        HintsAggregate {
            results: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ============================================================================
    // ToolResult envelope
    // ============================================================================

    #[test]
    fn test_success_envelope_has_no_error() {
        let analysis = Analysis::new(&json!({"pages": [1]}), &json!({"message": "ok"}), 0.8)
            .expect("analysis");
        let result = ToolResult::from_outcome(Ok(analysis), Duration::from_millis(12));

        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.data["pages"], json!([1]));
        assert_eq!(result.execution_time_ms, 12);
        assert_eq!(result.confidence, 0.8);
    }

    #[test]
    fn test_failure_envelope_has_empty_data_and_zero_confidence() {
        let result = ToolResult::from_outcome(
            Err(ToolError::InvalidArgument("dpi must be positive".into())),
            Duration::from_millis(3),
        );

        assert!(!result.success);
        assert!(result.data.is_empty());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(
            result.error.as_deref(),
            Some("Invalid argument: dpi must be positive")
        );
    }

    #[test]
    fn test_confidence_is_clamped() {
        let high = Analysis::new(&json!({}), &json!({}), 1.7).expect("analysis");
        let nan = Analysis::new(&json!({}), &json!({}), f64::NAN).expect("analysis");

        assert_eq!(
            ToolResult::from_outcome(Ok(high), Duration::ZERO).confidence,
            1.0
        );
        assert_eq!(
            ToolResult::from_outcome(Ok(nan), Duration::ZERO).confidence,
            0.0
        );
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        let err = Analysis::new(&json!([1, 2]), &json!({}), 0.5).unwrap_err();
        assert!(matches!(err, ToolError::Analysis(_)));
    }

    #[test]
    fn test_serialized_shape() {
        let result = ToolResult::failure("boom", 5);
        let value = serde_json::to_value(&result).unwrap();
        let keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();

        for key in [
            "success",
            "data",
            "hints",
            "confidence",
            "error",
            "execution_time_ms",
        ] {
            assert!(keys.contains(&key), "missing {key}");
        }
    }

    // ============================================================================
    // HintsAggregate
    // ============================================================================

    #[test]
    fn test_aggregate_serializes_by_tool_name() {
        let mut aggregate = HintsAggregate::new();
        aggregate.insert(ToolName::ExtractFiscalYear, ToolResult::failure("x", 1));
        aggregate.insert(ToolName::DetectBlankPages, ToolResult::failure("y", 1));

        let value = serde_json::to_value(&aggregate).unwrap();
        assert!(value.get("extract_fiscal_year").is_some());
        assert!(value.get("detect_blank_pages").is_some());
        assert_eq!(aggregate.failed(), 2);
        assert_eq!(aggregate.succeeded(), 0);
    }
}
