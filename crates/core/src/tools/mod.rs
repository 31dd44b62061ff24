//! The closed set of heuristic tools.
//!
//! Each tool is a function `analyze(&Document, &Value, &AnalysisContext) ->
//! Result<Analysis, ToolError>`; [`ToolName::analyze`] times it and wraps the
//! outcome in a [`ToolResult`].

pub mod blank;
pub mod boundary;
pub mod cra;
pub mod fiscal_year;
pub mod id_card;
pub mod quality;
pub mod tax_form;

mod rules;

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::AnalysisContext;
use crate::document::{Document, Page};
use crate::error::{ToolError, UnknownTool};
use crate::result::ToolResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    DetectBlankPages,
    DetectIdCardSides,
    DetectCraDocumentType,
    DetectTaxFormType,
    DetectDocumentBoundaries,
    ExtractFiscalYear,
    AssessImageQuality,
}

impl ToolName {
    pub const ALL: [ToolName; 7] = [
        ToolName::DetectBlankPages,
        ToolName::DetectIdCardSides,
        ToolName::DetectCraDocumentType,
        ToolName::DetectTaxFormType,
        ToolName::DetectDocumentBoundaries,
        ToolName::ExtractFiscalYear,
        ToolName::AssessImageQuality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::DetectBlankPages => "detect_blank_pages",
            ToolName::DetectIdCardSides => "detect_id_card_sides",
            ToolName::DetectCraDocumentType => "detect_cra_document_type",
            ToolName::DetectTaxFormType => "detect_tax_form_type",
            ToolName::DetectDocumentBoundaries => "detect_document_boundaries",
            ToolName::ExtractFiscalYear => "extract_fiscal_year",
            ToolName::AssessImageQuality => "assess_image_quality",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolName::DetectBlankPages => {
                "Find blank pages from pixel variance and OCR text density."
            }
            ToolName::DetectIdCardSides => {
                "Detect ID-card pages by aspect ratio and label each as recto or verso."
            }
            ToolName::DetectCraDocumentType => {
                "Classify Canada Revenue Agency documents (notice of assessment, benefits, statements)."
            }
            ToolName::DetectTaxFormType => {
                "Identify tax slips (T4, T4A, T5, RL-1, ...) and their tax year."
            }
            ToolName::DetectDocumentBoundaries => {
                "Split a merged PDF into sub-documents from layout changes, page numbering and blank separators."
            }
            ToolName::ExtractFiscalYear => {
                "Extract the most frequent plausible fiscal year and the per-page years."
            }
            ToolName::AssessImageQuality => {
                "Score scan quality (DPI, blur, brightness, contrast, skew) and flag pages needing preprocessing."
            }
        }
    }

    /// Run the tool and wrap its outcome. Never fails.
    pub fn analyze(self, document: &Document, args: &Value, ctx: &AnalysisContext) -> ToolResult {
        let started = Instant::now();
        let outcome = match self {
            ToolName::DetectBlankPages => blank::analyze(document, args, ctx),
            ToolName::DetectIdCardSides => id_card::analyze(document, args, ctx),
            ToolName::DetectCraDocumentType => cra::analyze(document, args, ctx),
            ToolName::DetectTaxFormType => tax_form::analyze(document, args, ctx),
            ToolName::DetectDocumentBoundaries => boundary::analyze(document, args, ctx),
            ToolName::ExtractFiscalYear => fiscal_year::analyze(document, args, ctx),
            ToolName::AssessImageQuality => quality::analyze(document, args, ctx),
        };

        if let Err(err) = &outcome {
            log::debug!("{self} failed on {}: {err}", document.source());
        }

        ToolResult::from_outcome(outcome, started.elapsed())
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = UnknownTool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| UnknownTool(s.to_string()))
    }
}

/// One requested tool plus its optional per-call arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    pub tool: ToolName,
    pub args: Value,
}

impl ToolRequest {
    pub fn new(tool: ToolName) -> Self {
        Self {
            tool,
            args: Value::Null,
        }
    }

    pub fn with_args(tool: ToolName, args: Value) -> Self {
        Self { tool, args }
    }

    /// Every tool with default arguments.
    pub fn all() -> Vec<ToolRequest> {
        ToolName::ALL.into_iter().map(ToolRequest::new).collect()
    }
}

/// Deserialize per-call arguments; `null` means "all defaults".
pub(crate) fn parse_args<T: DeserializeOwned + Default>(args: &Value) -> Result<T, ToolError> {
    if args.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(args.clone()).map_err(|e| ToolError::InvalidArgument(e.to_string()))
}

/// Reject NaN, infinities and non-positive overrides.
pub(crate) fn positive_arg(name: &str, value: Option<f64>, default: f64) -> Result<f64, ToolError> {
    match value {
        None => Ok(default),
        Some(v) if v.is_finite() && v > 0.0 => Ok(v),
        Some(v) => Err(ToolError::InvalidArgument(format!(
            "{name} must be a positive number, got {v}"
        ))),
    }
}

/// Resolve an optional list of 1-based page numbers; `None` selects every page.
pub(crate) fn select_pages<'a>(
    document: &'a Document,
    pages: Option<&[usize]>,
) -> Result<Vec<&'a Page>, ToolError> {
    match pages {
        None => Ok(document.pages().iter().collect()),
        Some(numbers) => numbers
            .iter()
            .map(|&n| {
                document.page(n).ok_or_else(|| {
                    ToolError::InvalidArgument(format!(
                        "page {n} is out of range (document has {} pages)",
                        document.page_count()
                    ))
                })
            })
            .collect(),
    }
}

/// Average of a slice, 0 when empty.
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
