//! Blank page detection.
//!
//! A page is blank when its gray-level variance and its OCR text density are
//! both under their thresholds. Confidence is the share of pages whose
//! verdict is clear of the separation band around those thresholds.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{AnalysisContext, BlankConfig};
use crate::document::{Document, Page, LETTER_LONG_SIDE_IN};
use crate::error::ToolError;
use crate::raster;
use crate::result::Analysis;

use super::{parse_args, positive_arg, round2};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Args {
    variance_threshold: Option<f64>,
    density_threshold: Option<f64>,
    separation_band: Option<f64>,
}

/// Effective thresholds for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub variance: f64,
    pub density: f64,
    pub separation_band: f64,
    pub ink_level: u8,
}

impl From<&BlankConfig> for Thresholds {
    fn from(config: &BlankConfig) -> Self {
        Thresholds {
            variance: config.variance_threshold,
            density: config.density_threshold,
            separation_band: config.separation_band,
            ink_level: config.ink_level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageVerdict {
    pub page: usize,
    pub variance: f64,
    /// Non-whitespace characters per square inch.
    pub text_density: f64,
    pub ink_ratio: f64,
    pub blank: bool,
    pub margin: f64,
    pub borderline: bool,
}

#[derive(Debug, Serialize)]
struct Output {
    blank_pages: Vec<usize>,
    total_pages: usize,
    variance_threshold: f64,
    density_threshold: f64,
    pages: Vec<PageVerdict>,
}

#[derive(Debug, Serialize)]
struct Hints {
    blank_pages: Vec<usize>,
    blank_count: usize,
    total_pages: usize,
    message: String,
}

pub fn analyze(document: &Document, args: &Value, ctx: &AnalysisContext) -> Result<Analysis, ToolError> {
    let args: Args = parse_args(args)?;
    let config = &ctx.config.blank;

    let thresholds = Thresholds {
        variance: positive_arg("variance_threshold", args.variance_threshold, config.variance_threshold)?,
        density: positive_arg("density_threshold", args.density_threshold, config.density_threshold)?,
        separation_band: match args.separation_band {
            Some(band) if !(band.is_finite() && band >= 0.0) => {
                return Err(ToolError::InvalidArgument(format!(
                    "separation_band must not be negative, got {band}"
                )))
            }
            Some(band) => band,
            None => config.separation_band,
        },
        ink_level: config.ink_level,
    };

    if document.page_count() == 0 {
        return Err(ToolError::Analysis("document has no pages".into()));
    }

    let pages: Vec<PageVerdict> = document
        .pages()
        .iter()
        .map(|page| classify_page(document, page, &thresholds))
        .collect();

    let blank_pages: Vec<usize> = pages.iter().filter(|v| v.blank).map(|v| v.page).collect();
    let decisive = pages.iter().filter(|v| !v.borderline).count();
    let confidence = decisive as f64 / pages.len() as f64;

    let message = if blank_pages.is_empty() {
        format!("No blank pages among {} pages", pages.len())
    } else {
        format!(
            "{} of {} pages are blank ({}); they can be skipped",
            blank_pages.len(),
            pages.len(),
            join_pages(&blank_pages)
        )
    };

    let hints = Hints {
        blank_pages: blank_pages.clone(),
        blank_count: blank_pages.len(),
        total_pages: pages.len(),
        message,
    };

    let output = Output {
        blank_pages,
        total_pages: pages.len(),
        variance_threshold: thresholds.variance,
        density_threshold: thresholds.density,
        pages,
    };

    Analysis::new(&output, &hints, confidence)
}

/// Score one page against the thresholds.
pub fn classify_page(document: &Document, page: &Page, thresholds: &Thresholds) -> PageVerdict {
    let (_, variance) = raster::mean_and_variance(page.gray());
    let text_density = text_density(document, page);

    let variance_delta = (variance - thresholds.variance) / thresholds.variance;
    let density_delta = (text_density - thresholds.density) / thresholds.density;

    let blank = variance < thresholds.variance && text_density < thresholds.density;
    // A blank verdict is only as clear as its weakest metric; a non-blank one
    // as clear as its strongest.
    let margin = if blank {
        (-variance_delta).min(-density_delta)
    } else {
        variance_delta.max(density_delta)
    };

    PageVerdict {
        page: page.number(),
        variance: round2(variance),
        text_density: round2(text_density),
        ink_ratio: round2(raster::ink_ratio(page.gray(), thresholds.ink_level)),
        blank,
        margin: round2(margin),
        borderline: margin <= thresholds.separation_band,
    }
}

fn text_density(document: &Document, page: &Page) -> f64 {
    let chars = document
        .text(page)
        .chars()
        .filter(|c| !c.is_whitespace())
        .count();
    let (w, h) = page.size_in_or(LETTER_LONG_SIDE_IN);
    let area = w * h;
    if area <= 0.0 {
        return 0.0;
    }
    chars as f64 / area
}

pub(crate) fn join_pages(pages: &[usize]) -> String {
    pages
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::testing::*;
    use crate::tools::ToolName;
    use image::{DynamicImage, GrayImage, Luma};
    use serde_json::json;

    fn ctx() -> AnalysisContext {
        AnalysisContext::new(Default::default(), 2024)
    }

    fn run(doc: &Document, args: Value) -> crate::result::ToolResult {
        ToolName::DetectBlankPages.analyze(doc, &args, &ctx())
    }

    #[test]
    fn test_no_blank_pages_returns_empty_list() {
        let doc = document(vec![
            text_page("Statement of Remuneration Paid"),
            text_page("Employment income"),
        ]);
        let result = run(&doc, Value::Null);

        assert!(result.success);
        assert_eq!(result.data["blank_pages"], json!([]));
        assert_eq!(result.data["total_pages"], json!(2));
    }

    #[test]
    fn test_blank_pages_are_listed_in_order() {
        let doc = document(vec![
            text_page("page one"),
            blank_page(),
            text_page("page three"),
            blank_page(),
        ]);
        let result = run(&doc, Value::Null);

        assert!(result.success);
        assert_eq!(result.data["blank_pages"], json!([2, 4]));
        assert_eq!(result.hints.unwrap()["blank_count"], json!(2));
    }

    #[test]
    fn test_detection_is_idempotent() {
        let doc = document(vec![blank_page(), text_page("some words"), blank_page()]);
        let first = run(&doc, Value::Null);
        let second = run(&doc, Value::Null);

        assert_eq!(first.data, second.data);
        assert_eq!(first.hints, second.hints);
        assert_eq!(first.confidence, second.confidence);
    }

    #[test]
    fn test_text_keeps_a_flat_page_from_being_blank() {
        let words = "lorem ipsum ".repeat(40);
        let doc = document(vec![blank_page().with_text_layer(words)]);
        let result = run(&doc, Value::Null);

        assert_eq!(result.data["blank_pages"], json!([]));
    }

    #[test]
    fn test_clear_verdicts_give_full_confidence() {
        let doc = document(vec![blank_page(), text_page("words")]);
        assert_eq!(run(&doc, Value::Null).confidence, 1.0);
    }

    #[test]
    fn test_borderline_page_lowers_confidence() {
        // Faint noise with variance just under the default threshold.
        let faint = GrayImage::from_fn(PAGE_W, PAGE_H, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([240])
            } else {
                Luma([221])
            }
        });
        let doc = document(vec![
            Page::new(DynamicImage::ImageLuma8(faint)).with_physical_size(8.5, 11.0),
            blank_page(),
        ]);
        let result = run(&doc, Value::Null);

        assert!(result.success);
        assert_eq!(result.data["blank_pages"], json!([1, 2]));
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_threshold_override_changes_verdict() {
        let doc = document(vec![text_page("x")]);
        let result = run(&doc, json!({"variance_threshold": 1.0e9, "density_threshold": 1.0e9}));

        assert_eq!(result.data["blank_pages"], json!([1]));
        assert_eq!(result.data["variance_threshold"], json!(1.0e9));
    }

    #[test]
    fn test_negative_threshold_is_rejected() {
        let doc = document(vec![blank_page()]);
        let result = run(&doc, json!({"density_threshold": -1.0}));

        assert!(!result.success);
        assert!(result.error.unwrap().contains("density_threshold"));
    }
}
