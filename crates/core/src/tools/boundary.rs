//! Document boundary detection for merged PDFs.
//!
//! One left-to-right pass compares each page with the one before it. A new
//! sub-document starts on a layout change, on a "page 1 of N" marker, or on
//! the first content page after a blank separator.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{AnalysisContext, BoundaryConfig};
use crate::document::Document;
use crate::error::ToolError;
use crate::raster;
use crate::result::Analysis;

use super::blank::{classify_page, join_pages, Thresholds};
use super::{mean, parse_args, positive_arg, round2};

const THUMB_COLS: u32 = 16;
const THUMB_ROWS: u32 = 2;

/// Layout fingerprint of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub quadrants: [f64; 4],
    pub bands: Vec<f64>,
}

impl Signature {
    pub fn of(gray: &image::GrayImage, band_fraction: f64) -> Self {
        let mut bands = raster::band_thumbnail(gray, true, band_fraction, THUMB_COLS, THUMB_ROWS);
        bands.extend(raster::band_thumbnail(
            gray,
            false,
            band_fraction,
            THUMB_COLS,
            THUMB_ROWS,
        ));
        Signature {
            quadrants: raster::edge_quadrants(gray),
            bands,
        }
    }

    /// Weighted distance in `[0, 1]`; 0 for identical layouts.
    pub fn distance(&self, other: &Signature, config: &BoundaryConfig) -> f64 {
        let quadrant_delta = self
            .quadrants
            .iter()
            .zip(&other.quadrants)
            .map(|(a, b)| (a - b).abs())
            .sum::<f64>()
            / 4.0;
        let similarity = 1.0 / (1.0 + raster::mse(&self.bands, &other.bands) / 1000.0);
        config.layout_weight * quadrant_delta + config.band_weight * (1.0 - similarity)
    }
}

fn numbering_reset() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bpage\s+0*1\s*(?:of|/|de|sur)\s*\d+\b").expect("valid numbering pattern")
    })
}

/// True when the text carries a "page 1 of N" style marker.
pub fn starts_numbering(text: &str) -> bool {
    numbering_reset().is_match(text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitReason {
    BlankSeparator,
    PageNumbering,
    LayoutChange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Split {
    /// First page of the new sub-document.
    pub page: usize,
    pub reasons: Vec<SplitReason>,
    pub confidence: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Args {
    signature_threshold: Option<f64>,
}

#[derive(Debug, Serialize)]
struct Output {
    split_indices: Vec<usize>,
    document_ranges: Vec<[usize; 2]>,
    reasons: Vec<Vec<SplitReason>>,
    confidences: Vec<f64>,
    blank_pages: Vec<usize>,
    page_distances: BTreeMap<usize, f64>,
    total_pages: usize,
}

#[derive(Debug, Serialize)]
struct Hints {
    document_count: usize,
    split_indices: Vec<usize>,
    message: String,
}

/// Split a sequence into 1-based inclusive ranges at the given start pages.
pub fn ranges(total_pages: usize, split_indices: &[usize]) -> Vec<[usize; 2]> {
    let mut ranges = Vec::with_capacity(split_indices.len() + 1);
    let mut start = 1;
    for &split in split_indices {
        ranges.push([start, split - 1]);
        start = split;
    }
    if total_pages >= start {
        ranges.push([start, total_pages]);
    }
    ranges
}

fn layout_confidence(distance: f64, threshold: f64) -> f64 {
    let headroom = (1.0 - threshold).max(f64::EPSILON);
    let excess = ((distance - threshold) / headroom).clamp(0.0, 1.0);
    0.60 + 0.35 * excess
}

pub fn analyze(document: &Document, args: &Value, ctx: &AnalysisContext) -> Result<Analysis, ToolError> {
    let args: Args = parse_args(args)?;
    let config = &ctx.config.boundary;
    let threshold = positive_arg(
        "signature_threshold",
        args.signature_threshold,
        config.signature_threshold,
    )?;

    let thresholds = Thresholds::from(&ctx.config.blank);
    let pages = document.pages();
    let blank: Vec<bool> = pages
        .iter()
        .map(|page| classify_page(document, page, &thresholds).blank)
        .collect();
    let signatures: Vec<Signature> = pages
        .iter()
        .map(|page| Signature::of(page.gray(), config.band_fraction))
        .collect();

    let mut splits: Vec<Split> = Vec::new();
    let mut page_distances = BTreeMap::new();
    let mut seen_content = false;

    for (i, page) in pages.iter().enumerate() {
        if blank[i] {
            continue;
        }
        if !seen_content {
            seen_content = true;
            continue;
        }

        let mut reasons = Vec::new();
        let mut confidence: f64 = 0.0;

        if blank[i - 1] {
            reasons.push(SplitReason::BlankSeparator);
            confidence = confidence.max(config.blank_separator_confidence);
        } else {
            let distance = signatures[i].distance(&signatures[i - 1], config);
            page_distances.insert(page.number(), round2(distance));
            if distance > threshold {
                reasons.push(SplitReason::LayoutChange);
                confidence = confidence.max(layout_confidence(distance, threshold));
            }
        }

        if starts_numbering(document.text(page)) {
            reasons.push(SplitReason::PageNumbering);
            confidence = confidence.max(config.numbering_confidence);
        }

        if !reasons.is_empty() {
            log::trace!("split before page {}: {reasons:?}", page.number());
            splits.push(Split {
                page: page.number(),
                reasons,
                confidence: round2(confidence),
            });
        }
    }

    let split_indices: Vec<usize> = splits.iter().map(|s| s.page).collect();
    let document_ranges = ranges(pages.len(), &split_indices);
    let blank_pages: Vec<usize> = pages
        .iter()
        .zip(&blank)
        .filter(|(_, is_blank)| **is_blank)
        .map(|(page, _)| page.number())
        .collect();

    let confidence = if !splits.is_empty() {
        mean(&splits.iter().map(|s| s.confidence).collect::<Vec<_>>())
    } else if pages.len() == 1 {
        1.0
    } else {
        // The closer the largest distance came to the threshold, the less sure.
        let closest = page_distances.values().copied().fold(0.0, f64::max);
        0.5 + 0.4 * (1.0 - closest / threshold).clamp(0.0, 1.0)
    };

    let message = if split_indices.is_empty() {
        format!("Single document ({} pages)", pages.len())
    } else {
        format!(
            "{} documents; new document starts at page {}",
            document_ranges.len(),
            join_pages(&split_indices)
        )
    };

    let hints = Hints {
        document_count: document_ranges.len(),
        split_indices: split_indices.clone(),
        message,
    };

    let output = Output {
        reasons: splits.iter().map(|s| s.reasons.clone()).collect(),
        confidences: splits.iter().map(|s| s.confidence).collect(),
        split_indices,
        document_ranges,
        blank_pages,
        page_distances,
        total_pages: pages.len(),
    };

    Analysis::new(&output, &hints, round2(confidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::testing::*;
    use crate::document::Page;
    use crate::tools::ToolName;
    use image::{DynamicImage, GrayImage, Luma};
    use serde_json::json;

    fn ctx() -> AnalysisContext {
        AnalysisContext::new(Default::default(), 2024)
    }

    fn run(doc: &Document) -> crate::result::ToolResult {
        ToolName::DetectDocumentBoundaries.analyze(doc, &Value::Null, &ctx())
    }

    /// Content page whose left half is dark: a very different layout.
    fn half_dark_page(text: &str) -> Page {
        let img = GrayImage::from_fn(PAGE_W, PAGE_H, |x, _| {
            if x < PAGE_W / 2 {
                Luma([20])
            } else {
                Luma([250])
            }
        });
        Page::new(DynamicImage::ImageLuma8(img))
            .with_physical_size(8.5, 11.0)
            .with_text_layer(text)
    }

    #[test]
    fn test_single_page_has_no_splits() {
        let doc = document(vec![text_page("one page")]);
        let result = run(&doc);

        assert!(result.success);
        assert_eq!(result.data["split_indices"], json!([]));
        assert_eq!(result.data["document_ranges"], json!([[1, 1]]));
    }

    #[test]
    fn test_identical_pages_stay_together() {
        let doc = document(vec![text_page("a"), text_page("b"), text_page("c")]);
        let result = run(&doc);

        assert_eq!(result.data["split_indices"], json!([]));
        assert_eq!(result.data["page_distances"], json!({"2": 0.0, "3": 0.0}));
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn test_blank_separator_splits_after_it() {
        let doc = document(vec![text_page("a"), blank_page(), text_page("b")]);
        let result = run(&doc);

        assert_eq!(result.data["split_indices"], json!([3]));
        assert_eq!(result.data["document_ranges"], json!([[1, 2], [3, 3]]));
        assert_eq!(result.data["reasons"], json!([["blank_separator"]]));
        assert_eq!(result.data["confidences"], json!([0.85]));
    }

    #[test]
    fn test_leading_blank_pages_do_not_split() {
        let doc = document(vec![blank_page(), blank_page(), text_page("a")]);
        assert_eq!(run(&doc).data["split_indices"], json!([]));
    }

    #[test]
    fn test_numbering_reset_splits() {
        let doc = document(vec![
            text_page("Page 1 of 2"),
            text_page("Page 2 of 2"),
            text_page("page 1/1"),
        ]);
        let result = run(&doc);

        assert_eq!(result.data["split_indices"], json!([3]));
        assert_eq!(result.data["reasons"], json!([["page_numbering"]]));
        assert_eq!(result.data["confidences"], json!([0.8]));
    }

    #[test]
    fn test_layout_change_splits() {
        let doc = document(vec![
            text_page("statement"),
            text_page("statement"),
            half_dark_page("letter"),
        ]);
        let result = run(&doc);

        assert_eq!(result.data["split_indices"], json!([3]));
        assert_eq!(result.data["reasons"], json!([["layout_change"]]));
        let confidence = result.data["confidences"][0].as_f64().unwrap();
        assert!((0.6..=0.95).contains(&confidence));
    }

    #[test]
    fn test_numbering_pattern() {
        assert!(starts_numbering("Page 1 de 3"));
        assert!(starts_numbering("PAGE 01 OF 12"));
        assert!(!starts_numbering("Page 11 of 12"));
        assert!(!starts_numbering("1 of 3 items"));
    }

    #[test]
    fn test_ranges() {
        assert_eq!(ranges(5, &[]), vec![[1, 5]]);
        assert_eq!(ranges(5, &[2, 5]), vec![[1, 1], [2, 4], [5, 5]]);
    }

    // -- patterns --

    #[test]
    fn test_static_patterns_compile() {
        assert!(numbering_reset().is_match("Page 1 of 4"));
        assert!(starts_numbering("page 01 / 3"));
        assert!(!starts_numbering("Page 2 of 4"));
    }
}
