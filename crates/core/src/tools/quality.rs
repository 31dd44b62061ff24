//! Scan quality assessment.
//!
//! Works on pixels only, so it gives the same answer with or without OCR.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{AnalysisContext, QualityConfig};
use crate::document::{Document, Page};
use crate::error::ToolError;
use crate::raster;
use crate::result::Analysis;

use super::{mean, parse_args, positive_arg, round2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Unusable,
    Poor,
    Acceptable,
    Good,
    Excellent,
}

impl QualityLevel {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 0.85 => QualityLevel::Excellent,
            s if s >= 0.70 => QualityLevel::Good,
            s if s >= 0.50 => QualityLevel::Acceptable,
            s if s >= 0.30 => QualityLevel::Poor,
            _ => QualityLevel::Unusable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::Unusable => "unusable",
            QualityLevel::Poor => "poor",
            QualityLevel::Acceptable => "acceptable",
            QualityLevel::Good => "good",
            QualityLevel::Excellent => "excellent",
        }
    }
}

/// Per-metric scores in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubScores {
    pub dpi: f64,
    pub blur: f64,
    pub brightness: f64,
    pub contrast: f64,
    pub skew: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageQuality {
    pub page: usize,
    pub dpi: u32,
    pub blur_score: f64,
    pub brightness: f64,
    pub contrast: f64,
    /// `None` when the page has too little ink to measure.
    pub skew_angle: Option<f64>,
    pub sub_scores: SubScores,
    pub quality_score: f64,
    pub quality_level: QualityLevel,
    pub needs_preprocessing: bool,
    pub recommendations: Vec<String>,
}

/// 1 inside the comfortable range, falling linearly to 0 at black and white.
fn brightness_score(brightness: f64, config: &QualityConfig) -> f64 {
    if brightness < config.min_brightness {
        (brightness / config.min_brightness).max(0.0)
    } else if brightness > config.max_brightness {
        ((255.0 - brightness) / (255.0 - config.max_brightness)).max(0.0)
    } else {
        1.0
    }
}

pub fn assess_page(page: &Page, config: &QualityConfig) -> PageQuality {
    let gray = page.gray();

    let (w_in, h_in) = page.size_in_or(config.assumed_page_long_side_in);
    let long_in = w_in.max(h_in);
    let long_px = page.width().max(page.height()) as f64;
    let dpi = if long_in > 0.0 {
        (long_px / long_in).round() as u32
    } else {
        0
    };

    let blur = raster::laplacian_variance(gray);
    let (brightness, variance) = raster::mean_and_variance(gray);
    let contrast = variance.sqrt();
    let skew = raster::estimate_skew(gray, config.max_skew_search_deg, config.skew_step_deg);
    let skew_abs = skew.unwrap_or(0.0).abs();

    let sub_scores = SubScores {
        dpi: (dpi as f64 / config.good_dpi).min(1.0),
        blur: (blur / config.good_sharpness).min(1.0),
        brightness: brightness_score(brightness, config),
        contrast: (contrast / config.good_contrast).min(1.0),
        skew: (1.0 - skew_abs / (3.0 * config.max_skew_deg)).clamp(0.0, 1.0),
    };

    let weights = &config.weights;
    let total = weights.total();
    let quality_score = if total > 0.0 {
        (sub_scores.dpi * weights.dpi
            + sub_scores.blur * weights.blur
            + sub_scores.brightness * weights.brightness
            + sub_scores.contrast * weights.contrast
            + sub_scores.skew * weights.skew)
            / total
    } else {
        0.0
    };

    let mut recommendations = Vec::new();
    if (dpi as f64) < config.min_dpi {
        recommendations.push(format!("increase_dpi_from_{dpi}_to_{}", config.min_dpi));
    }
    if blur < config.min_sharpness {
        recommendations.push("image_too_blurry".to_string());
    }
    if brightness < config.min_brightness {
        recommendations.push("too_dark".to_string());
    } else if brightness > config.max_brightness {
        recommendations.push("too_bright".to_string());
    }
    if contrast < config.min_contrast {
        recommendations.push("low_contrast".to_string());
    }
    if skew_abs > config.max_skew_deg {
        recommendations.push(format!("deskew_{skew_abs:.1}_degrees"));
    }

    PageQuality {
        page: page.number(),
        dpi,
        blur_score: round2(blur),
        brightness: round2(brightness),
        contrast: round2(contrast),
        skew_angle: skew.map(round2),
        sub_scores: SubScores {
            dpi: round2(sub_scores.dpi),
            blur: round2(sub_scores.blur),
            brightness: round2(sub_scores.brightness),
            contrast: round2(sub_scores.contrast),
            skew: round2(sub_scores.skew),
        },
        quality_score: round2(quality_score),
        quality_level: QualityLevel::from_score(quality_score),
        needs_preprocessing: !recommendations.is_empty(),
        recommendations,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Args {
    assumed_page_long_side_in: Option<f64>,
}

#[derive(Debug, Serialize)]
struct Output {
    pages: Vec<PageQuality>,
    overall_quality: QualityLevel,
    average_quality_score: f64,
    needs_preprocessing: bool,
    recommendations: BTreeSet<String>,
    total_pages: usize,
}

#[derive(Debug, Serialize)]
struct Hints {
    overall_quality: QualityLevel,
    needs_preprocessing: bool,
    pages_needing_preprocessing: Vec<usize>,
    recommendations: BTreeSet<String>,
    message: String,
}

pub fn analyze(document: &Document, args: &Value, ctx: &AnalysisContext) -> Result<Analysis, ToolError> {
    let args: Args = parse_args(args)?;
    let mut config = ctx.config.quality.clone();
    config.assumed_page_long_side_in = positive_arg(
        "assumed_page_long_side_in",
        args.assumed_page_long_side_in,
        config.assumed_page_long_side_in,
    )?;

    let pages: Vec<PageQuality> = document
        .pages()
        .iter()
        .map(|page| assess_page(page, &config))
        .collect();

    let average = mean(&pages.iter().map(|p| p.quality_score).collect::<Vec<_>>());
    let overall_quality = QualityLevel::from_score(average);
    let flagged: Vec<usize> = pages
        .iter()
        .filter(|p| p.needs_preprocessing)
        .map(|p| p.page)
        .collect();
    let recommendations: BTreeSet<String> = pages
        .iter()
        .flat_map(|p| p.recommendations.iter().cloned())
        .collect();

    let message = if flagged.is_empty() {
        format!(
            "Overall quality: {}. No preprocessing needed.",
            overall_quality.as_str()
        )
    } else {
        format!(
            "Overall quality: {}. Preprocessing recommended: {}",
            overall_quality.as_str(),
            recommendations.iter().cloned().collect::<Vec<_>>().join(", ")
        )
    };

    let hints = Hints {
        overall_quality,
        needs_preprocessing: !flagged.is_empty(),
        pages_needing_preprocessing: flagged.clone(),
        recommendations: recommendations.clone(),
        message,
    };

    let output = Output {
        overall_quality,
        average_quality_score: round2(average),
        needs_preprocessing: !flagged.is_empty(),
        recommendations,
        total_pages: pages.len(),
        pages,
    };

    Analysis::new(&output, &hints, config.confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::testing::*;
    use crate::tools::ToolName;
    use image::{DynamicImage, GrayImage, Luma};
    use imageproc::filter::gaussian_blur_f32;
    use serde_json::json;

    fn config() -> QualityConfig {
        QualityConfig::default()
    }

    /// Striped page sized so it scans at about 170 DPI.
    fn sharp_page() -> Page {
        Page::new(DynamicImage::ImageLuma8(striped_gray(PAGE_W, PAGE_H, 6))).with_physical_size(1.0, 1.3)
    }

    fn blurred_page() -> Page {
        let blurred = gaussian_blur_f32(&striped_gray(PAGE_W, PAGE_H, 6), 4.0);
        Page::new(DynamicImage::ImageLuma8(blurred)).with_physical_size(1.0, 1.3)
    }

    #[test]
    fn test_sharp_page_needs_nothing() {
        let quality = assess_page(&sharp_page(), &config());

        assert_eq!(quality.dpi, 169);
        assert_eq!(quality.skew_angle, Some(0.0));
        assert!(!quality.needs_preprocessing, "{:?}", quality.recommendations);
        assert!(quality.quality_level >= QualityLevel::Good);
    }

    #[test]
    fn test_blur_lowers_score_and_flags_page() {
        let sharp = assess_page(&sharp_page(), &config());
        let blurred = assess_page(&blurred_page(), &config());

        assert!(blurred.sub_scores.blur < sharp.sub_scores.blur);
        assert!(blurred.blur_score < config().min_sharpness);
        assert!(blurred.needs_preprocessing);
        assert!(blurred.recommendations.contains(&"image_too_blurry".to_string()));
    }

    #[test]
    fn test_blank_low_resolution_page() {
        let quality = assess_page(&blank_page(), &config());

        assert_eq!(quality.dpi, 20);
        assert_eq!(quality.skew_angle, None);
        assert_eq!(
            quality.recommendations,
            vec![
                "increase_dpi_from_20_to_150",
                "image_too_blurry",
                "too_bright",
                "low_contrast",
            ]
        );
    }

    #[test]
    fn test_skewed_lines_get_deskew_recommendation() {
        let tan = 4.0f64.to_radians().tan();
        let skewed = GrayImage::from_fn(400, 520, |x, y| {
            let offset = (y as f64 - x as f64 * tan).rem_euclid(12.0);
            if offset >= 6.0 {
                Luma([20])
            } else {
                Luma([245])
            }
        });
        let page = Page::new(DynamicImage::ImageLuma8(skewed)).with_physical_size(2.0, 2.6);
        let quality = assess_page(&page, &config());

        let angle = quality.skew_angle.unwrap();
        assert!((angle.abs() - 4.0).abs() <= 0.5, "angle {angle}");
        assert!(quality.needs_preprocessing);
        assert!(quality
            .recommendations
            .iter()
            .any(|r| r.starts_with("deskew_") && r.ends_with("_degrees")));
    }

    #[test]
    fn test_unvalidated_skew_search_does_not_panic() {
        let config = QualityConfig {
            max_skew_search_deg: 90.0,
            skew_step_deg: 30.0,
            ..QualityConfig::default()
        };
        let quality = assess_page(&sharp_page(), &config);
        assert_eq!(quality.skew_angle, Some(0.0));
    }

    #[test]
    fn test_brightness_score_edges() {
        let config = config();
        assert_eq!(brightness_score(0.0, &config), 0.0);
        assert_eq!(brightness_score(25.0, &config), 0.5);
        assert_eq!(brightness_score(128.0, &config), 1.0);
        assert_eq!(brightness_score(255.0, &config), 0.0);
    }

    #[test]
    fn test_levels() {
        assert_eq!(QualityLevel::from_score(0.9), QualityLevel::Excellent);
        assert_eq!(QualityLevel::from_score(0.7), QualityLevel::Good);
        assert_eq!(QualityLevel::from_score(0.5), QualityLevel::Acceptable);
        assert_eq!(QualityLevel::from_score(0.3), QualityLevel::Poor);
        assert_eq!(QualityLevel::from_score(0.1), QualityLevel::Unusable);
    }

    #[test]
    fn test_analyze_aggregates_recommendations() {
        let doc = document(vec![sharp_page(), blank_page()]);
        let ctx = AnalysisContext::new(Default::default(), 2024);
        let result = ToolName::AssessImageQuality.analyze(&doc, &Value::Null, &ctx);

        assert!(result.success);
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.data["needs_preprocessing"], json!(true));
        assert_eq!(
            result.hints.unwrap()["pages_needing_preprocessing"],
            json!([2])
        );
    }
}
