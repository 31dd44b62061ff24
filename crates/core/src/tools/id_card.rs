//! ID card side detection.
//!
//! A page is a card candidate when its long/short side ratio is close to one
//! of the known card formats. Candidates are scored for front-side features
//! (photo or hologram texture) and back-side features (barcode, magnetic
//! stripe), then grouped into recto/verso pairs by page proximity.

use image::imageops;
use image::GrayImage;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::horizontal_sobel;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{AnalysisContext, IdCardConfig};
use crate::document::{Document, Page};
use crate::error::ToolError;
use crate::result::Analysis;

use super::{mean, parse_args, round2};

/// A verso may follow its recto with at most this many pages in between, plus one.
const MAX_PAIR_DISTANCE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Recto,
    Verso,
    Unknown,
}

/// Presence flag plus strength in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Feature {
    pub present: bool,
    pub strength: f64,
}

impl Feature {
    fn absent() -> Self {
        Feature {
            present: false,
            strength: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardFeatures {
    pub aspect_ratio: f64,
    pub rounded_corners: Feature,
    pub barcode: Feature,
    pub magnetic_stripe: Feature,
    pub hologram: Feature,
    pub recto_score: f64,
    pub verso_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardPage {
    pub page: usize,
    pub side: Side,
    pub card_type: String,
    pub confidence: f64,
    pub features: CardFeatures,
}

/// Long side over short side, so orientation does not matter.
pub fn aspect_ratio(width: u32, height: u32) -> f64 {
    let (long, short) = (width.max(height), width.min(height));
    if short == 0 {
        return 0.0;
    }
    long as f64 / short as f64
}

/// First card format whose ratio is within the relative tolerance.
pub fn match_format(ratio: f64, config: &IdCardConfig) -> Option<&str> {
    config
        .formats
        .iter()
        .find(|format| (ratio - format.ratio).abs() / format.ratio < config.ratio_tolerance)
        .map(|format| format.name.as_str())
}

/// A corner counts as rounded when its patch shows a few edges but is not
/// dominated by them. Featureless corners do not count.
pub fn rounded_corners(gray: &GrayImage) -> Feature {
    let size = (gray.width().min(gray.height()) as f64 * 0.1) as u32;
    if size < 3 {
        return Feature::absent();
    }
    let (w, h) = (gray.width(), gray.height());
    let origins = [(0, 0), (w - size, 0), (0, h - size), (w - size, h - size)];

    let rounded = origins
        .iter()
        .filter(|&&(x, y)| {
            let patch = imageops::crop_imm(gray, x, y, size, size).to_image();
            let edges = canny(&patch, 50.0, 150.0);
            let on = edges.pixels().filter(|p| p.0[0] > 0).count();
            let share = on as f64 / (size * size) as f64;
            share > 0.0 && share < 0.3
        })
        .count();

    Feature {
        present: rounded >= 3,
        strength: rounded as f64 / 4.0,
    }
}

/// Columns of strong horizontal gradient in the bottom third.
pub fn barcode(gray: &GrayImage) -> Feature {
    let (w, h) = (gray.width(), gray.height());
    let top = (h as f64 * 0.66) as u32;
    if w <= 10 || h - top < 3 {
        return Feature::absent();
    }
    let bottom = imageops::crop_imm(gray, 0, top, w, h - top).to_image();
    let gradient = horizontal_sobel(&bottom);

    let magnitudes: Vec<f64> = gradient.pixels().map(|p| (p.0[0] as f64).abs()).collect();
    let (avg, std) = mean_std(&magnitudes);
    let threshold = avg + std;

    let mut column_hits = vec![0u32; w as usize];
    for (x, _, p) in gradient.enumerate_pixels() {
        if (p.0[0] as f64).abs() > threshold {
            column_hits[x as usize] += 1;
        }
    }

    let min_hits = h as f64 * 0.1;
    let strong_columns = column_hits.iter().filter(|&&c| c as f64 > min_hits).count() as f64;
    Feature {
        present: strong_columns > w as f64 * 0.2,
        strength: (strong_columns / (w as f64 * 0.3)).min(1.0),
    }
}

/// Longest run of rows noticeably darker than the page average.
pub fn magnetic_stripe(gray: &GrayImage) -> Feature {
    let (w, h) = (gray.width(), gray.height());
    if w == 0 || h == 0 {
        return Feature::absent();
    }
    let row_means: Vec<f64> = (0..h)
        .map(|y| (0..w).map(|x| gray.get_pixel(x, y).0[0] as f64).sum::<f64>() / w as f64)
        .collect();
    let (avg, std) = mean_std(&row_means);
    let dark = avg - std;

    let mut longest = 0usize;
    let mut current = 0usize;
    for value in &row_means {
        if *value < dark {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }

    let expected = h as f64 * 0.075;
    let present = longest as f64 > expected * 0.5;
    Feature {
        present,
        strength: if present {
            (longest as f64 / expected).min(1.0)
        } else {
            0.0
        },
    }
}

/// Share of pixels far from a blurred copy of the card.
pub fn hologram(gray: &GrayImage) -> Feature {
    let kernel = (gray.width().min(gray.height()) as f64 * 0.1) as u32;
    if kernel < 3 {
        return Feature::absent();
    }
    let kernel = (kernel | 1) as f32;
    let sigma = 0.3 * ((kernel - 1.0) * 0.5 - 1.0) + 0.8;
    let blurred = gaussian_blur_f32(gray, sigma);

    let diffs: Vec<f64> = gray
        .pixels()
        .zip(blurred.pixels())
        .map(|(a, b)| (a.0[0] as f64 - b.0[0] as f64).abs())
        .collect();
    let (avg, std) = mean_std(&diffs);
    let threshold = avg + std;
    let share = diffs.iter().filter(|&&d| d > threshold).count() as f64 / diffs.len() as f64;

    Feature {
        present: share > 0.05 && share < 0.35,
        strength: (share / 0.2).min(1.0),
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    let avg = mean(values);
    let var = mean(&values.iter().map(|v| (v - avg) * (v - avg)).collect::<Vec<_>>());
    (avg, var.sqrt())
}

/// Score a card candidate and pick its side.
pub fn classify_card(page: usize, gray: &GrayImage, card_type: &str, config: &IdCardConfig) -> CardPage {
    let rounded = rounded_corners(gray);
    let barcode = barcode(gray);
    let stripe = magnetic_stripe(gray);
    let hologram = hologram(gray);

    let base = rounded.strength * config.corner_weight;
    let mut recto = base;
    let mut verso = base;
    if hologram.present {
        recto += hologram.strength * config.hologram_weight;
    }
    if barcode.present {
        verso += barcode.strength * config.barcode_weight;
    }
    if stripe.present {
        verso += stripe.strength * config.stripe_weight;
    }

    let (side, confidence) = if recto.max(verso) < config.min_side_score || recto == verso {
        (Side::Unknown, config.unknown_confidence)
    } else if recto > verso {
        (Side::Recto, recto.min(config.max_confidence))
    } else {
        (Side::Verso, verso.min(config.max_confidence))
    };

    CardPage {
        page,
        side,
        card_type: card_type.to_string(),
        confidence: round2(confidence),
        features: CardFeatures {
            aspect_ratio: round2(aspect_ratio(gray.width(), gray.height())),
            rounded_corners: rounded,
            barcode,
            magnetic_stripe: stripe,
            hologram,
            recto_score: round2(recto),
            verso_score: round2(verso),
        },
    }
}

/// Pair each recto with a verso that follows it closely; everything else
/// stands alone. A group never holds two rectos.
pub fn group_sides(cards: &[CardPage]) -> Vec<Vec<usize>> {
    let mut groups = Vec::new();
    let mut i = 0;
    while i < cards.len() {
        let card = &cards[i];
        if let Some(next) = cards.get(i + 1) {
            if card.side == Side::Recto
                && next.side == Side::Verso
                && next.page - card.page <= MAX_PAIR_DISTANCE
            {
                groups.push(vec![card.page, next.page]);
                i += 2;
                continue;
            }
        }
        groups.push(vec![card.page]);
        i += 1;
    }
    groups
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Args {
    ratio_tolerance: Option<f64>,
}

#[derive(Debug, Serialize)]
struct Output {
    id_cards: Vec<CardPage>,
    groupings: Vec<Vec<usize>>,
    total_pages: usize,
}

#[derive(Debug, Serialize)]
struct Hints {
    id_card_pages: Vec<usize>,
    groupings: Vec<Vec<usize>>,
    message: String,
}

pub fn analyze(document: &Document, args: &Value, ctx: &AnalysisContext) -> Result<Analysis, ToolError> {
    let args: Args = parse_args(args)?;
    let mut config = ctx.config.id_card.clone();
    if let Some(tolerance) = args.ratio_tolerance {
        if !(tolerance.is_finite() && tolerance > 0.0 && tolerance < 1.0) {
            return Err(ToolError::InvalidArgument(format!(
                "ratio_tolerance must be between 0 and 1, got {tolerance}"
            )));
        }
        config.ratio_tolerance = tolerance;
    }

    let cards: Vec<CardPage> = document
        .pages()
        .iter()
        .filter_map(|page| {
            let ratio = page_ratio(page, &config)?;
            let card_type = match_format(ratio, &config)?;
            Some(classify_card(page.number(), page.gray(), card_type, &config))
        })
        .collect();

    let groupings = group_sides(&cards);
    let confidence = if cards.is_empty() {
        config.absent_confidence
    } else {
        mean(&cards.iter().map(|c| c.confidence).collect::<Vec<_>>())
    };

    let message = if cards.is_empty() {
        "No ID cards detected".to_string()
    } else {
        let listed: Vec<String> = cards
            .iter()
            .map(|c| format!("page {} ({})", c.page, side_label(c.side)))
            .collect();
        format!(
            "ID cards detected: {}. Suggested groupings: {:?}",
            listed.join(", "),
            groupings
        )
    };

    let hints = Hints {
        id_card_pages: cards.iter().map(|c| c.page).collect(),
        groupings: groupings.clone(),
        message,
    };

    let output = Output {
        id_cards: cards,
        groupings,
        total_pages: document.page_count(),
    };

    Analysis::new(&output, &hints, round2(confidence))
}

/// Physical aspect ratio when the page size is known, raster ratio otherwise.
/// `None` for pages too large to be a card.
fn page_ratio(page: &Page, config: &IdCardConfig) -> Option<f64> {
    match page.physical_size_in() {
        Some((w, h)) if w.max(h) > config.max_card_long_side_in => None,
        Some((w, h)) if w > 0.0 && h > 0.0 => Some(w.max(h) / w.min(h)),
        _ => Some(aspect_ratio(page.width(), page.height())),
    }
}

fn side_label(side: Side) -> &'static str {
    match side {
        Side::Recto => "recto",
        Side::Verso => "verso",
        Side::Unknown => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::testing::*;
    use crate::tools::ToolName;
    use image::{DynamicImage, Luma};
    use serde_json::json;

    const CARD_W: u32 = 320;
    const CARD_H: u32 = 202;

    /// Front: a fine-textured photo block in the upper two thirds.
    fn recto_gray() -> GrayImage {
        GrayImage::from_fn(CARD_W, CARD_H, |x, y| {
            let in_photo = (20..120).contains(&x) && (20..130).contains(&y);
            if in_photo && (x + y) % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    /// Back: a dark magnetic stripe near the top and a barcode at the bottom.
    fn verso_gray() -> GrayImage {
        GrayImage::from_fn(CARD_W, CARD_H, |x, y| {
            let stripe = (20..40).contains(&y);
            let bar = (150..190).contains(&y) && (40..280).contains(&x) && x % 6 < 2;
            if stripe || bar {
                Luma([10])
            } else {
                Luma([255])
            }
        })
    }

    fn card(gray: GrayImage) -> Page {
        Page::new(DynamicImage::ImageLuma8(gray))
    }

    fn side(side: Side, page: usize) -> CardPage {
        CardPage {
            page,
            side,
            card_type: "credit_card".into(),
            confidence: 0.8,
            features: CardFeatures {
                aspect_ratio: 1.586,
                rounded_corners: Feature::absent(),
                barcode: Feature::absent(),
                magnetic_stripe: Feature::absent(),
                hologram: Feature::absent(),
                recto_score: 0.0,
                verso_score: 0.0,
            },
        }
    }

    // -- ratio --

    #[test]
    fn test_ratio_matching() {
        let config = IdCardConfig::default();
        assert_eq!(match_format(aspect_ratio(CARD_W, CARD_H), &config), Some("credit_card"));
        assert_eq!(match_format(aspect_ratio(CARD_H, CARD_W), &config), Some("credit_card"));
        assert_eq!(match_format(aspect_ratio(PAGE_W, PAGE_H), &config), None);
        assert_eq!(aspect_ratio(10, 0), 0.0);
    }

    // -- features --

    #[test]
    fn test_verso_features() {
        let gray = verso_gray();
        assert!(barcode(&gray).present);
        assert!(magnetic_stripe(&gray).present);

        let result = classify_card(1, &gray, "credit_card", &IdCardConfig::default());
        assert_eq!(result.side, Side::Verso);
        assert_eq!(result.confidence, 0.95);
    }

    #[test]
    fn test_recto_features() {
        let gray = recto_gray();
        assert!(hologram(&gray).present);
        assert!(!barcode(&gray).present);
        assert!(!magnetic_stripe(&gray).present);

        let result = classify_card(1, &gray, "credit_card", &IdCardConfig::default());
        assert_eq!(result.side, Side::Recto);
        assert!(result.confidence >= 0.3);
    }

    #[test]
    fn test_featureless_card_is_unknown() {
        let gray = GrayImage::from_pixel(CARD_W, CARD_H, Luma([255]));
        let result = classify_card(1, &gray, "credit_card", &IdCardConfig::default());
        assert_eq!(result.side, Side::Unknown);
        assert_eq!(result.confidence, 0.3);
    }

    // -- grouping --

    #[test]
    fn test_grouping_never_pairs_two_rectos() {
        let cards = vec![
            side(Side::Recto, 1),
            side(Side::Verso, 2),
            side(Side::Recto, 4),
            side(Side::Recto, 5),
            side(Side::Verso, 6),
            side(Side::Verso, 7),
        ];
        let groups = group_sides(&cards);
        assert_eq!(groups, vec![vec![1, 2], vec![4], vec![5, 6], vec![7]]);

        for group in &groups {
            let rectos = group
                .iter()
                .filter(|p| cards.iter().any(|c| c.page == **p && c.side == Side::Recto))
                .count();
            assert!(rectos <= 1);
        }
    }

    #[test]
    fn test_grouping_allows_one_page_gap() {
        assert_eq!(
            group_sides(&[side(Side::Recto, 1), side(Side::Verso, 3)]),
            vec![vec![1, 3]]
        );
        assert_eq!(
            group_sides(&[side(Side::Recto, 1), side(Side::Verso, 4)]),
            vec![vec![1], vec![4]]
        );
    }

    // -- analyze --

    #[test]
    fn test_letter_pages_are_not_cards() {
        let doc = document(vec![text_page("letter"), blank_page()]);
        let ctx = AnalysisContext::new(Default::default(), 2024);
        let result = ToolName::DetectIdCardSides.analyze(&doc, &Value::Null, &ctx);

        assert!(result.success);
        assert_eq!(result.data["id_cards"], json!([]));
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn test_recto_then_verso_pair() {
        let doc = document(vec![card(recto_gray()), text_page("cover"), card(verso_gray())]);
        let ctx = AnalysisContext::new(Default::default(), 2024);
        let result = ToolName::DetectIdCardSides.analyze(&doc, &Value::Null, &ctx);

        assert!(result.success);
        assert_eq!(result.data["groupings"], json!([[1, 3]]));
        assert_eq!(result.data["id_cards"][0]["side"], json!("recto"));
        assert_eq!(result.data["id_cards"][1]["side"], json!("verso"));
    }

    #[test]
    fn test_card_shaped_raster_on_letter_page_is_not_a_card() {
        let logo_page = card(recto_gray()).with_physical_size(8.5, 11.0);
        let doc = document(vec![logo_page]);
        let ctx = AnalysisContext::new(Default::default(), 2024);
        let result = ToolName::DetectIdCardSides.analyze(&doc, &Value::Null, &ctx);

        assert!(result.success);
        assert_eq!(result.data["id_cards"], json!([]));
    }

    #[test]
    fn test_physical_card_size_wins_over_raster_ratio() {
        let config = IdCardConfig::default();
        let scanned_card = card(verso_gray()).with_physical_size(3.375, 2.125);
        assert_eq!(
            page_ratio(&scanned_card, &config).and_then(|r| match_format(r, &config)),
            Some("credit_card")
        );

        let square = Page::new(DynamicImage::ImageLuma8(GrayImage::new(100, 100)))
            .with_physical_size(3.375, 2.125);
        assert_eq!(
            page_ratio(&square, &config).and_then(|r| match_format(r, &config)),
            Some("credit_card")
        );

        let unsized_card = card(verso_gray());
        assert_eq!(
            page_ratio(&unsized_card, &config),
            Some(aspect_ratio(CARD_W, CARD_H))
        );
    }

    #[test]
    fn test_bad_tolerance_is_rejected() {
        let doc = document(vec![blank_page()]);
        let ctx = AnalysisContext::new(Default::default(), 2024);
        let result = ToolName::DetectIdCardSides.analyze(&doc, &json!({"ratio_tolerance": 2.0}), &ctx);
        assert!(!result.success);
    }
}
