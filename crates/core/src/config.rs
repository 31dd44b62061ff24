//! Tunable thresholds and weights for every heuristic.
//!
//! Every section has complete defaults so an empty TOML document (or no file
//! at all) yields a working configuration. Values are validated once at
//! construction time and then passed explicitly through [`AnalysisContext`].

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Widest skew search accepted. Past 45 degrees rows and columns swap roles.
pub const MAX_SKEW_SEARCH_DEG: f64 = 45.0;

/// Longest accepted fiscal year lookback or lookahead.
pub const MAX_YEAR_SPAN: i32 = 200;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub loader: LoaderConfig,
    pub dispatcher: DispatcherConfig,
    pub blank: BlankConfig,
    pub id_card: IdCardConfig,
    pub cra: CraConfig,
    pub tax_form: TaxFormConfig,
    pub boundary: BoundaryConfig,
    pub fiscal_year: FiscalYearConfig,
    pub quality: QualityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Target rasterization resolution. Embedded scans are downscaled to it, never upscaled.
    pub dpi: u32,
    pub max_pages: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_pages: 500,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlankConfig {
    /// Gray-level variance below which a page looks empty.
    pub variance_threshold: f64,
    /// Non-whitespace characters per square inch below which a page has no text.
    pub density_threshold: f64,
    /// Relative distance from a threshold under which a verdict counts as borderline.
    pub separation_band: f64,
    /// Pixels darker than this count as ink.
    pub ink_level: u8,
}

impl Default for BlankConfig {
    fn default() -> Self {
        Self {
            variance_threshold: 100.0,
            density_threshold: 0.05,
            separation_band: 0.25,
            ink_level: 240,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardFormat {
    pub name: String,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdCardConfig {
    pub formats: Vec<CardFormat>,
    /// Relative tolerance on the long/short side ratio.
    pub ratio_tolerance: f64,
    pub hologram_weight: f64,
    pub barcode_weight: f64,
    pub stripe_weight: f64,
    pub corner_weight: f64,
    /// Below this best side score the side is `unknown`.
    pub min_side_score: f64,
    pub unknown_confidence: f64,
    pub max_confidence: f64,
    /// Reported when no page matches a card format.
    pub absent_confidence: f64,
    /// Pages with a longer physical side are never cards, whatever their raster.
    pub max_card_long_side_in: f64,
}

impl Default for IdCardConfig {
    fn default() -> Self {
        Self {
            formats: vec![
                CardFormat {
                    name: "credit_card".into(),
                    ratio: 1.586,
                },
                CardFormat {
                    name: "driving_license_qc".into(),
                    ratio: 1.58,
                },
                CardFormat {
                    name: "health_card_qc".into(),
                    ratio: 1.56,
                },
            ],
            ratio_tolerance: 0.15,
            hologram_weight: 0.6,
            barcode_weight: 0.7,
            stripe_weight: 0.5,
            corner_weight: 0.3,
            min_side_score: 0.3,
            unknown_confidence: 0.3,
            max_confidence: 0.95,
            absent_confidence: 0.9,
            max_card_long_side_in: 6.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CraConfig {
    pub title_confidence: f64,
    pub keyword_confidence: f64,
    pub issuer_bonus: f64,
    pub max_confidence: f64,
}

impl Default for CraConfig {
    fn default() -> Self {
        Self {
            title_confidence: 0.90,
            keyword_confidence: 0.55,
            issuer_bonus: 0.05,
            max_confidence: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxFormConfig {
    pub title_confidence: f64,
    pub code_confidence: f64,
    pub keyword_confidence: f64,
    pub year_bonus: f64,
    pub max_confidence: f64,
}

impl Default for TaxFormConfig {
    fn default() -> Self {
        Self {
            title_confidence: 0.90,
            code_confidence: 0.85,
            keyword_confidence: 0.50,
            year_bonus: 0.05,
            max_confidence: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    pub signature_threshold: f64,
    pub layout_weight: f64,
    pub band_weight: f64,
    /// Fraction of the page height used for the header and footer bands.
    pub band_fraction: f64,
    pub numbering_confidence: f64,
    pub blank_separator_confidence: f64,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            signature_threshold: 0.35,
            layout_weight: 0.5,
            band_weight: 0.5,
            band_fraction: 0.10,
            numbering_confidence: 0.80,
            blank_separator_confidence: 0.85,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiscalYearConfig {
    pub lookback_years: i32,
    pub lookahead_years: i32,
    pub labelled_bonus: f64,
    pub max_confidence: f64,
    pub absent_confidence: f64,
}

impl Default for FiscalYearConfig {
    fn default() -> Self {
        Self {
            lookback_years: 15,
            lookahead_years: 1,
            labelled_bonus: 0.10,
            max_confidence: 0.98,
            absent_confidence: 0.70,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub dpi: f64,
    pub blur: f64,
    pub brightness: f64,
    pub contrast: f64,
    pub skew: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            dpi: 0.25,
            blur: 0.30,
            brightness: 0.15,
            contrast: 0.15,
            skew: 0.15,
        }
    }
}

impl QualityWeights {
    pub fn total(&self) -> f64 {
        self.dpi + self.blur + self.brightness + self.contrast + self.skew
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_dpi: f64,
    pub good_dpi: f64,
    /// Laplacian variance below which a page is blurry.
    pub min_sharpness: f64,
    pub good_sharpness: f64,
    pub min_brightness: f64,
    pub max_brightness: f64,
    pub min_contrast: f64,
    pub good_contrast: f64,
    pub max_skew_deg: f64,
    /// Skew search spans `-max_skew_search_deg..=max_skew_search_deg`, at most 45.
    pub max_skew_search_deg: f64,
    pub skew_step_deg: f64,
    /// Used when the page carries no physical size.
    pub assumed_page_long_side_in: f64,
    pub confidence: f64,
    pub weights: QualityWeights,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_dpi: 150.0,
            good_dpi: 300.0,
            min_sharpness: 100.0,
            good_sharpness: 500.0,
            min_brightness: 50.0,
            max_brightness: 200.0,
            min_contrast: 30.0,
            good_contrast: 60.0,
            max_skew_deg: 3.0,
            max_skew_search_deg: 5.0,
            skew_step_deg: 0.5,
            assumed_page_long_side_in: 11.0,
            confidence: 0.9,
            weights: QualityWeights::default(),
        }
    }
}

impl TriageConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: TriageConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("loader.dpi", self.loader.dpi as f64)?;
        if self.loader.max_pages == 0 {
            return Err(invalid("loader.max_pages", "must be at least 1"));
        }

        positive("blank.variance_threshold", self.blank.variance_threshold)?;
        positive("blank.density_threshold", self.blank.density_threshold)?;
        non_negative("blank.separation_band", self.blank.separation_band)?;

        let card = &self.id_card;
        if !(card.ratio_tolerance.is_finite() && card.ratio_tolerance > 0.0 && card.ratio_tolerance < 1.0) {
            return Err(invalid("id_card.ratio_tolerance", "must be in (0, 1)"));
        }
        for format in &card.formats {
            positive(&format!("id_card.formats.{}", format.name), format.ratio)?;
        }
        for (name, weight) in [
            ("id_card.hologram_weight", card.hologram_weight),
            ("id_card.barcode_weight", card.barcode_weight),
            ("id_card.stripe_weight", card.stripe_weight),
            ("id_card.corner_weight", card.corner_weight),
            ("id_card.min_side_score", card.min_side_score),
        ] {
            non_negative(name, weight)?;
        }
        for (name, confidence) in [
            ("id_card.unknown_confidence", card.unknown_confidence),
            ("id_card.max_confidence", card.max_confidence),
            ("id_card.absent_confidence", card.absent_confidence),
        ] {
            unit(name, confidence)?;
        }
        positive("id_card.max_card_long_side_in", card.max_card_long_side_in)?;

        for (name, confidence) in [
            ("cra.title_confidence", self.cra.title_confidence),
            ("cra.keyword_confidence", self.cra.keyword_confidence),
            ("cra.issuer_bonus", self.cra.issuer_bonus),
            ("cra.max_confidence", self.cra.max_confidence),
            ("tax_form.title_confidence", self.tax_form.title_confidence),
            ("tax_form.code_confidence", self.tax_form.code_confidence),
            ("tax_form.keyword_confidence", self.tax_form.keyword_confidence),
            ("tax_form.year_bonus", self.tax_form.year_bonus),
            ("tax_form.max_confidence", self.tax_form.max_confidence),
            ("boundary.numbering_confidence", self.boundary.numbering_confidence),
            ("boundary.blank_separator_confidence", self.boundary.blank_separator_confidence),
            ("fiscal_year.labelled_bonus", self.fiscal_year.labelled_bonus),
            ("fiscal_year.max_confidence", self.fiscal_year.max_confidence),
            ("fiscal_year.absent_confidence", self.fiscal_year.absent_confidence),
            ("quality.confidence", self.quality.confidence),
        ] {
            unit(name, confidence)?;
        }

        positive(
            "boundary.signature_threshold",
            self.boundary.signature_threshold,
        )?;
        if !(0.0..0.5).contains(&self.boundary.band_fraction) || self.boundary.band_fraction == 0.0
        {
            return Err(invalid("boundary.band_fraction", "must be in (0, 0.5)"));
        }

        for (name, span) in [
            ("fiscal_year.lookback_years", self.fiscal_year.lookback_years),
            ("fiscal_year.lookahead_years", self.fiscal_year.lookahead_years),
        ] {
            if !(0..=MAX_YEAR_SPAN).contains(&span) {
                return Err(invalid(name, &format!("must be between 0 and {MAX_YEAR_SPAN}")));
            }
        }

        let q = &self.quality;
        positive("quality.good_dpi", q.good_dpi)?;
        positive("quality.good_sharpness", q.good_sharpness)?;
        positive("quality.good_contrast", q.good_contrast)?;
        positive("quality.max_skew_deg", q.max_skew_deg)?;
        if !(q.max_skew_search_deg.is_finite()
            && q.max_skew_search_deg > 0.0
            && q.max_skew_search_deg <= MAX_SKEW_SEARCH_DEG)
        {
            return Err(invalid(
                "quality.max_skew_search_deg",
                &format!("must be in (0, {MAX_SKEW_SEARCH_DEG}]"),
            ));
        }
        positive("quality.skew_step_deg", q.skew_step_deg)?;
        if q.skew_step_deg > q.max_skew_search_deg {
            return Err(invalid(
                "quality.skew_step_deg",
                "must not exceed quality.max_skew_search_deg",
            ));
        }
        positive("quality.assumed_page_long_side_in", q.assumed_page_long_side_in)?;
        if q.min_brightness >= q.max_brightness {
            return Err(invalid(
                "quality.min_brightness",
                "must be lower than quality.max_brightness",
            ));
        }
        for (name, weight) in [
            ("quality.weights.dpi", q.weights.dpi),
            ("quality.weights.blur", q.weights.blur),
            ("quality.weights.brightness", q.weights.brightness),
            ("quality.weights.contrast", q.weights.contrast),
            ("quality.weights.skew", q.weights.skew),
        ] {
            non_negative(name, weight)?;
        }
        positive("quality.weights (sum)", q.weights.total())?;

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, "must be a positive number"))
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, "must not be negative"))
    }
}

fn unit(field: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, "must be between 0 and 1"))
    }
}

/// Configuration plus the calendar year used as "now" by year plausibility checks.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisContext {
    pub config: TriageConfig,
    pub reference_year: i32,
}

impl AnalysisContext {
    pub fn new(config: TriageConfig, reference_year: i32) -> Self {
        Self {
            config,
            reference_year,
        }
    }
}
