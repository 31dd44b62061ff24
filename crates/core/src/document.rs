//! Decoded documents and their pages.
//!
//! A [`Document`] is built once per analysis request and shared read-only by
//! every tool. The only interior mutability is the per-page text memo, which
//! is filled at most once through [`std::sync::OnceLock`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use image::{DynamicImage, GrayImage};
use unicode_normalization::UnicodeNormalization;

use crate::error::{LoadError, OcrError};

/// Long side of a US Letter page, used when a page has no physical size.
pub const LETTER_LONG_SIDE_IN: f64 = 11.0;

/// OCR capability. Implementations must be pure with respect to the image.
pub trait TextRecognizer: Send + Sync {
    fn text_for(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

/// Recognizer used when no OCR engine is available. Every page reads as empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOcr;

impl TextRecognizer for NoOcr {
    fn text_for(&self, _image: &DynamicImage) -> Result<String, OcrError> {
        Ok(String::new())
    }
}

pub struct Page {
    number: usize,
    image: DynamicImage,
    gray: GrayImage,
    physical_size_in: Option<(f64, f64)>,
    text_layer: Option<String>,
    placeholder: bool,
    text: OnceLock<String>,
}

impl Page {
    pub fn new(image: DynamicImage) -> Self {
        let gray = image.to_luma8();
        Page {
            number: 0,
            image,
            gray,
            physical_size_in: None,
            text_layer: None,
            placeholder: false,
            text: OnceLock::new(),
        }
    }

    pub fn with_physical_size(mut self, width_in: f64, height_in: f64) -> Self {
        if width_in > 0.0 && height_in > 0.0 {
            self.physical_size_in = Some((width_in, height_in));
        }
        self
    }

    /// Text already embedded in the PDF. When non-empty it replaces OCR.
    pub fn with_text_layer(mut self, text: impl Into<String>) -> Self {
        self.text_layer = Some(text.into());
        self
    }

    /// Mark the raster as synthesized rather than decoded from the file.
    pub fn as_placeholder(mut self) -> Self {
        self.placeholder = true;
        self
    }

    /// 1-based position within the owning document.
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    pub fn height(&self) -> u32 {
        self.gray.height()
    }

    pub fn physical_size_in(&self) -> Option<(f64, f64)> {
        self.physical_size_in
    }

    /// Physical size in inches, or an estimate that maps the raster's long
    /// side onto `assumed_long_side_in`.
    pub fn size_in_or(&self, assumed_long_side_in: f64) -> (f64, f64) {
        if let Some(size) = self.physical_size_in {
            return size;
        }
        let long = self.width().max(self.height()) as f64;
        if long == 0.0 {
            return (0.0, 0.0);
        }
        let scale = assumed_long_side_in / long;
        (self.width() as f64 * scale, self.height() as f64 * scale)
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("number", &self.number)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("physical_size_in", &self.physical_size_in)
            .field("placeholder", &self.placeholder)
            .field("text_cached", &self.text.get().is_some())
            .finish()
    }
}

pub struct Document {
    source: String,
    pages: Vec<Page>,
    ocr: Arc<dyn TextRecognizer>,
    ocr_runs: AtomicUsize,
}

impl Document {
    /// Take ownership of the pages and number them in order, starting at 1.
    pub fn new(
        source: impl Into<String>,
        pages: Vec<Page>,
        ocr: Arc<dyn TextRecognizer>,
    ) -> Result<Self, LoadError> {
        if pages.is_empty() {
            return Err(LoadError::EmptyDocument);
        }

        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(index, mut page)| {
                page.number = index + 1;
                page
            })
            .collect();

        Ok(Document {
            source: source.into(),
            pages,
            ocr,
            ocr_runs: AtomicUsize::new(0),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Look up a page by its 1-based number.
    pub fn page(&self, number: usize) -> Option<&Page> {
        number.checked_sub(1).and_then(|i| self.pages.get(i))
    }

    /// Plain text of a page, computed at most once and memoized.
    ///
    /// Uses the embedded text layer when present, OCR otherwise. OCR failures
    /// are logged and read as empty text.
    pub fn text<'a>(&'a self, page: &'a Page) -> &'a str {
        page.text.get_or_init(|| {
            let raw = match page.text_layer.as_deref() {
                Some(layer) if !layer.trim().is_empty() => layer.to_string(),
                _ => {
                    self.ocr_runs.fetch_add(1, Ordering::Relaxed);
                    match self.ocr.text_for(&page.image) {
                        Ok(text) => text,
                        Err(err) => {
                            log::warn!(
                                "OCR failed for page {} of {}: {err}",
                                page.number,
                                self.source
                            );
                            String::new()
                        }
                    }
                }
            };
            normalize_text(&raw)
        })
    }

    /// Number of OCR engine invocations so far.
    pub fn ocr_runs(&self) -> usize {
        self.ocr_runs.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("source", &self.source)
            .field("pages", &self.pages)
            .finish()
    }
}

/// NFKC-normalize so ligatures and full-width forms match ASCII patterns.
pub fn normalize_text(text: &str) -> String {
    text.nfkc().collect()
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    struct CountingOcr {
        calls: AtomicUsize,
    }

    impl TextRecognizer for CountingOcr {
        fn text_for(&self, _image: &DynamicImage) -> Result<String, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            Ok("Notice of Assessment".to_string())
        }
    }

    struct FailingOcr;

    impl TextRecognizer for FailingOcr {
        fn text_for(&self, _image: &DynamicImage) -> Result<String, OcrError> {
            Err(OcrError::Failed("engine crashed".into()))
        }
    }

    #[test]
    fn test_empty_document_is_rejected() {
        let err = Document::new("x", Vec::new(), Arc::new(NoOcr)).unwrap_err();
        assert_eq!(err, LoadError::EmptyDocument);
    }

    #[test]
    fn test_pages_are_numbered_from_one() {
        let doc = document(vec![blank_page(), blank_page(), blank_page()]);
        let numbers: Vec<usize> = doc.pages().iter().map(Page::number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(doc.page(0).is_none());
        assert_eq!(doc.page(3).map(Page::number), Some(3));
    }

    #[test]
    fn test_text_layer_skips_ocr() {
        let doc = document(vec![text_page("Tax year 2023")]);
        assert_eq!(doc.text(&doc.pages()[0]), "Tax year 2023");
        assert_eq!(doc.ocr_runs(), 0);
    }

    #[test]
    fn test_ocr_runs_once_per_page_under_concurrency() {
        let ocr = Arc::new(CountingOcr {
            calls: AtomicUsize::new(0),
        });
        let doc = Document::new("x", vec![blank_page(), blank_page()], ocr.clone()).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for page in doc.pages() {
                        assert_eq!(doc.text(page), "Notice of Assessment");
                    }
                });
            }
        });

        assert_eq!(ocr.calls.load(Ordering::SeqCst), 2);
        assert_eq!(doc.ocr_runs(), 2);
    }

    #[test]
    fn test_ocr_failure_reads_as_empty_text() {
        let doc = Document::new("x", vec![blank_page()], Arc::new(FailingOcr)).unwrap();
        assert_eq!(doc.text(&doc.pages()[0]), "");
        assert_eq!(doc.text(&doc.pages()[0]), "");
        assert_eq!(doc.ocr_runs(), 1);
    }

    #[test]
    fn test_size_falls_back_to_letter_long_side() {
        let sized = blank_page();
        assert_eq!(sized.size_in_or(LETTER_LONG_SIDE_IN), (8.5, 11.0));

        let no_size = rgb_page(300, 150, [255, 255, 255]);
        let (w, h) = no_size.size_in_or(LETTER_LONG_SIDE_IN);
        assert!((w - 11.0).abs() < 1e-9);
        assert!((h - 5.5).abs() < 1e-9);
    }

    #[test]
    fn test_text_is_nfkc_normalized() {
        let doc = document(vec![text_page("\u{FB01}scal year")]);
        assert_eq!(doc.text(&doc.pages()[0]), "fiscal year");
    }
}
