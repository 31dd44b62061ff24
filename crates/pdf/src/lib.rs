use thiserror::Error;

pub mod backend;
pub mod images;
pub mod paint;
pub mod raster;
pub mod render;

pub use backend::{LopdfBackend, PageId, PdfBackend};
pub use paint::ContentPainter;
pub use raster::{PageRaster, PageRenderer, RasterOptions};
pub use render::PdfiumRenderer;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("PDF parsing error: {0}")]
    Parse(String),
    #[error("Document is encrypted")]
    Encrypted,
    #[error("Document has no pages")]
    NoPages,
    #[error("Document has {count} pages, the limit is {max}")]
    TooManyPages { count: usize, max: usize },
    #[error("Render error: {0}")]
    Render(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Convenience free functions (stateless, re-parse each call)
// ---------------------------------------------------------------------------

/// Parse PDF bytes and rasterize every page.
///
/// Pages are rendered by pdfium when the library can be bound, and by the
/// content-stream painter otherwise.
pub fn rasterize(bytes: &[u8], options: &RasterOptions) -> Result<Vec<PageRaster>, PdfError> {
    let backend = LopdfBackend::load_bytes(bytes)?;

    let pdfium = match render::bind_pdfium() {
        Ok(pdfium) => pdfium,
        Err(err) => {
            log::debug!("{}, painting content streams", err);
            return raster::rasterize_pages(&backend, &ContentPainter::new(&backend), options);
        }
    };

    let rasters = match PdfiumRenderer::load(&pdfium, bytes) {
        Ok(renderer) => raster::rasterize_pages(&backend, &renderer, options),
        Err(err) => {
            log::warn!("{}, painting content streams", err);
            raster::rasterize_pages(&backend, &ContentPainter::new(&backend), options)
        }
    };
    rasters
}

/// Count pages without decoding any image.
pub fn page_count(bytes: &[u8]) -> Result<usize, PdfError> {
    Ok(LopdfBackend::load_bytes(bytes)?.page_count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::{build_pdf, gray_image_stream, TestPage};

    #[test]
    fn test_rasterize_scanned_pdf() {
        let bytes = build_pdf(vec![
            TestPage {
                image: Some(gray_image_stream(85, 110, |_, y| if y % 10 < 5 { 0 } else { 255 })),
                text: Some("Statement of Account"),
                ..Default::default()
            },
            TestPage::default(),
        ]);

        let pages = rasterize(&bytes, &RasterOptions::default()).unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        // A 10 DPI scan is not upscaled to 150 DPI.
        assert_eq!((pages[0].image.width(), pages[0].image.height()), (85, 110));
        assert!(pages[0].text.as_deref().unwrap().contains("Statement of Account"));
        assert!(!pages[1].placeholder);
        assert_eq!((pages[1].image.width(), pages[1].image.height()), (1275, 1650));
        assert_eq!(pages[1].size_in(), Some((8.5, 11.0)));
    }

    #[test]
    fn test_small_logo_renders_at_page_aspect() {
        let bytes = build_pdf(vec![TestPage {
            image: Some(gray_image_stream(160, 100, |_, _| 0)),
            content: Some("q 80 0 0 50 36 706 cm /Im0 Do Q"),
            text: Some("Monthly statement"),
            ..Default::default()
        }]);
        let options = RasterOptions {
            dpi: 72,
            max_pages: 10,
        };

        let pages = rasterize(&bytes, &options).unwrap();
        let gray = pages[0].image.to_luma8();

        assert_eq!(gray.dimensions(), (612, 792));
        assert!(!pages[0].placeholder);
        assert!(gray.get_pixel(70, 60).0[0] < 64);
        assert!(gray.get_pixel(300, 500).0[0] > 192);
    }

    #[test]
    fn test_page_count() {
        let bytes = build_pdf((0..3).map(|_| TestPage::default()).collect());
        assert_eq!(page_count(&bytes).unwrap(), 3);
    }

    #[test]
    fn test_truncated_header_is_a_parse_error() {
        let bytes = build_pdf(vec![TestPage::default()]);
        let truncated = &bytes[..bytes.len() / 3];
        assert!(rasterize(truncated, &RasterOptions::default()).is_err());
        assert!(matches!(page_count(b"%PDF-"), Err(PdfError::Parse(_))));
    }
}
