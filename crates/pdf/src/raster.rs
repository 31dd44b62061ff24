//! Page rasterization: one raster per page, rendered at or below a target DPI.

use image::{DynamicImage, GrayImage, Luma};

use crate::backend::{PageId, PdfBackend, POINTS_PER_INCH};
use crate::PdfError;

/// US Letter, used when the page size is unknown.
const LETTER_PT: (f32, f32) = (612.0, 792.0);

/// Draws one page into a pixel box.
pub trait PageRenderer {
    /// Render page `number` (1-based) to exactly `size_px` pixels.
    fn render(&self, number: u32, page: PageId, size_px: (u32, u32)) -> Result<DynamicImage, PdfError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterOptions {
    /// Render resolution. Scanned pages with a lower native resolution are
    /// rendered at their own.
    pub dpi: u32,
    pub max_pages: usize,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_pages: 500,
        }
    }
}

/// One rasterized page.
#[derive(Debug, Clone)]
pub struct PageRaster {
    /// 1-based page number.
    pub number: u32,
    pub image: DynamicImage,
    /// MediaBox size in points, `None` when the page tree has none.
    pub size_pt: Option<(f32, f32)>,
    pub text: Option<String>,
    /// True when the page could not be rendered and `image` is blank.
    pub placeholder: bool,
}

impl PageRaster {
    /// Physical size in inches.
    pub fn size_in(&self) -> Option<(f64, f64)> {
        self.size_pt.map(|(w, h)| {
            (
                (w / POINTS_PER_INCH) as f64,
                (h / POINTS_PER_INCH) as f64,
            )
        })
    }
}

/// Rasterize every page of a backend, in page order.
///
/// A page that fails to render gets a white placeholder of the same size so
/// page numbering stays intact.
pub fn rasterize_pages(
    backend: &impl PdfBackend,
    renderer: &impl PageRenderer,
    options: &RasterOptions,
) -> Result<Vec<PageRaster>, PdfError> {
    let pages = backend.pages();
    if pages.is_empty() {
        return Err(PdfError::NoPages);
    }
    if pages.len() > options.max_pages {
        return Err(PdfError::TooManyPages {
            count: pages.len(),
            max: options.max_pages,
        });
    }

    Ok(pages
        .into_iter()
        .map(|(number, page_id)| {
            let size_pt = backend.page_size_pt(page_id).ok();
            let dpi = render_dpi(options.dpi, backend.scan_dpi(page_id));
            let size_px = target_box(size_pt.unwrap_or(LETTER_PT), dpi);

            let (image, placeholder) = match renderer.render(number, page_id, size_px) {
                Ok(image) => (image, false),
                Err(err) => {
                    log::warn!("page {}: {}, using a blank page", number, err);
                    (blank(size_px), true)
                }
            };

            PageRaster {
                number,
                image,
                size_pt,
                text: backend.page_text(number),
                placeholder,
            }
        })
        .collect())
}

/// The target DPI, lowered to a scan's native resolution so scans are never upscaled.
fn render_dpi(target: u32, scan_dpi: Option<f32>) -> f32 {
    let target = target as f32;
    match scan_dpi {
        Some(native) if native.is_finite() && native > 0.0 => target.min(native),
        _ => target,
    }
}

/// Pixel box of a page at `dpi`, at least one pixel per side.
fn target_box(size_pt: (f32, f32), dpi: f32) -> (u32, u32) {
    let scale = dpi / POINTS_PER_INCH;
    (
        ((size_pt.0 * scale).round() as u32).max(1),
        ((size_pt.1 * scale).round() as u32).max(1),
    )
}

fn blank((w, h): (u32, u32)) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(w, h, Luma([255])))
}
