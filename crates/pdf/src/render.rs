//! Page rendering through a dynamically bound pdfium library.

use std::path::PathBuf;

use image::DynamicImage;
use pdfium_render::prelude::*;

use crate::backend::PageId;
use crate::raster::PageRenderer;
use crate::PdfError;

/// Directory holding the pdfium library, searched before the defaults.
pub const PDFIUM_DIR_ENV: &str = "DOCTRIAGE_PDFIUM_DIR";

fn pdfium_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(dir) = std::env::var_os(PDFIUM_DIR_ENV) {
        paths.push(PathBuf::from(dir));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            paths.push(exe_dir.join("libs"));
            paths.push(exe_dir.to_path_buf());

            // .app/Contents/MacOS/doctriage -> .app/Contents/Resources
            #[cfg(target_os = "macos")]
            {
                if let Some(contents_dir) = exe_dir.parent() {
                    paths.push(contents_dir.join("Resources").join("libs"));
                    paths.push(contents_dir.join("Resources"));
                }
            }

            #[cfg(target_os = "linux")]
            {
                if let Ok(appdir) = std::env::var("APPDIR") {
                    let appdir_path = PathBuf::from(appdir);
                    paths.push(appdir_path.join("usr").join("lib"));
                }
            }
        }
    }

    paths.push(PathBuf::from("libs"));
    paths.push(PathBuf::from("./"));
    paths
}

/// Bind pdfium from the search paths, then from the system library path.
pub fn bind_pdfium() -> Result<Pdfium, PdfError> {
    for path in pdfium_search_paths() {
        let lib_path = Pdfium::pdfium_platform_library_name_at_path(&path);
        log::debug!("trying pdfium at {:?}", lib_path);

        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            log::debug!("bound pdfium from {:?}", path);
            return Ok(Pdfium::new(bindings));
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| PdfError::Render(format!("pdfium library not available: {}", e)))
}

/// [`PageRenderer`] over a document opened by pdfium.
pub struct PdfiumRenderer<'a> {
    document: PdfDocument<'a>,
}

impl<'a> PdfiumRenderer<'a> {
    pub fn load(pdfium: &'a Pdfium, bytes: &'a [u8]) -> Result<Self, PdfError> {
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| PdfError::Render(format!("pdfium cannot open document: {}", e)))?;
        Ok(Self { document })
    }
}

impl PageRenderer for PdfiumRenderer<'_> {
    fn render(&self, number: u32, _page: PageId, size_px: (u32, u32)) -> Result<DynamicImage, PdfError> {
        let index = number
            .checked_sub(1)
            .and_then(|i| u16::try_from(i).ok())
            .ok_or_else(|| PdfError::Render(format!("page {} is out of range", number)))?;
        let page = self
            .document
            .pages()
            .get(index)
            .map_err(|e| PdfError::Render(format!("cannot get page {}: {}", number, e)))?;

        let to_i32 = |v: u32| i32::try_from(v).unwrap_or(i32::MAX);
        let config = PdfRenderConfig::new()
            .set_target_width(to_i32(size_px.0))
            .set_target_height(to_i32(size_px.1));

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| PdfError::Render(format!("cannot render page {}: {}", number, e)))?;

        Ok(bitmap.as_image())
    }
}
