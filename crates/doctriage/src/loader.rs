//! Document loading: fetch bytes, rasterize pages, build a [`Document`].
//!
//! A reference is an `http(s)://` URL, a `file://` URL or a filesystem path.
//! Fetching is attempted exactly once; retrying is the caller's decision.

use std::path::Path;
use std::sync::Arc;

use doctriage_core::config::LoaderConfig;
use doctriage_core::{Document, LoadError, Page, TextRecognizer};
use pdf::{PageRaster, PdfError, RasterOptions};
use reqwest::StatusCode;

/// Fetch the raw bytes behind a reference.
pub async fn fetch(client: &reqwest::Client, reference: &str) -> Result<Vec<u8>, LoadError> {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return fetch_url(client, reference).await;
    }

    let path = reference.strip_prefix("file://").unwrap_or(reference);
    tokio::fs::read(Path::new(path))
        .await
        .map_err(|e| LoadError::Unreachable(format!("{reference}: {e}")))
}

async fn fetch_url(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, LoadError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| LoadError::Unreachable(format!("{url}: {e}")))?;

    let status = response.status();
    if matches!(
        status,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::GONE
    ) {
        return Err(LoadError::Expired(format!("{url} (HTTP {status})")));
    }
    if !status.is_success() {
        return Err(LoadError::Unreachable(format!("{url} (HTTP {status})")));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| LoadError::Unreachable(format!("{url}: {e}")))?;
    Ok(bytes.to_vec())
}

/// Decode PDF bytes into a [`Document`]. CPU bound; call it off the async runtime.
pub fn document_from_bytes(
    source: &str,
    bytes: &[u8],
    config: &LoaderConfig,
    ocr: Arc<dyn TextRecognizer>,
) -> Result<Document, LoadError> {
    let options = RasterOptions {
        dpi: config.dpi,
        max_pages: config.max_pages,
    };

    let rasters = pdf::rasterize(bytes, &options).map_err(|e| match e {
        PdfError::NoPages => LoadError::EmptyDocument,
        PdfError::TooManyPages { count, max } => {
            LoadError::Unparseable(format!("too many pages ({count} > {max})"))
        }
        other => LoadError::Unparseable(other.to_string()),
    })?;

    let placeholders = rasters.iter().filter(|r| r.placeholder).count();
    if placeholders > 0 {
        log::warn!("{source}: {placeholders} page(s) could not be rendered");
    }

    Document::new(source, rasters.into_iter().map(page_from_raster).collect(), ocr)
}

fn page_from_raster(raster: PageRaster) -> Page {
    let size_in = raster.size_in();
    let mut page = Page::new(raster.image);
    if let Some((width, height)) = size_in {
        page = page.with_physical_size(width, height);
    }
    if let Some(text) = raster.text {
        page = page.with_text_layer(text);
    }
    if raster.placeholder {
        page = page.as_placeholder();
    }
    page
}

/// Fetch and decode a document.
pub async fn load(
    client: &reqwest::Client,
    reference: &str,
    config: &LoaderConfig,
    ocr: Arc<dyn TextRecognizer>,
) -> Result<Document, LoadError> {
    let bytes = fetch(client, reference).await?;
    log::info!("Fetched {} bytes from {reference}", bytes.len());

    let source = reference.to_string();
    let config = config.clone();
    tokio::task::spawn_blocking(move || document_from_bytes(&source, &bytes, &config, ocr))
        .await
        .map_err(|e| LoadError::Unparseable(format!("decoder crashed: {e}")))?
}
