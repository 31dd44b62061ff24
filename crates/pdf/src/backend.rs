use std::collections::BTreeMap;

use crate::{paint, PdfError};

// ---------------------------------------------------------------------------
// Type aliases
// ---------------------------------------------------------------------------

/// A page identifier mirroring `lopdf::ObjectId`: (object number, generation number).
pub type PageId = (u32, u16);

/// PDF user-space units per inch.
pub const POINTS_PER_INCH: f32 = 72.0;

// ---------------------------------------------------------------------------
// PdfBackend trait
// ---------------------------------------------------------------------------

/// Abstraction over a PDF parsing backend (currently backed by `lopdf`).
///
/// Rasterization only needs these four questions answered per page, so it
/// can be tested against an in-memory backend without building PDF bytes.
/// Pixels come from a separate [`crate::raster::PageRenderer`].
pub trait PdfBackend {
    /// Return a mapping from 1-based page number to [`PageId`].
    fn pages(&self) -> BTreeMap<u32, PageId>;

    /// Page size `(width, height)` in points.
    fn page_size_pt(&self, page: PageId) -> Result<(f32, f32), PdfError>;

    /// Text drawn with fonts on the page, if the backend can extract it.
    fn page_text(&self, number: u32) -> Option<String>;

    /// Native resolution of a scan covering the whole page, if there is one.
    fn scan_dpi(&self, page: PageId) -> Option<f32>;
}

// ---------------------------------------------------------------------------
// LopdfBackend
// ---------------------------------------------------------------------------

/// Concrete [`PdfBackend`] implementation backed by [`lopdf::Document`].
pub struct LopdfBackend {
    doc: lopdf::Document,
}

impl LopdfBackend {
    /// Parse a PDF from an in-memory byte slice.
    pub fn load_bytes(data: &[u8]) -> Result<Self, PdfError> {
        let doc = lopdf::Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        if doc.is_encrypted() {
            return Err(PdfError::Encrypted);
        }

        Ok(Self { doc })
    }

    /// Direct access to the underlying `lopdf::Document`.
    pub fn raw_doc(&self) -> &lopdf::Document {
        &self.doc
    }

    /// Total number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Normalized MediaBox `[llx, lly, urx, ury]`, inherited through the page tree.
    pub fn media_box(&self, page: PageId) -> Result<[f32; 4], PdfError> {
        let page_dict = self.page_dict(page)?;
        let media_box = self
            .find_media_box(page_dict)
            .ok_or_else(|| PdfError::Parse("MediaBox not found for page".into()))?;

        let nums = self.array_to_f32s(&media_box)?;
        if nums.len() < 4 {
            return Err(PdfError::Parse(format!(
                "MediaBox has {} elements, expected 4",
                nums.len()
            )));
        }

        Ok([
            nums[0].min(nums[2]),
            nums[1].min(nums[3]),
            nums[0].max(nums[2]),
            nums[1].max(nums[3]),
        ])
    }

    /// `/Rotate` of the page, normalized to 0, 90, 180 or 270.
    pub fn rotation(&self, page: PageId) -> i64 {
        self.page_dict(page)
            .map(|dict| self.inherited_rotation(dict))
            .unwrap_or(0)
    }

    // -- private helpers ----------------------------------------------------

    fn page_dict(&self, page: PageId) -> Result<&lopdf::Dictionary, PdfError> {
        let page_obj = self
            .doc
            .get_object(page)
            .map_err(|e| PdfError::Parse(format!("cannot get page object: {}", e)))?;

        page_obj
            .as_dict()
            .map_err(|e| PdfError::Parse(format!("page object is not a dictionary: {}", e)))
    }

    /// Walk up the page tree to find the MediaBox array.
    fn find_media_box(&self, dict: &lopdf::Dictionary) -> Option<Vec<lopdf::Object>> {
        if let Ok(obj) = dict.get(b"MediaBox") {
            if let Some(arr) = self.resolve_array(obj) {
                return Some(arr);
            }
        }

        if let Ok(parent_ref) = dict.get(b"Parent") {
            if let Ok(parent_id) = parent_ref.as_reference() {
                if let Ok(parent_obj) = self.doc.get_object(parent_id) {
                    if let Ok(parent_dict) = parent_obj.as_dict() {
                        return self.find_media_box(parent_dict);
                    }
                }
            }
        }

        None
    }

    /// Resolve an object to an array, following a single level of indirection.
    fn resolve_array(&self, obj: &lopdf::Object) -> Option<Vec<lopdf::Object>> {
        match obj {
            lopdf::Object::Array(arr) => Some(arr.clone()),
            lopdf::Object::Reference(id) => self
                .doc
                .get_object(*id)
                .ok()
                .and_then(|resolved| resolved.as_array().ok())
                .cloned(),
            _ => None,
        }
    }

    fn array_to_f32s(&self, objects: &[lopdf::Object]) -> Result<Vec<f32>, PdfError> {
        objects
            .iter()
            .map(|obj| {
                let resolved = match obj {
                    lopdf::Object::Reference(id) => self
                        .doc
                        .get_object(*id)
                        .map_err(|e| PdfError::Parse(e.to_string()))?,
                    other => other,
                };
                match resolved {
                    lopdf::Object::Integer(i) => Ok(*i as f32),
                    lopdf::Object::Real(f) => Ok(*f),
                    _ => Err(PdfError::Parse(format!(
                        "expected number in array, got {:?}",
                        resolved
                    ))),
                }
            })
            .collect()
    }

    /// `/Rotate` of the page or its nearest ancestor that sets one.
    fn inherited_rotation(&self, dict: &lopdf::Dictionary) -> i64 {
        if let Ok(angle) = dict.get(b"Rotate").and_then(|o| o.as_i64()) {
            return angle.rem_euclid(360);
        }
        dict.get(b"Parent")
            .and_then(|o| o.as_reference())
            .and_then(|id| self.doc.get_object(id))
            .and_then(|o| o.as_dict())
            .map(|parent| self.inherited_rotation(parent))
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// PdfBackend implementation for LopdfBackend
// ---------------------------------------------------------------------------

impl PdfBackend for LopdfBackend {
    fn pages(&self) -> BTreeMap<u32, PageId> {
        self.doc.get_pages()
    }

    /// MediaBox `[llx, lly, urx, ury]` gives `(urx - llx, ury - lly)`, swapped
    /// for pages rotated by a quarter turn.
    fn page_size_pt(&self, page: PageId) -> Result<(f32, f32), PdfError> {
        let [llx, lly, urx, ury] = self.media_box(page)?;
        let (width, height) = (urx - llx, ury - lly);
        match self.rotation(page) {
            90 | 270 => Ok((height, width)),
            _ => Ok((width, height)),
        }
    }

    fn page_text(&self, number: u32) -> Option<String> {
        self.doc
            .extract_text(&[number])
            .ok()
            .filter(|text| !text.trim().is_empty())
    }

    /// Native resolution of a scan covering the whole page, if there is one.
    fn scan_dpi(&self, page: PageId) -> Option<f32> {
        let media_box = self.media_box(page).ok()?;
        paint::scan_dpi(&self.doc, page, media_box)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
