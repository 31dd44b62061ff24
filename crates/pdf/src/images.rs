use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};

use crate::backend::PageId;
use crate::PdfError;

// ---------------------------------------------------------------------------
// Raw image handling
// ---------------------------------------------------------------------------

/// Parsed color space from a PDF image stream dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
}

/// Parsed image metadata from a PDF stream dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawImageMeta {
    width: u32,
    height: u32,
    bits_per_component: u8,
    channels: u8,
    color_space: ColorSpace,
}

impl RawImageMeta {
    /// Expected raw byte count, with per-row byte alignment for packed pixels.
    fn expected_byte_count(&self) -> Result<usize, PdfError> {
        (self.width as usize)
            .checked_mul(self.channels as usize)
            .and_then(|samples| samples.checked_mul(self.bits_per_component as usize))
            .map(|bits_per_row| bits_per_row.div_ceil(8))
            .and_then(|bytes_per_row| bytes_per_row.checked_mul(self.height as usize))
            .ok_or_else(|| {
                PdfError::Parse(format!(
                    "image of {}x{} pixels is too large",
                    self.width, self.height
                ))
            })
    }
}

fn extract_image_meta(dict: &lopdf::Dictionary) -> Option<RawImageMeta> {
    let width = dict_u32(dict, b"Width")?;
    let height = dict_u32(dict, b"Height")?;

    let bits_per_component = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|obj| obj.as_i64().ok())
        .map(|v| v as u8)
        .unwrap_or(8);
    if !matches!(bits_per_component, 1 | 2 | 4 | 8) {
        return None;
    }

    let (color_space, channels) = match color_space_name(dict)? {
        b"DeviceRGB" | b"CalRGB" => (ColorSpace::Rgb, 3),
        b"DeviceGray" | b"CalGray" => (ColorSpace::Gray, 1),
        b"DeviceCMYK" => (ColorSpace::Cmyk, 4),
        _ => return None,
    };

    Some(RawImageMeta {
        width,
        height,
        bits_per_component,
        channels,
        color_space,
    })
}

/// `ColorSpace` as a name, or the first element of `[/CalRGB <<...>>]`-style arrays.
fn color_space_name(dict: &lopdf::Dictionary) -> Option<&[u8]> {
    match dict.get(b"ColorSpace").ok()? {
        lopdf::Object::Name(name) => Some(name.as_slice()),
        lopdf::Object::Array(arr) => arr.first()?.as_name().ok(),
        _ => None,
    }
}

fn dict_u32(dict: &lopdf::Dictionary, key: &[u8]) -> Option<u32> {
    let value = dict.get(key).ok()?.as_i64().ok()?;
    u32::try_from(value).ok().filter(|v| *v > 0)
}

/// Build a raster from uncompressed pixel data.
fn decode_raw(meta: &RawImageMeta, raw_bytes: &[u8]) -> Result<Option<DynamicImage>, PdfError> {
    // Some producers pad the stream; anything shorter is corrupt.
    let expected = meta.expected_byte_count()?;
    if raw_bytes.len() < expected {
        return Ok(None);
    }
    let raw_bytes = &raw_bytes[..expected];

    let expanded = if meta.bits_per_component < 8 {
        expand_sub_byte_pixels(raw_bytes, meta)
    } else {
        raw_bytes.to_vec()
    };

    Ok(match meta.color_space {
        ColorSpace::Gray => {
            GrayImage::from_raw(meta.width, meta.height, expanded).map(DynamicImage::ImageLuma8)
        }
        ColorSpace::Rgb => {
            RgbImage::from_raw(meta.width, meta.height, expanded).map(DynamicImage::ImageRgb8)
        }
        ColorSpace::Cmyk => RgbImage::from_raw(meta.width, meta.height, cmyk_to_rgb(&expanded))
            .map(DynamicImage::ImageRgb8),
    })
}

/// Expand packed pixels (1, 2 or 4 bits) to 8 bits per component.
fn expand_sub_byte_pixels(raw_bytes: &[u8], meta: &RawImageMeta) -> Vec<u8> {
    let samples_per_row = meta.width as usize * meta.channels as usize;
    let bytes_per_row = (samples_per_row * meta.bits_per_component as usize).div_ceil(8);
    let bpc = meta.bits_per_component;
    let max_val = (1u16 << bpc) - 1;
    let samples_per_byte = 8 / bpc as usize;

    let mut result = Vec::with_capacity(samples_per_row * meta.height as usize);

    for row_bytes in raw_bytes.chunks_exact(bytes_per_row) {
        let mut count = 0;
        for &byte in row_bytes {
            for i in 0..samples_per_byte {
                if count >= samples_per_row {
                    break;
                }
                let shift = 8 - bpc * (i as u8 + 1);
                let val = (byte >> shift) & (max_val as u8);
                result.push((val as u16 * 255 / max_val) as u8);
                count += 1;
            }
        }
    }

    result
}

fn cmyk_to_rgb(cmyk_bytes: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(cmyk_bytes.len() / 4 * 3);
    for pixel in cmyk_bytes.chunks_exact(4) {
        let (c, m, y, k) = (
            pixel[0] as u16,
            pixel[1] as u16,
            pixel[2] as u16,
            pixel[3] as u16,
        );
        let r = 255u16.saturating_sub((c + k).min(255)) as u8;
        let g = 255u16.saturating_sub((m + k).min(255)) as u8;
        let b = 255u16.saturating_sub((y + k).min(255)) as u8;
        rgb.extend_from_slice(&[r, g, b]);
    }
    rgb
}

/// Decode CCITT Group 4 fax data. Only `K < 0` streams are supported.
fn decode_ccitt(dict: &lopdf::Dictionary, raw_bytes: &[u8]) -> Result<Option<DynamicImage>, PdfError> {
    let Some(decode_parms) = extract_decode_parms(dict) else {
        return Ok(None);
    };

    let k = decode_parms
        .get(b"K")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(0);
    if k >= 0 {
        return Ok(None);
    }

    let width = match decode_parms.get(b"Columns").and_then(|o| o.as_i64()) {
        Ok(columns) => fax_dimension("Columns", columns)?,
        Err(_) => return Ok(None),
    };
    let height = match decode_parms.get(b"Rows").and_then(|o| o.as_i64()) {
        Ok(rows) => Some(fax_dimension("Rows", rows)?),
        Err(_) => None,
    };
    if width == 0 {
        return Ok(None);
    }

    let mut pixels: Vec<u8> = Vec::new();
    let mut rows = 0u32;

    let decoded = fax::decoder::decode_g4(raw_bytes.iter().copied(), width, height, |transitions| {
        pixels.extend(row_luma(transitions, width));
        rows += 1;
    });
    if decoded.is_none() || rows == 0 {
        return Ok(None);
    }

    Ok(GrayImage::from_raw(width as u32, rows, pixels).map(DynamicImage::ImageLuma8))
}

/// Fax dimensions must fit the decoder's 16-bit counters.
fn fax_dimension(key: &str, value: i64) -> Result<u16, PdfError> {
    u16::try_from(value)
        .map_err(|_| PdfError::Parse(format!("CCITT {key} {value} is out of range")))
}

fn extract_decode_parms(dict: &lopdf::Dictionary) -> Option<&lopdf::Dictionary> {
    let obj = dict.get(b"DecodeParms").ok()?;
    match obj {
        lopdf::Object::Dictionary(d) => Some(d),
        lopdf::Object::Array(arr) => arr.first().and_then(|o| o.as_dict().ok()),
        _ => None,
    }
}

/// Turn fax transition positions into one row of 8-bit luma, white first.
fn row_luma(transitions: &[u16], width: u16) -> Vec<u8> {
    let mut row = vec![255u8; width as usize];
    let mut is_black = false;
    let mut prev_pos: u16 = 0;

    for &pos in transitions {
        if is_black {
            row[prev_pos as usize..pos.min(width) as usize].fill(0);
        }
        prev_pos = pos.min(width);
        is_black = !is_black;
    }

    if is_black {
        row[prev_pos as usize..].fill(0);
    }

    row
}

/// Decode one image XObject into pixels, whatever its encoding.
///
/// `Ok(None)` means the encoding is not supported; malformed dimensions are
/// parse errors.
pub(crate) fn decode_stream(stream: &lopdf::Stream) -> Result<Option<DynamicImage>, PdfError> {
    match extract_filter_name(&stream.dict).as_deref() {
        Some("DCTDecode") => {
            Ok(image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg).ok())
        }
        // No JPEG 2000 decoder in the image stack.
        Some("JPXDecode") => Ok(None),
        Some("CCITTFaxDecode") => decode_ccitt(&stream.dict, &stream.content),
        _ => {
            let bytes = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());

            if let Some(meta) = extract_image_meta(&stream.dict) {
                if let Some(image) = decode_raw(&meta, &bytes)? {
                    return Ok(Some(image));
                }
            }

            // Some producers embed whole PNG or JPEG files.
            Ok(match image::guess_format(&bytes) {
                Ok(format @ (ImageFormat::Png | ImageFormat::Jpeg)) => {
                    image::load_from_memory_with_format(&bytes, format).ok()
                }
                _ => None,
            })
        }
    }
}

/// Declared `(Width, Height)` of an image XObject, without decoding it.
pub(crate) fn declared_size(stream: &lopdf::Stream) -> Option<(u32, u32)> {
    if !is_subtype(stream, b"Image") {
        return None;
    }
    Some((dict_u32(&stream.dict, b"Width")?, dict_u32(&stream.dict, b"Height")?))
}

pub(crate) fn is_subtype(stream: &lopdf::Stream, subtype: &[u8]) -> bool {
    stream
        .dict
        .get(b"Subtype")
        .ok()
        .and_then(|o| o.as_name().ok())
        .is_some_and(|n| n == subtype)
}

// ---------------------------------------------------------------------------
// Object helpers
// ---------------------------------------------------------------------------

pub(crate) fn page_dict(doc: &lopdf::Document, page_id: PageId) -> Result<&lopdf::Dictionary, PdfError> {
    doc.get_object(page_id)
        .map_err(|e| PdfError::Parse(format!("cannot get page object: {}", e)))?
        .as_dict()
        .map_err(|e| PdfError::Parse(format!("page object is not a dictionary: {}", e)))
}

/// Resolve a `lopdf::Object` that might be a `Reference` to the actual object.
pub(crate) fn resolve_object<'a>(doc: &'a lopdf::Document, obj: &'a lopdf::Object) -> &'a lopdf::Object {
    match obj {
        lopdf::Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

pub(crate) fn resolve_dict<'a>(
    doc: &'a lopdf::Document,
    obj: &'a lopdf::Object,
) -> Option<&'a lopdf::Dictionary> {
    match obj {
        lopdf::Object::Dictionary(d) => Some(d),
        lopdf::Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        _ => None,
    }
}

/// The page's Resources, walking up to the parent node for inherited resources.
pub(crate) fn page_resources<'a>(
    doc: &'a lopdf::Document,
    page_dict: &'a lopdf::Dictionary,
) -> Option<&'a lopdf::Dictionary> {
    match page_dict.get(b"Resources") {
        Ok(obj) => resolve_dict(doc, obj),
        Err(_) => {
            let parent_id = page_dict.get(b"Parent").ok()?.as_reference().ok()?;
            let parent = doc.get_object(parent_id).ok()?.as_dict().ok()?;
            page_resources(doc, parent)
        }
    }
}

pub(crate) fn xobject_dict<'a>(
    doc: &'a lopdf::Document,
    resources: &'a lopdf::Dictionary,
) -> Option<&'a lopdf::Dictionary> {
    resolve_dict(doc, resources.get(b"XObject").ok()?)
}

pub(crate) fn as_stream(obj: &lopdf::Object) -> Option<&lopdf::Stream> {
    match obj {
        lopdf::Object::Stream(s) => Some(s),
        _ => None,
    }
}

/// First filter name of a stream; `Filter` may be a name or an array of names.
fn extract_filter_name(dict: &lopdf::Dictionary) -> Option<String> {
    let filter_obj = dict.get(b"Filter").ok()?;
    match filter_obj {
        lopdf::Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        lopdf::Object::Array(arr) => arr.first().and_then(|o| match o {
            lopdf::Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
            _ => None,
        }),
        _ => None,
    }
}
