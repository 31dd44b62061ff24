//! Content-stream painter, used when no pdfium library can be bound.
//!
//! Interprets a simplified graphics state machine and paints what the triage
//! heuristics look at: filled and stroked paths, image and form XObjects, and
//! one ink box per shown glyph. Glyph outlines, clipping, shadings and blend
//! modes are not drawn.
//!
//! | Operator                      | Action |
//! |-------------------------------|--------|
//! | `q` `Q` `cm`                  | Save, restore, concatenate the CTM |
//! | `g` `rg` `k` `sc` `scn` (+ stroke variants) | Set colors |
//! | `m` `l` `c` `v` `y` `h` `re`  | Build the current path |
//! | `f` `F` `f*` `B` `B*` `b` `b*` `S` `s` `n` | Paint or discard the path |
//! | `Do`                          | Draw an image or run a form XObject |
//! | `BT` `Tf` `Tm` `Td` `TD` `T*` `TL` `Tc` `Tw` `Tz` `Ts` `Tr` | Text state |
//! | `Tj` `TJ` `'` `"`             | Show text as ink boxes |

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;
use imageproc::rect::Rect;
use lopdf::content::Content;
use lopdf::{Dictionary, Object};

use crate::backend::{LopdfBackend, PageId, POINTS_PER_INCH};
use crate::images;
use crate::raster::PageRenderer;
use crate::PdfError;

/// A 2x3 affine matrix: [a, b, c, d, e, f].
type Matrix = [f32; 6];

const IDENTITY_MATRIX: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Glyph advance as a fraction of the font size; no font metrics are read.
const APPROX_CHAR_WIDTH_RATIO: f32 = 0.5;

/// Ink box of a glyph relative to its advance and to the font size.
const GLYPH_WIDTH_RATIO: f32 = 0.8;
const GLYPH_HEIGHT_RATIO: f32 = 0.7;

/// Nested form XObjects deeper than this are skipped.
const MAX_FORM_DEPTH: usize = 8;

/// Images this many times larger than the canvas are not resampled.
const MAX_IMAGE_OVERSCAN: u32 = 4;

/// An image counts as the page scan when it covers this share of the page.
const SCAN_COVERAGE: f32 = 0.9;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

type Subpath = Vec<(f32, f32)>;

fn concat(a: &Matrix, b: &Matrix) -> Matrix {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

fn apply(m: &Matrix, x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn numbers(operands: &[Object]) -> Vec<f32> {
    operands.iter().filter_map(get_number).collect()
}

fn matrix_from(operands: &[Object]) -> Option<Matrix> {
    let n = numbers(operands);
    (n.len() == 6).then(|| [n[0], n[1], n[2], n[3], n[4], n[5]])
}

/// Color from 1 (gray), 3 (RGB) or 4 (CMYK) components in `[0, 1]`.
fn color_from(components: &[f32]) -> Option<Rgb<u8>> {
    let byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    match *components {
        [g] => Some(Rgb([byte(g); 3])),
        [r, g, b] => Some(Rgb([byte(r), byte(g), byte(b)])),
        [c, m, y, k] => Some(Rgb([
            byte(1.0 - (c + k).min(1.0)),
            byte(1.0 - (m + k).min(1.0)),
            byte(1.0 - (y + k).min(1.0)),
        ])),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Surfaces
// ---------------------------------------------------------------------------

/// Receives painting calls in default user space.
trait Surface {
    fn fill(&mut self, subpaths: &[Subpath], color: Rgb<u8>);
    fn stroke(&mut self, subpaths: &[Subpath], color: Rgb<u8>);
    /// Draw an image XObject onto the unit square mapped by `ctm`.
    fn image(&mut self, stream: &lopdf::Stream, ctm: &Matrix) -> Result<(), PdfError>;
}

/// Axis-aligned bounds of the unit square under `m`.
fn unit_square_bounds(m: &Matrix) -> (f32, f32, f32, f32) {
    let corners = [
        apply(m, 0.0, 0.0),
        apply(m, 1.0, 0.0),
        apply(m, 0.0, 1.0),
        apply(m, 1.0, 1.0),
    ];
    bounds(&corners)
}

fn bounds(points: &[(f32, f32)]) -> (f32, f32, f32, f32) {
    points.iter().fold(
        (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
        |(x0, y0, x1, y1), &(x, y)| (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
    )
}

/// Unrotated page raster in device space.
struct Canvas {
    image: RgbImage,
    media_box: [f32; 4],
    scale: (f32, f32),
}

impl Canvas {
    fn new(media_box: [f32; 4], size_px: (u32, u32)) -> Self {
        let (w_pt, h_pt) = (media_box[2] - media_box[0], media_box[3] - media_box[1]);
        Canvas {
            image: RgbImage::from_pixel(size_px.0, size_px.1, WHITE),
            media_box,
            scale: (
                size_px.0 as f32 / w_pt.max(f32::EPSILON),
                size_px.1 as f32 / h_pt.max(f32::EPSILON),
            ),
        }
    }

    /// User space to pixels, y pointing down.
    fn to_px(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            (x - self.media_box[0]) * self.scale.0,
            self.image.height() as f32 - (y - self.media_box[1]) * self.scale.1,
        )
    }

    /// Fill a pixel box, at least one pixel wide and tall, clipped to the canvas.
    fn fill_box(&mut self, (x0, y0, x1, y1): (f32, f32, f32, f32), color: Rgb<u8>) {
        let (w, h) = (self.image.width() as f32, self.image.height() as f32);
        if x1 < 0.0 || y1 < 0.0 || x0 >= w || y0 >= h {
            return;
        }
        let left = x0.max(0.0).floor();
        let top = y0.max(0.0).floor();
        let right = x1.min(w).ceil().max(left + 1.0);
        let bottom = y1.min(h).ceil().max(top + 1.0);
        let rect = Rect::at(left as i32, top as i32).of_size((right - left) as u32, (bottom - top) as u32);
        draw_filled_rect_mut(&mut self.image, rect, color);
    }
}

impl Surface for Canvas {
    fn fill(&mut self, subpaths: &[Subpath], color: Rgb<u8>) {
        for subpath in subpaths {
            let mut points: Vec<(f32, f32)> = subpath.iter().map(|&p| self.to_px(p)).collect();
            points.dedup();
            if points.len() > 1 && points.first() == points.last() {
                points.pop();
            }
            if points.len() < 2 {
                continue;
            }

            let mut xs: Vec<i32> = points.iter().map(|p| p.0.round() as i32).collect();
            let mut ys: Vec<i32> = points.iter().map(|p| p.1.round() as i32).collect();
            xs.sort_unstable();
            xs.dedup();
            ys.sort_unstable();
            ys.dedup();

            if points.len() < 3 || (xs.len() <= 2 && ys.len() <= 2) {
                self.fill_box(bounds(&points), color);
                continue;
            }

            let mut polygon: Vec<Point<i32>> = points
                .iter()
                .map(|p| Point::new(p.0.round() as i32, p.1.round() as i32))
                .collect();
            polygon.dedup();
            if polygon.len() > 1 && polygon.first() == polygon.last() {
                polygon.pop();
            }
            if polygon.len() >= 3 {
                draw_polygon_mut(&mut self.image, &polygon, color);
            }
        }
    }

    fn stroke(&mut self, subpaths: &[Subpath], color: Rgb<u8>) {
        for subpath in subpaths {
            for pair in subpath.windows(2) {
                let (a, b) = (self.to_px(pair[0]), self.to_px(pair[1]));
                draw_line_segment_mut(&mut self.image, a, b, color);
            }
        }
    }

    fn image(&mut self, stream: &lopdf::Stream, ctm: &Matrix) -> Result<(), PdfError> {
        let (ux0, uy0, ux1, uy1) = unit_square_bounds(ctm);
        let (x0, y1) = self.to_px((ux0, uy0));
        let (x1, y0) = self.to_px((ux1, uy1));
        let width = (x1 - x0).round().max(1.0) as u32;
        let height = (y1 - y0).round().max(1.0) as u32;
        if width > self.image.width() * MAX_IMAGE_OVERSCAN
            || height > self.image.height() * MAX_IMAGE_OVERSCAN
        {
            log::debug!("skipping image drawn at {width}x{height} px");
            return Ok(());
        }

        let Some(decoded) = images::decode_stream(stream)? else {
            return Ok(());
        };
        let mut pixels = decoded.to_rgb8();
        if ctm[1].abs() > ctm[0].abs() {
            pixels = if ctm[1] > 0.0 {
                imageops::rotate270(&pixels)
            } else {
                imageops::rotate90(&pixels)
            };
        } else {
            if ctm[0] < 0.0 {
                imageops::flip_horizontal_in_place(&mut pixels);
            }
            if ctm[3] < 0.0 {
                imageops::flip_vertical_in_place(&mut pixels);
            }
        }

        let resized = imageops::resize(&pixels, width, height, FilterType::Triangle);
        imageops::overlay(&mut self.image, &resized, x0.round() as i64, y0.round() as i64);
        Ok(())
    }
}

/// Collects the resolution of images that cover nearly the whole page.
struct ScanFinder {
    page_area: f32,
    dpis: Vec<f32>,
}

impl Surface for ScanFinder {
    fn fill(&mut self, _subpaths: &[Subpath], _color: Rgb<u8>) {}

    fn stroke(&mut self, _subpaths: &[Subpath], _color: Rgb<u8>) {}

    fn image(&mut self, stream: &lopdf::Stream, ctm: &Matrix) -> Result<(), PdfError> {
        let (x0, y0, x1, y1) = unit_square_bounds(ctm);
        let (w_pt, h_pt) = (x1 - x0, y1 - y0);
        if w_pt * h_pt < self.page_area * SCAN_COVERAGE {
            return Ok(());
        }
        if let Some((w_px, h_px)) = images::declared_size(stream) {
            let long_in = w_pt.max(h_pt) / POINTS_PER_INCH;
            self.dpis.push(w_px.max(h_px) as f32 / long_in);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct TextState {
    font_size: f32,
    two_byte: bool,
    text_matrix: Matrix,
    line_matrix: Matrix,
    horiz_scale: f32,
    char_spacing: f32,
    word_spacing: f32,
    text_rise: f32,
    leading: f32,
    render_mode: i64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font_size: 0.0,
            two_byte: false,
            text_matrix: IDENTITY_MATRIX,
            line_matrix: IDENTITY_MATRIX,
            horiz_scale: 1.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            text_rise: 0.0,
            leading: 0.0,
            render_mode: 0,
        }
    }
}

impl TextState {
    /// Move the text matrix horizontally by `dx` text-space units.
    fn advance_x(&mut self, dx: f32) {
        self.text_matrix[4] += dx * self.text_matrix[0];
        self.text_matrix[5] += dx * self.text_matrix[1];
    }

    /// Multiply the line matrix by a translation (used by Td / TD / T*).
    fn translate_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = concat(&[1.0, 0.0, 0.0, 1.0, tx, ty], &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    /// Render modes 3 and 7 draw nothing; OCR layers over scans use them.
    fn invisible(&self) -> bool {
        matches!(self.render_mode, 3 | 7)
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill: Rgb<u8>,
    stroke: Rgb<u8>,
    text: TextState,
}

impl GraphicsState {
    fn new(ctm: Matrix) -> Self {
        Self {
            ctm,
            fill: BLACK,
            stroke: BLACK,
            text: TextState::default(),
        }
    }
}

struct Interpreter<'a, S: Surface> {
    doc: &'a lopdf::Document,
    surface: &'a mut S,
}

impl<S: Surface> Interpreter<'_, S> {
    fn run(
        &mut self,
        content: &[u8],
        resources: Option<&Dictionary>,
        initial: GraphicsState,
        depth: usize,
    ) -> Result<(), PdfError> {
        let content = Content::decode(content)
            .map_err(|e| PdfError::Parse(format!("content stream decode error: {}", e)))?;

        let mut state = initial;
        let mut stack: Vec<GraphicsState> = Vec::new();
        let mut path: Vec<Subpath> = Vec::new();

        for op in &content.operations {
            let operands = &op.operands;
            match op.operator.as_str() {
                // -- Graphics state -----------------------------------------
                "q" => stack.push(state.clone()),
                "Q" => {
                    if let Some(saved) = stack.pop() {
                        state = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_from(operands) {
                        state.ctm = concat(&m, &state.ctm);
                    }
                }

                // -- Color --------------------------------------------------
                "g" | "rg" | "k" | "sc" | "scn" => {
                    if let Some(color) = color_from(&numbers(operands)) {
                        state.fill = color;
                    }
                }
                "G" | "RG" | "K" | "SC" | "SCN" => {
                    if let Some(color) = color_from(&numbers(operands)) {
                        state.stroke = color;
                    }
                }
                "cs" => state.fill = BLACK,
                "CS" => state.stroke = BLACK,

                // -- Path construction --------------------------------------
                "m" => {
                    if let [x, y] = numbers(operands)[..] {
                        path.push(vec![apply(&state.ctm, x, y)]);
                    }
                }
                "l" | "c" | "v" | "y" => {
                    let n = numbers(operands);
                    if n.len() >= 2 {
                        let point = apply(&state.ctm, n[n.len() - 2], n[n.len() - 1]);
                        match path.last_mut() {
                            Some(subpath) => subpath.push(point),
                            None => path.push(vec![point]),
                        }
                    }
                }
                "h" => {
                    if let Some(subpath) = path.last_mut() {
                        if let Some(&first) = subpath.first() {
                            subpath.push(first);
                        }
                    }
                }
                "re" => {
                    if let [x, y, w, h] = numbers(operands)[..] {
                        let m = &state.ctm;
                        path.push(vec![
                            apply(m, x, y),
                            apply(m, x + w, y),
                            apply(m, x + w, y + h),
                            apply(m, x, y + h),
                            apply(m, x, y),
                        ]);
                    }
                }

                // -- Path painting ------------------------------------------
                "f" | "F" | "f*" => {
                    self.surface.fill(&path, state.fill);
                    path.clear();
                }
                "B" | "B*" | "b" | "b*" => {
                    self.surface.fill(&path, state.fill);
                    self.surface.stroke(&path, state.stroke);
                    path.clear();
                }
                "S" | "s" => {
                    self.surface.stroke(&path, state.stroke);
                    path.clear();
                }
                "n" => path.clear(),

                // -- XObjects -----------------------------------------------
                "Do" => {
                    if let Some(Ok(name)) = operands.first().map(|o| o.as_name()) {
                        self.draw_xobject(name, resources, &state, depth)?;
                    }
                }

                // -- Text ---------------------------------------------------
                "BT" => {
                    state.text.text_matrix = IDENTITY_MATRIX;
                    state.text.line_matrix = IDENTITY_MATRIX;
                }
                "Tf" => {
                    if let Some(size) = operands.get(1).and_then(get_number) {
                        state.text.font_size = size;
                    }
                    state.text.two_byte = operands
                        .first()
                        .and_then(|o| o.as_name().ok())
                        .is_some_and(|name| self.is_two_byte_font(resources, name));
                }
                "Tm" => {
                    if let Some(m) = matrix_from(operands) {
                        state.text.text_matrix = m;
                        state.text.line_matrix = m;
                    }
                }
                "Td" | "TD" => {
                    if let [tx, ty] = numbers(operands)[..] {
                        if op.operator == "TD" {
                            state.text.leading = -ty;
                        }
                        state.text.translate_line(tx, ty);
                    }
                }
                "T*" => {
                    let leading = state.text.leading;
                    state.text.translate_line(0.0, -leading);
                }
                "TL" | "Tc" | "Tw" | "Tz" | "Ts" => {
                    if let Some(v) = operands.first().and_then(get_number) {
                        let text = &mut state.text;
                        match op.operator.as_str() {
                            "TL" => text.leading = v,
                            "Tc" => text.char_spacing = v,
                            "Tw" => text.word_spacing = v,
                            "Tz" => text.horiz_scale = v / 100.0,
                            _ => text.text_rise = v,
                        }
                    }
                }
                "Tr" => {
                    if let Some(Ok(mode)) = operands.first().map(|o| o.as_i64()) {
                        state.text.render_mode = mode;
                    }
                }
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show_text(bytes, &mut state);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operands.first() {
                        for item in items {
                            match item {
                                Object::String(bytes, _) => self.show_text(bytes, &mut state),
                                other => {
                                    if let Some(adjust) = get_number(other) {
                                        let text = &mut state.text;
                                        let dx = -adjust / 1000.0 * text.font_size * text.horiz_scale;
                                        text.advance_x(dx);
                                    }
                                }
                            }
                        }
                    }
                }
                "'" | "\"" => {
                    if op.operator == "\"" {
                        if let [aw, ac, ..] = numbers(operands)[..] {
                            state.text.word_spacing = aw;
                            state.text.char_spacing = ac;
                        }
                    }
                    let leading = state.text.leading;
                    state.text.translate_line(0.0, -leading);
                    if let Some(Object::String(bytes, _)) = operands.last() {
                        self.show_text(bytes, &mut state);
                    }
                }

                _ => {}
            }
        }

        Ok(())
    }

    fn draw_xobject(
        &mut self,
        name: &[u8],
        resources: Option<&Dictionary>,
        state: &GraphicsState,
        depth: usize,
    ) -> Result<(), PdfError> {
        let Some(stream) = resources
            .and_then(|res| images::xobject_dict(self.doc, res))
            .and_then(|xobjects| xobjects.get(name).ok())
            .and_then(|obj| images::as_stream(images::resolve_object(self.doc, obj)))
        else {
            return Ok(());
        };

        if images::is_subtype(stream, b"Image") {
            return self.surface.image(stream, &state.ctm);
        }
        if !images::is_subtype(stream, b"Form") || depth >= MAX_FORM_DEPTH {
            return Ok(());
        }

        let matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|o| o.as_array().ok())
            .and_then(|arr| matrix_from(arr))
            .unwrap_or(IDENTITY_MATRIX);
        let form_resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|o| images::resolve_dict(self.doc, o))
            .or(resources);
        let content = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());

        let mut form_state = state.clone();
        form_state.ctm = concat(&matrix, &state.ctm);
        self.run(&content, form_resources, form_state, depth + 1)
    }

    fn is_two_byte_font(&self, resources: Option<&Dictionary>, name: &[u8]) -> bool {
        resources
            .and_then(|res| res.get(b"Font").ok())
            .and_then(|fonts| images::resolve_dict(self.doc, fonts))
            .and_then(|fonts| fonts.get(name).ok())
            .and_then(|font| images::resolve_dict(self.doc, font))
            .and_then(|font| font.get(b"Subtype").ok())
            .and_then(|subtype| subtype.as_name().ok())
            .is_some_and(|subtype| subtype == b"Type0")
    }

    /// Paint one ink box per glyph and advance the text matrix past the string.
    fn show_text(&mut self, bytes: &[u8], state: &mut GraphicsState) {
        let text = &mut state.text;
        let size = text.font_size;
        let advance = size * APPROX_CHAR_WIDTH_RATIO;
        let glyph_w = advance * GLYPH_WIDTH_RATIO * text.horiz_scale;
        let (bottom, top) = (text.text_rise, text.text_rise + size * GLYPH_HEIGHT_RATIO);
        let step = if text.two_byte { 2 } else { 1 };

        for code in bytes.chunks(step) {
            let is_space = code == b" ";
            if !is_space && !text.invisible() && size > 0.0 {
                let to_user = concat(&text.text_matrix, &state.ctm);
                let corners = vec![
                    apply(&to_user, 0.0, bottom),
                    apply(&to_user, glyph_w, bottom),
                    apply(&to_user, glyph_w, top),
                    apply(&to_user, 0.0, top),
                ];
                self.surface.fill(&[corners], state.fill);
            }

            let mut dx = advance + text.char_spacing;
            if is_space {
                dx += text.word_spacing;
            }
            text.advance_x(dx * text.horiz_scale);
        }
    }
}

fn page_content(doc: &lopdf::Document, page: PageId) -> Result<Vec<u8>, PdfError> {
    doc.get_page_content(page)
        .map_err(|e| PdfError::Parse(format!("cannot get page content: {}", e)))
}

fn interpret<S: Surface>(doc: &lopdf::Document, page: PageId, surface: &mut S) -> Result<(), PdfError> {
    let content = page_content(doc, page)?;
    let page_dict = images::page_dict(doc, page)?;
    let resources = images::page_resources(doc, page_dict);

    let mut interpreter = Interpreter { doc, surface };
    interpreter.run(&content, resources, GraphicsState::new(IDENTITY_MATRIX), 0)
}

/// Resolution of the page's scan, when one image covers the whole page.
pub(crate) fn scan_dpi(doc: &lopdf::Document, page: PageId, media_box: [f32; 4]) -> Option<f32> {
    let page_area = (media_box[2] - media_box[0]) * (media_box[3] - media_box[1]);
    let mut finder = ScanFinder {
        page_area,
        dpis: Vec::new(),
    };
    interpret(doc, page, &mut finder).ok()?;
    finder.dpis.into_iter().reduce(f32::max)
}

// ---------------------------------------------------------------------------
// ContentPainter
// ---------------------------------------------------------------------------

/// [`PageRenderer`] that paints pages from their lopdf content streams.
pub struct ContentPainter<'a> {
    backend: &'a LopdfBackend,
}

impl<'a> ContentPainter<'a> {
    pub fn new(backend: &'a LopdfBackend) -> Self {
        Self { backend }
    }
}

impl PageRenderer for ContentPainter<'_> {
    fn render(&self, _number: u32, page: PageId, size_px: (u32, u32)) -> Result<DynamicImage, PdfError> {
        let media_box = self.backend.media_box(page)?;
        let rotation = self.backend.rotation(page);
        let unrotated = match rotation {
            90 | 270 => (size_px.1, size_px.0),
            _ => size_px,
        };

        let mut canvas = Canvas::new(media_box, unrotated);
        interpret(self.backend.raw_doc(), page, &mut canvas)?;

        let image = match rotation {
            90 => imageops::rotate90(&canvas.image),
            180 => imageops::rotate180(&canvas.image),
            270 => imageops::rotate270(&canvas.image),
            _ => canvas.image,
        };
        Ok(DynamicImage::ImageRgb8(image))
    }
}
