// Page layout - positioned text runs and image placements from the content stream
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use tracing::{debug, warn};

use super::fonts::{decode_plain, load_fonts, FontInfo};
use super::lopdf_helper::{as_number, get_array, get_dict, get_name, media_box, page_resources, resolve, stream_data};
use crate::types::{BBox, Result};

const MAX_FORM_DEPTH: usize = 8;

// Without font metrics a glyph is assumed half an em wide
const FALLBACK_GLYPH_WIDTH: f32 = 500.0;

// TJ adjustments beyond this (1/1000 em) read as a word space
const TJ_SPACE_THRESHOLD: f32 = 250.0;

/// PDF transformation matrix `[a b c d e f]` (row-vector convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Matrix {
    pub const fn identity() -> Self {
        Self { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 }
    }

    pub const fn translate(tx: f32, ty: f32) -> Self {
        Self { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: tx, f: ty }
    }

    pub fn from_operands(operands: &[Object]) -> Option<Self> {
        if operands.len() != 6 {
            return None;
        }
        let n: Vec<f32> = operands.iter().filter_map(as_number).collect();
        (n.len() == 6).then(|| Self { a: n[0], b: n[1], c: n[2], d: n[3], e: n[4], f: n[5] })
    }

    /// `self × other`: apply `self` first, then `other`.
    pub fn concat(self, other: Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.a + y * self.c + self.e, x * self.b + y * self.d + self.f)
    }

    /// Length of the transformed y unit vector.
    fn vertical_scale(&self) -> f32 {
        (self.c * self.c + self.d * self.d).sqrt()
    }
}

/// A piece of text shown by one text operator, in top-left page coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x0: f32,
    pub x1: f32,
    pub top: f32,
    pub bottom: f32,
    pub font_size: f32,
}

impl TextRun {
    pub fn center_y(&self) -> f32 {
        (self.top + self.bottom) / 2.0
    }
}

/// An image XObject painted on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedImage {
    pub name: String,
    pub object_id: Option<ObjectId>,
    pub bbox: BBox,
}

#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    pub page_number: u32,
    pub width: f32,
    pub height: f32,
    pub runs: Vec<TextRun>,
    pub images: Vec<PlacedImage>,
}

#[derive(Debug, Clone)]
struct TextState {
    tm: Matrix,
    tlm: Matrix,
    font: Option<Vec<u8>>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    h_scale: f32,
    leading: f32,
    rise: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            tm: Matrix::identity(),
            tlm: Matrix::identity(),
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

impl TextState {
    fn next_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).concat(self.tlm);
        self.tm = self.tlm;
    }

    fn advance(&mut self, tx: f32) {
        self.tm = Matrix::translate(tx, 0.0).concat(self.tm);
    }
}

struct LayoutWalker<'a> {
    document: &'a Document,
    page_left: f32,
    page_top: f32,
    runs: Vec<TextRun>,
    images: Vec<PlacedImage>,
}

/// Build the layout of a 1-based page.
pub fn page_layout(document: &Document, page_number: u32, page_id: ObjectId) -> Result<PageLayout> {
    let (x0, y0, x1, y1) = media_box(document, page_id);
    let content = document.get_page_content(page_id)?;
    let resources = page_resources(document, page_id);

    let mut walker = LayoutWalker {
        document,
        page_left: x0,
        page_top: y1,
        runs: Vec::new(),
        images: Vec::new(),
    };
    walker.process(&content, resources, Matrix::identity(), 0)?;

    debug!(
        "page {}: {} text runs, {} images",
        page_number,
        walker.runs.len(),
        walker.images.len()
    );

    Ok(PageLayout {
        page_number,
        width: x1 - x0,
        height: y1 - y0,
        runs: walker.runs,
        images: walker.images,
    })
}

impl<'a> LayoutWalker<'a> {
    fn process(
        &mut self,
        content: &[u8],
        resources: Option<&'a Dictionary>,
        mut ctm: Matrix,
        depth: usize,
    ) -> Result<()> {
        let content = Content::decode(content)?;
        let fonts = load_fonts(self.document, resources);
        let xobjects = resources.and_then(|r| get_dict(self.document, r, b"XObject"));

        let mut state = TextState::default();
        let mut stack: Vec<(Matrix, TextState)> = Vec::new();

        for op in &content.operations {
            let operands = &op.operands;
            let num = |i: usize| operands.get(i).and_then(as_number).unwrap_or(0.0);

            match op.operator.as_str() {
                "q" => stack.push((ctm, state.clone())),
                "Q" => {
                    if let Some((saved_ctm, saved_state)) = stack.pop() {
                        ctm = saved_ctm;
                        state = saved_state;
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        ctm = m.concat(ctm);
                    }
                }
                "BT" => {
                    state.tm = Matrix::identity();
                    state.tlm = Matrix::identity();
                }
                "Tf" => {
                    if let Some(Object::Name(name)) = operands.first() {
                        state.font = Some(name.clone());
                    }
                    state.font_size = num(1);
                }
                "Tc" => state.char_spacing = num(0),
                "Tw" => state.word_spacing = num(0),
                "Tz" => state.h_scale = num(0) / 100.0,
                "TL" => state.leading = num(0),
                "Ts" => state.rise = num(0),
                "Td" => state.next_line(num(0), num(1)),
                "TD" => {
                    state.leading = -num(1);
                    state.next_line(num(0), num(1));
                }
                "Tm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        state.tm = m;
                        state.tlm = m;
                    }
                }
                "T*" => state.next_line(0.0, -state.leading),
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(&mut state, ctm, &fonts, &[TextPiece::Text(bytes)]);
                    }
                }
                "'" => {
                    state.next_line(0.0, -state.leading);
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(&mut state, ctm, &fonts, &[TextPiece::Text(bytes)]);
                    }
                }
                "\"" => {
                    state.word_spacing = num(0);
                    state.char_spacing = num(1);
                    state.next_line(0.0, -state.leading);
                    if let Some(Object::String(bytes, _)) = operands.get(2) {
                        self.show(&mut state, ctm, &fonts, &[TextPiece::Text(bytes)]);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operands.first() {
                        let pieces: Vec<TextPiece> = items
                            .iter()
                            .filter_map(|item| match item {
                                Object::String(bytes, _) => Some(TextPiece::Text(bytes)),
                                other => as_number(other).map(TextPiece::Adjust),
                            })
                            .collect();
                        self.show(&mut state, ctm, &fonts, &pieces);
                    }
                }
                "Do" => {
                    if let Some(Object::Name(name)) = operands.first() {
                        self.paint_xobject(name, xobjects, resources, ctm, depth)?;
                    }
                }
                "BI" => self.place_image("inline".to_string(), None, ctm),
                _ => {}
            }
        }
        Ok(())
    }

    fn paint_xobject(
        &mut self,
        name: &[u8],
        xobjects: Option<&'a Dictionary>,
        resources: Option<&'a Dictionary>,
        ctm: Matrix,
        depth: usize,
    ) -> Result<()> {
        let Some(entry) = xobjects.and_then(|x| x.get(name).ok()) else {
            debug!("XObject /{} not in resources", String::from_utf8_lossy(name));
            return Ok(());
        };
        let object_id = match entry {
            Object::Reference(id) => Some(*id),
            _ => None,
        };
        let Object::Stream(stream) = resolve(self.document, entry) else {
            return Ok(());
        };

        match get_name(self.document, &stream.dict, b"Subtype") {
            Some(b"Image") => {
                self.place_image(String::from_utf8_lossy(name).into_owned(), object_id, ctm);
            }
            Some(b"Form") if depth < MAX_FORM_DEPTH => {
                let form_matrix = get_array(self.document, &stream.dict, b"Matrix")
                    .and_then(|arr| Matrix::from_operands(arr))
                    .unwrap_or_else(Matrix::identity);
                let form_resources = get_dict(self.document, &stream.dict, b"Resources").or(resources);
                match stream_data(stream) {
                    Ok(data) => {
                        if let Err(e) = self.process(&data, form_resources, form_matrix.concat(ctm), depth + 1) {
                            warn!("skipping form XObject /{}: {}", String::from_utf8_lossy(name), e);
                        }
                    }
                    Err(e) => warn!("undecodable form XObject /{}: {}", String::from_utf8_lossy(name), e),
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn place_image(&mut self, name: String, object_id: Option<ObjectId>, ctm: Matrix) {
        let corners = [ctm.apply(0.0, 0.0), ctm.apply(1.0, 0.0), ctm.apply(0.0, 1.0), ctm.apply(1.0, 1.0)];
        let min_x = corners.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
        let max_x = corners.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
        let min_y = corners.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
        let max_y = corners.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);

        self.images.push(PlacedImage {
            name,
            object_id,
            bbox: BBox::new(
                min_x - self.page_left,
                self.page_top - max_y,
                max_x - self.page_left,
                self.page_top - min_y,
            ),
        });
    }

    fn show(&mut self, state: &mut TextState, ctm: Matrix, fonts: &HashMap<Vec<u8>, FontInfo>, pieces: &[TextPiece]) {
        let font = state.font.as_ref().and_then(|name| fonts.get(name));
        let start_matrix = state.tm.concat(ctm);
        let (start_x, baseline) = start_matrix.apply(0.0, state.rise);
        let size = (state.font_size * start_matrix.vertical_scale()).abs().max(1.0);

        let mut text = String::new();
        for piece in pieces {
            match piece {
                TextPiece::Text(bytes) => {
                    let codes = match font {
                        Some(f) => f.codes(bytes),
                        None => bytes.iter().map(|b| *b as u32).collect(),
                    };
                    match font {
                        Some(f) => codes.iter().for_each(|c| text.push_str(&f.decode_code(*c))),
                        None => text.push_str(&decode_plain(bytes)),
                    }
                    for code in codes {
                        let width = font.map(|f| f.width(code)).unwrap_or(FALLBACK_GLYPH_WIDTH);
                        let single_byte_space = code == 32 && !font.map_or(false, |f| f.two_byte);
                        let spacing = state.char_spacing + if single_byte_space { state.word_spacing } else { 0.0 };
                        state.advance((width / 1000.0 * state.font_size + spacing) * state.h_scale);
                    }
                }
                TextPiece::Adjust(n) => {
                    if -n > TJ_SPACE_THRESHOLD && !text.ends_with(' ') {
                        text.push(' ');
                    }
                    state.advance(-n / 1000.0 * state.font_size * state.h_scale);
                }
            }
        }

        let (end_x, _) = state.tm.concat(ctm).apply(0.0, state.rise);
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }

        self.runs.push(TextRun {
            text,
            x0: start_x.min(end_x) - self.page_left,
            x1: start_x.max(end_x) - self.page_left,
            top: self.page_top - (baseline + size * 0.8),
            bottom: self.page_top - (baseline - size * 0.2),
            font_size: size,
        });
    }
}

enum TextPiece<'b> {
    Text(&'b [u8]),
    Adjust(f32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    fn single_page<F>(content: &str, resources: F) -> (Document, ObjectId)
    where
        F: FnOnce(&mut Document) -> Dictionary,
    {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let resources = resources(&mut doc);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.as_bytes().to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources,
            "MediaBox" => vec![0.into(), 0.into(), 600.into(), 800.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        (doc, page_id)
    }

    #[test]
    fn matrix_concat_applies_left_operand_first() {
        let scale = Matrix { a: 2.0, b: 0.0, c: 0.0, d: 2.0, e: 0.0, f: 0.0 };
        let shift = Matrix::translate(10.0, 5.0);
        assert_eq!(scale.concat(shift).apply(1.0, 1.0), (12.0, 7.0));
        assert_eq!(shift.concat(scale).apply(1.0, 1.0), (22.0, 12.0));
    }

    #[test]
    fn image_bbox_is_flipped_to_top_left_origin() {
        let mut image_id = (0, 0);
        let (doc, page_id) = single_page("q 80 0 0 60 50 600 cm /Im1 Do Q", |doc| {
            image_id = doc.add_object(Stream::new(
                dictionary! { "Type" => "XObject", "Subtype" => "Image", "Width" => 1, "Height" => 1 },
                vec![0],
            ));
            dictionary! { "XObject" => dictionary! { "Im1" => image_id } }
        });

        let layout = page_layout(&doc, 1, page_id).unwrap();
        assert_eq!(layout.images.len(), 1);
        let image = &layout.images[0];
        assert_eq!(image.object_id, Some(image_id));
        assert_eq!(image.bbox, BBox::new(50.0, 140.0, 130.0, 200.0));
    }

    #[test]
    fn text_runs_carry_positions() {
        let (doc, page_id) = single_page(
            "BT /F1 10 Tf 72 700 Td (CODE) Tj 100 0 Td (MRP) Tj ET",
            |_| dictionary! {},
        );
        let layout = page_layout(&doc, 1, page_id).unwrap();

        assert_eq!(layout.runs.len(), 2);
        let code = &layout.runs[0];
        assert_eq!(code.text, "CODE");
        assert_eq!(code.x0, 72.0);
        // four glyphs at the fallback half-em width
        assert!((code.x1 - 92.0).abs() < 0.01);
        assert!((code.top - 92.0).abs() < 0.01);
        assert_eq!(layout.runs[1].x0, 172.0);
    }

    #[test]
    fn tj_arrays_insert_spaces_for_wide_gaps() {
        let (doc, page_id) = single_page("BT /F1 12 Tf 10 10 Td [(K-1234) -600 (IN)] TJ ET", |_| dictionary! {});
        let layout = page_layout(&doc, 1, page_id).unwrap();
        assert_eq!(layout.runs[0].text, "K-1234 IN");
    }

    #[test]
    fn cm_and_tm_scale_text_positions() {
        let (doc, page_id) = single_page("q 2 0 0 2 0 0 cm BT /F1 10 Tf 1 0 0 1 30 300 Tm (AB) Tj ET Q", |_| dictionary! {});
        let layout = page_layout(&doc, 1, page_id).unwrap();

        let run = &layout.runs[0];
        assert_eq!(run.text, "AB");
        assert!((run.x0 - 60.0).abs() < 0.01);
        // two half-em glyphs at 10pt, doubled by the CTM
        assert!((run.x1 - 80.0).abs() < 0.01);
        assert!((run.font_size - 20.0).abs() < 0.01);
        assert!((run.top - 184.0).abs() < 0.01);
        assert!((run.bottom - 204.0).abs() < 0.01);
    }

    #[test]
    fn form_xobjects_are_walked_with_their_matrix() {
        let mut image_id = (0, 0);
        let (doc, page_id) = single_page("q 1 0 0 1 0 400 cm /Fm1 Do Q", |doc| {
            image_id = doc.add_object(Stream::new(
                dictionary! { "Type" => "XObject", "Subtype" => "Image", "Width" => 1, "Height" => 1 },
                vec![0],
            ));
            let form_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), 100.into(), 0.into()],
                    "Resources" => dictionary! { "XObject" => dictionary! { "Im1" => image_id } },
                },
                b"q 80 0 0 60 0 0 cm /Im1 Do Q BT /F1 10 Tf 0 100 Td (INSIDE) Tj ET".to_vec(),
            ));
            dictionary! { "XObject" => dictionary! { "Fm1" => form_id } }
        });

        let layout = page_layout(&doc, 1, page_id).unwrap();
        assert_eq!(layout.images.len(), 1);
        assert_eq!(layout.images[0].object_id, Some(image_id));
        assert_eq!(layout.images[0].bbox, BBox::new(100.0, 340.0, 180.0, 400.0));

        assert_eq!(layout.runs.len(), 1);
        assert_eq!(layout.runs[0].text, "INSIDE");
        assert!((layout.runs[0].x0 - 100.0).abs() < 0.01);
        assert!((layout.runs[0].top - 292.0).abs() < 0.01);
    }

    #[test]
    fn self_referencing_forms_stop_at_the_depth_limit() {
        let (doc, page_id) = single_page("/Fm1 Do", |doc| {
            let form_id = doc.new_object_id();
            doc.objects.insert(
                form_id,
                Object::Stream(Stream::new(
                    dictionary! {
                        "Subtype" => "Form",
                        "Resources" => dictionary! { "XObject" => dictionary! { "Fm1" => form_id } },
                    },
                    b"BT 10 10 Td (LOOP) Tj ET /Fm1 Do".to_vec(),
                )),
            );
            dictionary! { "XObject" => dictionary! { "Fm1" => form_id } }
        });

        let layout = page_layout(&doc, 1, page_id).unwrap();
        assert_eq!(layout.runs.len(), MAX_FORM_DEPTH);
        assert!(layout.runs.iter().all(|r| r.text == "LOOP"));
    }
}

