// Font decoding: byte codes to unicode text and glyph advances
use lopdf::{Dictionary, Document, Object};
use std::collections::HashMap;

use super::lopdf_helper::{
    as_number, get_array, get_dict, get_name, get_number, get_resolved, numbers, resolve, stream_data,
};

// Advance used when a font carries no width information (1/1000 text space)
const DEFAULT_GLYPH_WIDTH: f32 = 500.0;

// CIDs and two-byte codes never exceed this many entries per range
const MAX_CODE_RANGE: u32 = 0xFFFF;

/// What a text-showing operator needs to know about the current font.
#[derive(Debug, Clone, Default)]
pub struct FontInfo {
    /// Composite (Type0) fonts use two-byte codes
    pub two_byte: bool,
    pub to_unicode: HashMap<u32, String>,
    widths: HashMap<u32, f32>,
    default_width: f32,
}

impl FontInfo {
    pub fn from_dict(document: &Document, font: &Dictionary) -> Self {
        let subtype = get_name(document, font, b"Subtype").unwrap_or_default();
        let two_byte = subtype == b"Type0";

        let to_unicode = match get_resolved(document, font, b"ToUnicode") {
            Some(Object::Stream(stream)) => stream_data(stream)
                .map(|data| parse_to_unicode(&data))
                .unwrap_or_default(),
            _ => HashMap::new(),
        };

        let mut info = Self {
            two_byte,
            to_unicode,
            widths: HashMap::new(),
            default_width: DEFAULT_GLYPH_WIDTH,
        };

        if two_byte {
            info.load_cid_widths(document, font);
        } else {
            info.load_simple_widths(document, font);
        }
        info
    }

    fn load_simple_widths(&mut self, document: &Document, font: &Dictionary) {
        let first = get_number(document, font, b"FirstChar").unwrap_or(0.0) as u32;
        if let Some(widths) = get_array(document, font, b"Widths") {
            for (code, w) in (first..=u32::MAX).zip(numbers(document, widths)) {
                self.widths.insert(code, w);
            }
        }
    }

    fn load_cid_widths(&mut self, document: &Document, font: &Dictionary) {
        let descendant = get_array(document, font, b"DescendantFonts")
            .and_then(|arr| arr.first())
            .and_then(|obj| match resolve(document, obj) {
                Object::Dictionary(d) => Some(d),
                _ => None,
            });
        let Some(cid_font) = descendant else {
            return;
        };

        self.default_width = get_number(document, cid_font, b"DW").unwrap_or(1000.0);

        // W is a mix of `c [w1 w2 ...]` and `c_first c_last w`
        let Some(w) = get_array(document, cid_font, b"W") else {
            return;
        };
        let mut i = 0;
        while i < w.len() {
            let Some(start) = as_number(resolve(document, &w[i])).map(|n| n as u32) else {
                break;
            };
            match w.get(i + 1).map(|o| resolve(document, o)) {
                Some(Object::Array(list)) => {
                    for (code, width) in (start..=u32::MAX).zip(numbers(document, list)) {
                        self.widths.insert(code, width);
                    }
                    i += 2;
                }
                Some(last) => {
                    let last = as_number(last)
                        .map(|n| n as u32)
                        .unwrap_or(start)
                        .min(start.saturating_add(MAX_CODE_RANGE));
                    let width = w
                        .get(i + 2)
                        .and_then(|o| as_number(resolve(document, o)))
                        .unwrap_or(self.default_width);
                    for code in start..=last {
                        self.widths.insert(code, width);
                    }
                    i += 3;
                }
                None => break,
            }
        }
    }

    /// Split raw string bytes into character codes.
    pub fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.two_byte {
            bytes
                .chunks(2)
                .map(|pair| pair.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32))
                .collect()
        } else {
            bytes.iter().map(|b| *b as u32).collect()
        }
    }

    pub fn decode_code(&self, code: u32) -> String {
        if let Some(text) = self.to_unicode.get(&code) {
            return text.clone();
        }
        char::from_u32(code)
            .filter(|c| !c.is_control())
            .map(String::from)
            .unwrap_or_default()
    }

    /// Glyph advance in 1/1000 text-space units.
    pub fn width(&self, code: u32) -> f32 {
        self.widths.get(&code).copied().unwrap_or(self.default_width)
    }
}

/// Fonts of a resources dictionary, keyed by resource name.
pub fn load_fonts(document: &Document, resources: Option<&Dictionary>) -> HashMap<Vec<u8>, FontInfo> {
    let mut fonts = HashMap::new();
    let Some(font_dict) = resources.and_then(|r| get_dict(document, r, b"Font")) else {
        return fonts;
    };
    for (name, obj) in font_dict.iter() {
        if let Object::Dictionary(font) = resolve(document, obj) {
            fonts.insert(name.clone(), FontInfo::from_dict(document, font));
        }
    }
    fonts
}

/// Decode bytes shown without a known font: UTF-16BE with BOM, else Latin-1.
pub fn decode_plain(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks(2)
            .filter(|c| c.len() == 2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|b| *b as char).collect()
}

// ToUnicode CMap parsing (bfchar / bfrange sections only)

#[derive(Debug, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    Keyword(String),
}

fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        match b {
            b'<' if data.get(i + 1) != Some(&b'<') => {
                let end = data[i + 1..]
                    .iter()
                    .position(|c| *c == b'>')
                    .map(|p| i + 1 + p)
                    .unwrap_or(data.len());
                let hex: Vec<u8> = data[i + 1..end]
                    .iter()
                    .copied()
                    .filter(|c| c.is_ascii_hexdigit())
                    .collect();
                tokens.push(Token::Hex(hex_bytes(&hex)));
                i = end + 1;
            }
            b'<' | b'>' => i += if data.get(i + 1) == Some(&b) { 2 } else { 1 },
            b'[' => {
                tokens.push(Token::ArrayStart);
                i += 1;
            }
            b']' => {
                tokens.push(Token::ArrayEnd);
                i += 1;
            }
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < data.len() && data[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                tokens.push(Token::Keyword(String::from_utf8_lossy(&data[start..i]).into_owned()));
            }
            _ => i += 1,
        }
    }
    tokens
}

fn hex_bytes(hex: &[u8]) -> Vec<u8> {
    let digit = |c: u8| (c as char).to_digit(16).unwrap_or(0) as u8;
    hex.chunks(2)
        .map(|pair| {
            let hi = digit(pair[0]);
            let lo = pair.get(1).map(|c| digit(*c)).unwrap_or(0);
            (hi << 4) | lo
        })
        .collect()
}

fn code_of(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

fn utf16_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|c| if c.len() == 2 { u16::from_be_bytes([c[0], c[1]]) } else { c[0] as u16 })
        .collect();
    String::from_utf16_lossy(&units)
}

/// Offset the last UTF-16 unit of a bfrange destination.
fn offset_text(bytes: &[u8], offset: u32) -> String {
    let mut units: Vec<u16> = bytes
        .chunks(2)
        .map(|c| if c.len() == 2 { u16::from_be_bytes([c[0], c[1]]) } else { c[0] as u16 })
        .collect();
    if let Some(last) = units.last_mut() {
        *last = last.wrapping_add(offset as u16);
    }
    String::from_utf16_lossy(&units)
}

pub fn parse_to_unicode(data: &[u8]) -> HashMap<u32, String> {
    let tokens = tokenize(data);
    let mut map = HashMap::new();
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Keyword(k) if k == "beginbfchar" => {
                i += 1;
                while i + 1 < tokens.len() {
                    match (&tokens[i], &tokens[i + 1]) {
                        (Token::Hex(src), Token::Hex(dst)) => {
                            map.insert(code_of(src), utf16_text(dst));
                            i += 2;
                        }
                        _ => break,
                    }
                }
            }
            Token::Keyword(k) if k == "beginbfrange" => {
                i += 1;
                while i + 2 < tokens.len() {
                    let (Token::Hex(lo), Token::Hex(hi)) = (&tokens[i], &tokens[i + 1]) else {
                        break;
                    };
                    let (lo, hi) = (code_of(lo), code_of(hi));
                    match &tokens[i + 2] {
                        Token::Hex(dst) => {
                            for code in lo..=hi.min(lo.saturating_add(MAX_CODE_RANGE)) {
                                map.insert(code, offset_text(dst, code - lo));
                            }
                            i += 3;
                        }
                        Token::ArrayStart => {
                            let mut j = i + 3;
                            let mut code = lo;
                            while let Some(Token::Hex(dst)) = tokens.get(j) {
                                if code <= hi {
                                    map.insert(code, utf16_text(dst));
                                }
                                code = code.saturating_add(1);
                                j += 1;
                            }
                            // skip the closing bracket
                            i = j + 1;
                        }
                        _ => break,
                    }
                }
            }
            _ => i += 1,
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    const CMAP: &[u8] = b"/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
2 beginbfchar
<0003> <0020>
<0011> <004B>
endbfchar
2 beginbfrange
<0014> <0016> <0030>
<0020> <0021> [<0041> <0042>]
endbfrange
endcmap";

    #[test]
    fn bfchar_and_bfrange_entries_are_mapped() {
        let map = parse_to_unicode(CMAP);
        assert_eq!(map.get(&0x03).map(String::as_str), Some(" "));
        assert_eq!(map.get(&0x11).map(String::as_str), Some("K"));
        assert_eq!(map.get(&0x14).map(String::as_str), Some("0"));
        assert_eq!(map.get(&0x16).map(String::as_str), Some("2"));
        assert_eq!(map.get(&0x21).map(String::as_str), Some("B"));
        assert_eq!(map.len(), 7);
    }

    #[test]
    fn two_byte_fonts_decode_through_the_cmap() {
        let info = FontInfo {
            two_byte: true,
            to_unicode: parse_to_unicode(CMAP),
            ..Default::default()
        };
        let text: String = info
            .codes(&[0x00, 0x11, 0x00, 0x14, 0x00, 0x16])
            .into_iter()
            .map(|c| info.decode_code(c))
            .collect();
        assert_eq!(text, "K02");
    }

    #[test]
    fn plain_strings_handle_utf16_bom() {
        assert_eq!(decode_plain(&[0xFE, 0xFF, 0x00, 0x4B, 0x00, 0x31]), "K1");
        assert_eq!(decode_plain(b"CODE"), "CODE");
    }

    fn cid_font(doc: &mut Document, w: Vec<Object>) -> Dictionary {
        use lopdf::dictionary;
        let descendant = doc.add_object(dictionary! { "Subtype" => "CIDFontType2", "DW" => 1000, "W" => w });
        dictionary! { "Subtype" => "Type0", "DescendantFonts" => vec![descendant.into()] }
    }

    #[test]
    fn cid_widths_mix_lists_and_ranges() {
        let mut doc = Document::with_version("1.5");
        let font = cid_font(&mut doc, vec![3.into(), Object::Array(vec![250.into(), 300.into()]), 10.into(), 12.into(), 600.into()]);
        let info = FontInfo::from_dict(&doc, &font);

        assert!(info.two_byte);
        assert_eq!(info.width(3), 250.0);
        assert_eq!(info.width(4), 300.0);
        assert_eq!(info.width(11), 600.0);
        assert_eq!(info.width(13), 1000.0);
    }

    #[test]
    fn oversized_cid_widths_are_clamped() {
        let mut doc = Document::with_version("1.5");
        let font = cid_font(
            &mut doc,
            vec![
                4_294_967_295i64.into(),
                Object::Array(vec![500.into(), 500.into()]),
                0.into(),
                4_000_000_000i64.into(),
                500.into(),
            ],
        );
        let info = FontInfo::from_dict(&doc, &font);

        assert_eq!(info.width(u32::MAX), 500.0);
        assert!(info.widths.len() <= MAX_CODE_RANGE as usize + 2);
    }

    #[test]
    fn ranges_at_the_top_of_the_code_space_do_not_overflow() {
        let map = parse_to_unicode(
            b"2 beginbfrange
<FFFFFFF0> <FFFFFFFF> <0041>
<FFFFFFFE> <FFFFFFFF> [<0042> <0043> <0044>]
endbfrange",
        );
        assert_eq!(map.get(&0xFFFF_FFF0).map(String::as_str), Some("A"));
        assert!(map.len() <= 16);
    }
}

