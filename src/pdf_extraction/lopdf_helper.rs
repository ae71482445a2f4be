// lopdf helper - Pure Rust PDF operations
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::path::Path;

use crate::types::Result;

/// Load a PDF document using lopdf
pub fn load_pdf(path: &Path) -> Result<Document> {
    Ok(Document::load(path)?)
}

/// Follow a reference chain to the underlying object.
pub fn resolve<'a>(document: &'a Document, obj: &'a Object) -> &'a Object {
    let mut current = obj;
    // bounded to survive reference cycles
    for _ in 0..16 {
        match current {
            Object::Reference(id) => match document.get_object(*id) {
                Ok(next) => current = next,
                Err(_) => return current,
            },
            _ => return current,
        }
    }
    current
}

pub fn get_resolved<'a>(document: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    dict.get(key).ok().map(|obj| resolve(document, obj))
}

pub fn get_dict<'a>(document: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Dictionary> {
    match get_resolved(document, dict, key)? {
        Object::Dictionary(d) => Some(d),
        Object::Stream(s) => Some(&s.dict),
        _ => None,
    }
}

pub fn get_array<'a>(document: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Vec<Object>> {
    match get_resolved(document, dict, key)? {
        Object::Array(arr) => Some(arr),
        _ => None,
    }
}

pub fn get_name<'a>(document: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a [u8]> {
    match get_resolved(document, dict, key)? {
        Object::Name(name) => Some(name.as_slice()),
        _ => None,
    }
}

// Helper to get numeric value from dictionary
pub fn get_number(document: &Document, dict: &Dictionary, key: &[u8]) -> Option<f32> {
    as_number(get_resolved(document, dict, key)?)
}

pub fn as_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(f) => Some(*f as f32),
        _ => None,
    }
}

pub fn numbers(document: &Document, arr: &[Object]) -> Vec<f32> {
    arr.iter()
        .filter_map(|obj| as_number(resolve(document, obj)))
        .collect()
}

/// Look up a page attribute, walking up the page tree for inherited keys.
pub fn inherited<'a>(document: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut current = page;
    for _ in 0..32 {
        if let Some(obj) = get_resolved(document, current, key) {
            return Some(obj);
        }
        current = get_dict(document, current, b"Parent")?;
    }
    None
}

/// Page resources dictionary (possibly inherited).
pub fn page_resources<'a>(document: &'a Document, page_id: ObjectId) -> Option<&'a Dictionary> {
    let page = document.get_dictionary(page_id).ok()?;
    match inherited(document, page, b"Resources")? {
        Object::Dictionary(d) => Some(d),
        _ => None,
    }
}

/// Page MediaBox as `(x0, y0, x1, y1)`; US Letter when missing or malformed.
pub fn media_box(document: &Document, page_id: ObjectId) -> (f32, f32, f32, f32) {
    let letter = (0.0, 0.0, 612.0, 792.0);
    let Ok(page) = document.get_dictionary(page_id) else {
        return letter;
    };
    match inherited(document, page, b"MediaBox") {
        Some(Object::Array(arr)) => {
            let bounds = numbers(document, arr);
            if bounds.len() == 4 {
                (
                    bounds[0].min(bounds[2]),
                    bounds[1].min(bounds[3]),
                    bounds[0].max(bounds[2]),
                    bounds[1].max(bounds[3]),
                )
            } else {
                letter
            }
        }
        _ => letter,
    }
}

/// Stream bytes with filters removed; unfiltered streams are returned as-is.
pub fn stream_data(stream: &Stream) -> Result<Vec<u8>> {
    if stream.dict.get(b"Filter").is_ok() {
        Ok(stream.decompressed_content()?)
    } else {
        Ok(stream.content.clone())
    }
}

/// Filter names of a stream, outermost first.
pub fn stream_filters<'a>(document: &'a Document, stream: &'a Stream) -> Vec<&'a [u8]> {
    match get_resolved(document, &stream.dict, b"Filter") {
        Some(Object::Name(name)) => vec![name.as_slice()],
        Some(Object::Array(arr)) => arr
            .iter()
            .filter_map(|obj| match resolve(document, obj) {
                Object::Name(name) => Some(name.as_slice()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn media_box_is_inherited_from_parent() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );

        assert_eq!(media_box(&doc, page_id), (0.0, 0.0, 595.0, 842.0));
    }

    #[test]
    fn missing_media_box_defaults_to_letter() {
        let mut doc = Document::with_version("1.5");
        let page_id = doc.add_object(dictionary! { "Type" => "Page" });
        assert_eq!(media_box(&doc, page_id), (0.0, 0.0, 612.0, 792.0));
    }

    #[test]
    fn references_are_followed() {
        let mut doc = Document::with_version("1.5");
        let id = doc.add_object(Object::Integer(42));
        let reference = Object::Reference(id);
        assert_eq!(as_number(resolve(&doc, &reference)), Some(42.0));
    }
}
