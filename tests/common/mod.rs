// Shared fixtures: an in-memory pricebook PDF and a quotation workbook
#![allow(dead_code)]

use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::path::{Path, PathBuf};

pub const PAGE_WIDTH: i64 = 600;
pub const PAGE_HEIGHT: i64 = 800;
const HEADER_BASELINE: f32 = 700.0;
const FIRST_ROW_BASELINE: f32 = 620.0;
const ROW_PITCH: f32 = 100.0;

/// One pricebook row; `color` adds an 8x8 product image next to it.
#[derive(Debug, Clone)]
pub struct Product {
    pub code: &'static str,
    pub description: &'static str,
    pub mrp: &'static str,
    pub color: Option<[u8; 3]>,
}

pub fn product(code: &'static str, description: &'static str, mrp: &'static str, color: Option<[u8; 3]>) -> Product {
    Product {
        code,
        description,
        mrp,
        color,
    }
}

fn text(x: f32, y: f32, value: &str) -> String {
    format!("BT /F1 10 Tf {} {} Td ({}) Tj ET\n", x, y, value)
}

fn add_image(doc: &mut Document, color: [u8; 3]) -> ObjectId {
    let pixels: Vec<u8> = std::iter::repeat(color).take(64).flatten().collect();
    doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 8,
            "Height" => 8,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        pixels,
    ))
}

/// A single-page pricebook with a CODE / DESCRIPTION / MRP table.
pub fn pricebook(products: &[Product]) -> Document {
    pricebook_pages(&[products])
}

/// One table per page.
pub fn pricebook_pages(pages: &[&[Product]]) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids: Vec<Object> = Vec::new();
    for products in pages {
        let mut content = String::new();
        content.push_str(&text(50.0, HEADER_BASELINE, "CODE"));
        content.push_str(&text(200.0, HEADER_BASELINE, "DESCRIPTION"));
        content.push_str(&text(400.0, HEADER_BASELINE, "MRP"));

        let mut xobjects = lopdf::Dictionary::new();
        for (idx, item) in products.iter().enumerate() {
            let baseline = FIRST_ROW_BASELINE - idx as f32 * ROW_PITCH;
            content.push_str(&text(40.0, baseline, item.code));
            content.push_str(&text(200.0, baseline, item.description));
            content.push_str(&text(400.0, baseline, item.mrp));

            if let Some(color) = item.color {
                let name = format!("Im{}", idx);
                let image_id = add_image(&mut doc, color);
                xobjects.set(name.as_bytes().to_vec(), image_id);
                content.push_str(&format!("q 60 0 0 60 480 {} cm /{} Do Q\n", baseline - 25.0, name));
            }
        }

        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => xobjects,
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

pub fn write_pricebook(dir: &Path, products: &[Product]) -> PathBuf {
    let path = dir.join("pricebook.pdf");
    let mut doc = pricebook(products);
    doc.save(&path).unwrap();
    path
}

/// Quotation line: code, quantity, MRP, offer price.
pub type Line = (&'static str, f64, f64, f64);

/// Add a quotation sheet laid out like the vendor template: title rows,
/// header on row 3, items from row 4, then a TOTAL VALUE row.
pub fn add_quotation_sheet(book: &mut umya_spreadsheet::Spreadsheet, name: &str, lines: &[Line], cached_totals: bool) {
    let sheet = book.new_sheet(name).unwrap();
    sheet.get_cell_mut((1, 1)).set_value("QUOTATION");

    let headers = ["Sr", "Code", "Description", "Image", "Qty", "MRP", "Amount", "Offer", "Offer Amount"];
    for (idx, header) in headers.iter().enumerate() {
        sheet.get_cell_mut((idx as u32 + 1, 3)).set_value(*header);
    }

    let mut mrp_total = 0.0;
    let mut offer_total = 0.0;
    for (idx, (code, qty, mrp, offer)) in lines.iter().enumerate() {
        let row = idx as u32 + 4;
        sheet.get_cell_mut((1, row)).set_value_number((idx + 1) as f64);
        sheet.get_cell_mut((2, row)).set_value(*code);
        sheet.get_cell_mut((5, row)).set_value_number(*qty);
        sheet.get_cell_mut((6, row)).set_value_number(*mrp);
        sheet.get_cell_mut((8, row)).set_value_number(*offer);
        mrp_total += qty * mrp;
        offer_total += qty * offer;
    }

    let total_row = lines.len() as u32 + 4;
    sheet.get_cell_mut((3, total_row)).set_value("TOTAL VALUE");
    if cached_totals {
        sheet.get_cell_mut((7, total_row)).set_value_number(mrp_total);
        sheet.get_cell_mut((9, total_row)).set_value_number(offer_total);
    }
}

pub fn write_workbook(path: &Path, sheets: &[(&str, &[Line])]) {
    let mut book = umya_spreadsheet::new_file();
    for (name, lines) in sheets {
        add_quotation_sheet(&mut book, name, lines, true);
    }
    umya_spreadsheet::writer::xlsx::write(&book, path).unwrap();
}

pub fn image_count(path: &Path, sheet: &str) -> usize {
    let book = umya_spreadsheet::reader::xlsx::read(path).unwrap();
    book.get_sheet_by_name(sheet)
        .map(|s| s.get_image_collection().len())
        .unwrap_or(0)
}
