// End-to-end: pricebook PDF -> SKU map -> images -> workbook
mod common;

use common::{image_count, pricebook, pricebook_pages, product, write_pricebook, write_workbook, Line};
use pricebook_imager::automation::{self, FillOptions};
use pricebook_imager::pdf_extraction::{ImageExtractor, PricebookParser};
use pricebook_imager::sku_report;
use pricebook_imager::{Config, PricebookError};
use rstest::rstest;

const RED: [u8; 3] = [200, 30, 30];
const GREEN: [u8; 3] = [30, 200, 30];
const BLUE: [u8; 3] = [30, 30, 200];

#[test]
fn table_rows_are_matched_to_images_in_order() {
    let doc = pricebook(&[
        product("K-1001IN-CP", "Basin mixer", "12,500", Some(RED)),
        product("K-1002IN-CP", "Shower head", "8,000", Some(GREEN)),
        product("K-1003IN-BN", "Spout", "4,250", Some(BLUE)),
    ]);

    let skus = PricebookParser::new("pricebook.pdf", Config::default())
        .parse_document(&doc)
        .unwrap();

    assert_eq!(skus.len(), 3);
    let shower = &skus["1002INCP"];
    assert_eq!(shower.sku, "K-1002IN-CP");
    assert_eq!(shower.description, "Shower head");
    assert_eq!(shower.mrp, "8,000");
    assert_eq!(shower.page, 1);
    assert_eq!(shower.row_index, Some(2));
    assert_eq!(shower.image.as_ref().unwrap().name, "Im1");
    assert_eq!(skus["1003INBN"].image.as_ref().unwrap().name, "Im2");
}

#[rstest]
#[case("75890INPCPK75890INMCP", &["75890INPCP", "75890INMCP"])]
#[case("K-20746IN-CP", &["20746INCP"])]
#[case("1234-AB", &["1234AB"])]
fn code_cells_yield_every_sku(#[case] code: &'static str, #[case] expected: &[&str]) {
    let doc = pricebook(&[product(code, "Fitting", "1,000", Some(RED))]);
    let skus = PricebookParser::new("pricebook.pdf", Config::default())
        .parse_document(&doc)
        .unwrap();

    let keys: Vec<&str> = skus.keys().map(|k| k.as_str()).collect();
    let mut expected = expected.to_vec();
    expected.sort();
    assert_eq!(keys, expected);
    assert!(skus.values().all(|e| e.has_image()));
}

#[test]
fn reference_rows_are_dropped_when_enabled() {
    let doc = pricebook(&[
        product("K-1001IN-CP", "Basin mixer", "12,500", Some(RED)),
        product("K-9999IN", "Must order with K-1001IN-CP", "", None),
    ]);
    let config = Config {
        skip_reference_rows: true,
        ..Config::default()
    };
    let skus = PricebookParser::new("pricebook.pdf", config)
        .parse_document(&doc)
        .unwrap();

    assert_eq!(skus.len(), 1);
    assert!(skus.contains_key("1001INCP"));
}

#[test]
fn later_pages_keep_earlier_images() {
    let doc = pricebook_pages(&[
        &[product("K-1001IN-CP", "Basin mixer", "12,500", Some(RED))],
        &[product("K-1001IN-CP", "Basin mixer (new price)", "13,000", None)],
    ]);
    let skus = PricebookParser::new("pricebook.pdf", Config::default())
        .parse_document(&doc)
        .unwrap();

    let entry = &skus["1001INCP"];
    assert_eq!(entry.mrp, "13,000");
    assert_eq!(entry.page, 2);
    assert_eq!(entry.image.as_ref().unwrap().page, 1);
}

#[test]
fn extracted_images_are_sized_pngs() {
    let doc = pricebook(&[
        product("K-1001IN-CP", "Basin mixer", "12,500", Some(RED)),
        product("K-1002IN-CP", "Shower head", "8,000", Some(GREEN)),
    ]);
    let config = Config {
        image_target_size: (64, 48),
        ..Config::default()
    };
    let skus = PricebookParser::new("pricebook.pdf", config.clone())
        .parse_document(&doc)
        .unwrap();

    let mut extractor = ImageExtractor::new(&config).unwrap();
    let paths = extractor.extract_images(&doc, &skus).unwrap();
    assert_eq!(paths.len(), 2);

    let png = image::open(&paths["1001INCP"]).unwrap().to_rgb8();
    assert_eq!(png.dimensions(), (64, 48));
    // 8x8 source is padded, not stretched
    assert_eq!(png.get_pixel(32, 24).0, RED);
    assert_eq!(png.get_pixel(1, 1).0, [255, 255, 255]);
}

#[test]
fn fill_images_inserts_matching_pictures() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = write_pricebook(
        dir.path(),
        &[
            product("K-1001IN-CP", "Basin mixer", "12,500", Some(RED)),
            product("K-1002IN-CP", "Shower head", "8,000", Some(GREEN)),
            product("K-1003IN-BN", "Spout", "4,250", Some(BLUE)),
        ],
    );

    let bath: &[Line] = &[
        ("K-1001IN-CP", 1.0, 12500.0, 11000.0),
        ("1003IN-BN", 2.0, 4250.0, 4000.0),
        ("K-7777IN", 1.0, 100.0, 90.0),
    ];
    let kitchen: &[Line] = &[("k-1002in-cp", 1.0, 8000.0, 7000.0)];
    let excel = dir.path().join("quote.xlsx");
    write_workbook(&excel, &[("Bathroom", bath), ("Kitchen", kitchen)]);

    let output = dir.path().join("quote_filled.xlsx");
    let exports = dir.path().join("exports");
    let options = FillOptions {
        output: Some(output.clone()),
        keep_images: false,
        export_dir: Some(exports.clone()),
    };
    let report = automation::fill_images_from_pdf(&excel, &pdf, &Config::default(), &options).unwrap();

    assert_eq!(report.pdf_skus, 3);
    assert_eq!(report.images_extracted, 3);
    assert_eq!(report.excel_skus, 4);
    assert_eq!(report.images_inserted, 3);
    assert_eq!(report.saved_to, output);
    assert!(report.image_dir.is_none());

    assert_eq!(image_count(&output, "Bathroom"), 2);
    assert_eq!(image_count(&output, "Kitchen"), 1);
    assert_eq!(image_count(&excel, "Bathroom"), 0);

    let (pdf_export, excel_export) = report.exports.unwrap();
    let comparison = sku_report::compare(&pdf_export, &excel_export).unwrap();
    assert_eq!(comparison.missing_in_pdf, vec!["7777IN"]);
    assert!(comparison.extra_in_pdf.is_empty());
}

#[test]
fn clear_images_removes_inserted_pictures() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = write_pricebook(dir.path(), &[product("K-1001IN-CP", "Basin mixer", "12,500", Some(RED))]);
    let excel = dir.path().join("quote.xlsx");
    write_workbook(&excel, &[("Bathroom", &[("K-1001IN-CP", 1.0, 12500.0, 11000.0)])]);

    automation::fill_images_from_pdf(&excel, &pdf, &Config::default(), &FillOptions::default()).unwrap();
    assert_eq!(image_count(&excel, "Bathroom"), 1);

    let (_, removed) = automation::clear_images(&excel, None, &Config::default()).unwrap();
    assert_eq!(removed, 1);
    assert_eq!(image_count(&excel, "Bathroom"), 0);
}

#[test]
fn pricebook_without_codes_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = write_pricebook(dir.path(), &[]);
    let excel = dir.path().join("quote.xlsx");
    write_workbook(&excel, &[("Bathroom", &[("K-1001IN-CP", 1.0, 1.0, 1.0)])]);

    let err = automation::fill_images_from_pdf(&excel, &pdf, &Config::default(), &FillOptions::default()).unwrap_err();
    assert!(matches!(err, PricebookError::NoSkus));
}

#[test]
fn pricebook_without_images_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = write_pricebook(dir.path(), &[product("K-1001IN-CP", "Basin mixer", "12,500", None)]);
    let excel = dir.path().join("quote.xlsx");
    write_workbook(&excel, &[("Bathroom", &[("K-1001IN-CP", 1.0, 1.0, 1.0)])]);

    let err = automation::fill_images_from_pdf(&excel, &pdf, &Config::default(), &FillOptions::default()).unwrap_err();
    assert!(matches!(err, PricebookError::NoImages));
}
