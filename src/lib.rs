// Pricebook imager library - SKU/image matching between vendor PDFs and quotation workbooks
pub mod automation;
pub mod config;
pub mod pdf_extraction;
pub mod sku;
pub mod sku_report;
pub mod types;
pub mod workbook;

pub use config::Config;
pub use types::{BBox, ImageRef, PricebookError, Result, SkuEntry, SkuMap};
