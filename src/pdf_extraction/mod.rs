// PDF extraction module
pub mod fonts;
pub mod image_extractor;
pub mod lopdf_helper;
pub mod page_layout;
pub mod pricebook_parser;
pub mod table_builder;

pub use image_extractor::ImageExtractor;
pub use lopdf_helper::load_pdf;
pub use page_layout::{page_layout, PageLayout};
pub use pricebook_parser::{parse_pdf, PricebookParser};
