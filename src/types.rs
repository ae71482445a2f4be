// Core types and error definitions for pricebook-imager
use lopdf::ObjectId;
use serde::Serialize;
use std::collections::BTreeMap;

/// Rectangle on a PDF page in points, top-left origin (`top < bottom`).
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize)]
pub struct BBox {
    pub x0: f32,
    pub top: f32,
    pub x1: f32,
    pub bottom: f32,
}

impl BBox {
    pub const fn new(x0: f32, top: f32, x1: f32, bottom: f32) -> Self {
        Self { x0, top, x1, bottom }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn center_y(&self) -> f32 {
        (self.top + self.bottom) / 2.0
    }

    /// Vertical distance from `y` to this box; zero when `y` falls inside it.
    pub fn vertical_distance(&self, y: f32) -> f32 {
        if y < self.top {
            self.top - y
        } else if y > self.bottom {
            y - self.bottom
        } else {
            0.0
        }
    }
}

/// An image placement found on a pricebook page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRef {
    pub page: u32,
    pub name: String,
    /// Indirect object holding the image stream, when it has one.
    pub object_id: Option<ObjectId>,
    pub bbox: BBox,
}

/// One SKU found in the pricebook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkuEntry {
    pub sku: String,
    pub normalized: String,
    pub description: String,
    pub mrp: String,
    pub page: u32,
    pub row_index: Option<usize>,
    pub image: Option<ImageRef>,
}

impl SkuEntry {
    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

/// Result of parsing a pricebook, keyed by normalized SKU.
pub type SkuMap = BTreeMap<String, SkuEntry>;

// Error types
#[derive(Debug, thiserror::Error)]
pub enum PricebookError {
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unsupported image: {0}")]
    UnsupportedImage(String),

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Export error: {0}")]
    Export(#[from] csv::Error),

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("File not found: {0}")]
    MissingFile(std::path::PathBuf),

    #[error("No SKUs found in PDF")]
    NoSkus,

    #[error("No images extracted from PDF")]
    NoImages,
}

pub type Result<T> = std::result::Result<T, PricebookError>;
