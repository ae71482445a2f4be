// Configuration for pricebook-imager
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{PricebookError, Result};

// Header cells are only searched in the first rows of a sheet
pub const HEADER_SCAN_ROWS: u32 = 20;

// Excel row heights are in points, images in pixels
pub const POINTS_PER_PIXEL: f64 = 0.75;

// Drawing offsets are stored in EMU
pub const EMU_PER_PIXEL: i32 = 9525;

pub const IMAGE_FORMAT_EXTENSION: &str = "png";

pub const CONFIG_ENV_VAR: &str = "PRICEBOOK_CONFIG";

/// Every tunable of the matching pipeline. All keys are optional in TOML.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    // Column names to look for (substring match, case-insensitive)
    pub code_column_names: Vec<String>,
    pub desc_column_names: Vec<String>,
    pub price_column_names: Vec<String>,
    pub image_column_names: Vec<String>,

    // Summary sheet identification
    pub summary_sheet_names: Vec<String>,
    pub total_value_keywords: Vec<String>,

    /// Grey reference rows in the pricebook (accessories, notes, ...)
    pub skip_keywords: Vec<String>,
    /// Drop table rows whose text contains a skip keyword. Off by default:
    /// the whole row is searched, so a product described as "waste included"
    /// would be dropped along with the real reference rows.
    pub skip_reference_rows: bool,

    pub image_target_size: (u32, u32),
    pub temp_image_dir: Option<PathBuf>,
    pub image_cell_offset: (u32, u32),

    pub layout: LayoutConfig,
    pub summary: SummaryColumns,
}

/// Tolerances used when rebuilding tables from positioned text.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Runs whose vertical centers differ by less than this share a line
    pub line_tolerance: f32,
    /// Horizontal gap that starts a new cell
    pub cell_gap: f32,
    /// Vertical gap that ends a table
    pub table_row_gap: f32,
    /// Images smaller than this in either dimension are decorations
    pub min_image_points: f32,
    /// Match rows to images by their Y position when it is known
    pub use_row_positions: bool,
}

/// Where the summary reads its numbers from (1-based column/row numbers).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SummaryColumns {
    pub mrp_total_column: u32,
    pub offer_total_column: u32,
    pub quantity_column: u32,
    pub mrp_column: u32,
    pub offer_column: u32,
    pub first_data_row: u32,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            code_column_names: names(&["CODE", "SKU", "ITEM CODE", "PRODUCT CODE"]),
            desc_column_names: names(&["DESCRIPTION", "DESC", "PRODUCT", "ITEM"]),
            price_column_names: names(&["MRP", "PRICE", "LIST PRICE", "RATE"]),
            image_column_names: names(&["IMAGE", "PICTURE", "PHOTO", "PRODUCT IMAGE"]),
            summary_sheet_names: names(&["SUMMARY", "Summary", "TOTAL", "Total"]),
            total_value_keywords: names(&["TOTAL VALUE", "GRAND TOTAL", "NET TOTAL", "TOTAL"]),
            skip_keywords: names(&[
                "MUST ORDER",
                "REQUIRED",
                "ACCESSORY",
                "INCLUDED",
                "SEE ALSO",
                "REFERENCE",
                "NOTE:",
                "AVAILABLE IN",
                "SOLD SEPARATELY",
            ]),
            skip_reference_rows: false,
            image_target_size: (100, 100),
            temp_image_dir: None,
            image_cell_offset: (2, 2),
            layout: LayoutConfig::default(),
            summary: SummaryColumns::default(),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            line_tolerance: 3.0,
            cell_gap: 6.0,
            table_row_gap: 150.0,
            min_image_points: 12.0,
            use_row_positions: true,
        }
    }
}

impl Default for SummaryColumns {
    fn default() -> Self {
        Self {
            mrp_total_column: 7,
            offer_total_column: 9,
            quantity_column: 5,
            mrp_column: 6,
            offer_column: 8,
            first_data_row: 4,
        }
    }
}

impl Config {
    /// Load from an explicit TOML file, else from `$PRICEBOOK_CONFIG`, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => env::var_os(CONFIG_ENV_VAR).map(PathBuf::from),
        };

        match path {
            Some(p) => Self::from_file(&p),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| PricebookError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| PricebookError::Config(e.to_string()))
    }

    pub fn is_summary_sheet(&self, sheet_name: &str) -> bool {
        let lower = sheet_name.to_lowercase();
        self.summary_sheet_names
            .iter()
            .any(|name| lower.contains(&name.to_lowercase()))
    }
}
