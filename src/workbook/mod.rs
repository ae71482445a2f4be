// Workbook handling: SKU scanning and image insertion over umya-spreadsheet
pub mod summary;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use umya_spreadsheet::helper::coordinate::string_from_column_index;
use umya_spreadsheet::structs::drawing::spreadsheet::MarkerType;
use umya_spreadsheet::structs::{Image, Spreadsheet, Worksheet};

use crate::config::{Config, EMU_PER_PIXEL, HEADER_SCAN_ROWS, POINTS_PER_PIXEL};
use crate::sku::{header_matches, normalize_sku};
use crate::types::{PricebookError, Result};

pub use summary::{SheetTotals, SummaryBuilder};

// Cells holding exactly these are totals, not products
const TOTAL_MARKERS: [&str; 3] = ["TOTAL", "SUBTOTAL", "GRAND TOTAL"];

/// A product code found in a workbook sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct ExcelSku {
    pub sheet: String,
    /// 1-based row
    pub row: u32,
    pub sku: String,
    pub normalized: String,
}

/// Plain-text snapshot of a worksheet; `cell(col, row)` is 1-based like Excel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetGrid {
    pub name: String,
    rows: Vec<Vec<String>>,
}

impl SheetGrid {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn from_worksheet(sheet: &Worksheet) -> Self {
        let (max_col, max_row) = sheet.get_highest_column_and_row();
        let rows = (1..=max_row)
            .map(|row| (1..=max_col).map(|col| sheet.get_value((col, row))).collect())
            .collect();
        Self::new(sheet.get_name(), rows)
    }

    pub fn row_count(&self) -> u32 {
        self.rows.len() as u32
    }

    pub fn cell(&self, col: u32, row: u32) -> &str {
        if col == 0 || row == 0 {
            return "";
        }
        self.rows
            .get(row as usize - 1)
            .and_then(|r| r.get(col as usize - 1))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    pub fn row(&self, row: u32) -> &[String] {
        if row == 0 {
            return &[];
        }
        self.rows.get(row as usize - 1).map(|r| r.as_slice()).unwrap_or(&[])
    }

    /// First `(col, row)` within the header scan window whose text names a column.
    pub fn find_header<S: AsRef<str>>(&self, names: &[S]) -> Option<(u32, u32)> {
        for row in 1..=self.row_count().min(HEADER_SCAN_ROWS) {
            for (idx, text) in self.row(row).iter().enumerate() {
                if header_matches(text, names) {
                    return Some((idx as u32 + 1, row));
                }
            }
        }
        None
    }

    /// Codes below the code header, skipping short values and total rows.
    pub fn scan_skus<S: AsRef<str>>(&self, code_names: &[S]) -> Vec<ExcelSku> {
        let Some((col, header_row)) = self.find_header(code_names) else {
            return Vec::new();
        };

        ((header_row + 1)..=self.row_count())
            .filter_map(|row| {
                let value = self.cell(col, row).trim();
                if value.chars().count() < 3 {
                    return None;
                }
                let upper = value.to_uppercase();
                if TOTAL_MARKERS.contains(&upper.as_str()) {
                    return None;
                }
                Some(ExcelSku {
                    sheet: self.name.clone(),
                    row,
                    sku: value.to_string(),
                    normalized: normalize_sku(value),
                })
            })
            .collect()
    }

    /// First row containing any of `keywords` in any cell (case-insensitive).
    pub fn find_row_containing<S: AsRef<str>>(&self, keywords: &[S]) -> Option<u32> {
        (1..=self.row_count()).find(|row| self.row(*row).iter().any(|text| header_matches(text, keywords)))
    }
}

/// Cell text as a number; currency symbols and thousands separators are ignored.
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '₹' | '$' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// An open workbook plus the settings driving it.
pub struct ExcelHandler {
    path: PathBuf,
    book: Spreadsheet,
    config: Config,
}

impl ExcelHandler {
    pub fn open(path: &Path, config: &Config) -> Result<Self> {
        if !path.exists() {
            return Err(PricebookError::MissingFile(path.to_path_buf()));
        }
        info!("Opening workbook: {}", path.display());
        let book = umya_spreadsheet::reader::xlsx::read(path)
            .map_err(|e| PricebookError::Workbook(format!("{}: {}", path.display(), e)))?;
        Ok(Self::from_book(path, book, config))
    }

    pub fn from_book(path: &Path, book: Spreadsheet, config: &Config) -> Self {
        Self {
            path: path.to_path_buf(),
            book,
            config: config.clone(),
        }
    }

    pub fn book_mut(&mut self) -> &mut Spreadsheet {
        &mut self.book
    }

    /// Save to `output`, or over the opened file when `None`.
    pub fn save(&self, output: Option<&Path>) -> Result<PathBuf> {
        let target = output.unwrap_or(&self.path).to_path_buf();
        umya_spreadsheet::writer::xlsx::write(&self.book, &target)
            .map_err(|e| PricebookError::Workbook(format!("{}: {}", target.display(), e)))?;
        info!("Saved workbook: {}", target.display());
        Ok(target)
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.book
            .get_sheet_collection()
            .iter()
            .map(|s| s.get_name().to_string())
            .collect()
    }

    /// Every sheet that is not a summary sheet.
    pub fn data_sheets(&self) -> Vec<String> {
        self.sheet_names()
            .into_iter()
            .filter(|name| !self.config.is_summary_sheet(name))
            .collect()
    }

    pub fn grid(&self, sheet_name: &str) -> Result<SheetGrid> {
        self.book
            .get_sheet_by_name(sheet_name)
            .map(SheetGrid::from_worksheet)
            .ok_or_else(|| PricebookError::SheetNotFound(sheet_name.to_string()))
    }

    /// Product codes of every data sheet.
    pub fn scan_skus(&self) -> Result<Vec<ExcelSku>> {
        let mut found = Vec::new();
        for name in self.data_sheets() {
            let grid = self.grid(&name)?;
            let skus = grid.scan_skus(&self.config.code_column_names);
            if skus.is_empty() {
                debug!("Sheet '{}': no code column or no codes", name);
            } else {
                info!("Sheet '{}': {} SKUs", name, skus.len());
            }
            found.extend(skus);
        }
        Ok(found)
    }

    /// Anchor each matched image in the image column of its SKU's row.
    ///
    /// `images` maps normalized SKU to a PNG path. Returns the number of
    /// pictures inserted.
    pub fn insert_images(&mut self, images: &BTreeMap<String, PathBuf>) -> Result<usize> {
        let (offset_x, offset_y) = self.config.image_cell_offset;
        let col_off = i32::try_from(offset_x).unwrap_or(i32::MAX).saturating_mul(EMU_PER_PIXEL);
        let row_off = i32::try_from(offset_y).unwrap_or(i32::MAX).saturating_mul(EMU_PER_PIXEL);
        let row_height = self.config.image_target_size.1 as f64 * POINTS_PER_PIXEL;
        let mut inserted = 0;
        let mut unmatched: Vec<String> = Vec::new();

        for name in self.data_sheets() {
            let grid = self.grid(&name)?;
            let Some((image_col, _)) = grid.find_header(&self.config.image_column_names) else {
                warn!("Sheet '{}': no image column, skipping", name);
                continue;
            };
            let skus = grid.scan_skus(&self.config.code_column_names);

            let sheet = self
                .book
                .get_sheet_by_name_mut(&name)
                .ok_or_else(|| PricebookError::SheetNotFound(name.clone()))?;

            for sku in skus {
                let Some(path) = images.get(&sku.normalized) else {
                    unmatched.push(sku.sku);
                    continue;
                };

                let mut marker = MarkerType::default();
                marker.set_coordinate(format!("{}{}", string_from_column_index(&image_col), sku.row));
                marker.set_col_off(col_off);
                marker.set_row_off(row_off);

                let mut image = Image::default();
                image.new_image(&path.to_string_lossy(), marker);
                sheet.add_image(image);
                sheet.get_row_dimension_mut(&sku.row).set_height(row_height);

                debug!("{}!{}: {}", name, sku.row, sku.sku);
                inserted += 1;
            }
        }

        if !unmatched.is_empty() {
            info!("{} SKUs without a matching image", unmatched.len());
            debug!("Unmatched SKUs: {:?}", unmatched);
        }
        info!("Inserted {} images", inserted);
        Ok(inserted)
    }

    /// Remove every picture from every sheet; returns how many were removed.
    pub fn clear_images(&mut self) -> usize {
        let mut removed = 0;
        for sheet in self.book.get_sheet_collection_mut() {
            let name = sheet.get_name().to_string();
            let images = sheet.get_image_collection_mut();
            if !images.is_empty() {
                debug!("Sheet '{}': removing {} images", name, images.len());
            }
            removed += images.len();
            images.clear();
        }
        info!("Removed {} images", removed);
        removed
    }
}
