// Summary sheet: per-sheet MRP / offer totals collected into one styled table
use serde::Serialize;
use tracing::{info, warn};
use umya_spreadsheet::structs::{Border, HorizontalAlignmentValues, Spreadsheet, Style, VerticalAlignmentValues, Worksheet};

use super::{parse_amount, SheetGrid};
use crate::config::Config;
use crate::types::{PricebookError, Result};

const DEFAULT_SUMMARY_NAME: &str = "SUMMARY";
const HEADERS: [&str; 4] = ["Sr. No", "Sheet Name", "MRP", "OFFER PRICE"];
const COLUMN_WIDTHS: [(&str, f64); 4] = [("A", 10.0), ("B", 25.0), ("C", 15.0), ("D", 15.0)];
const HEADER_FILL: &str = "FFFFC7CE";
const AMOUNT_FORMAT: &str = "#,##0";

/// Totals of one data sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetTotals {
    pub sheet_name: String,
    pub mrp: f64,
    pub offer: f64,
    /// Row holding the sheet's total label
    pub total_row: u32,
}

/// Result of writing a summary sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryOutcome {
    pub sheet_name: String,
    pub totals: Vec<SheetTotals>,
    pub total_mrp: f64,
    pub total_offer: f64,
}

pub struct SummaryBuilder<'c> {
    config: &'c Config,
}

impl<'c> SummaryBuilder<'c> {
    pub fn new(config: &'c Config) -> Self {
        Self { config }
    }

    /// Collect totals and write the summary sheet.
    ///
    /// Returns `None` (and leaves the workbook alone) when no data sheet has
    /// a total row.
    pub fn build(&self, book: &mut Spreadsheet) -> Result<Option<SummaryOutcome>> {
        info!("Building summary sheet...");
        let totals = self.collect(book);
        if totals.is_empty() {
            warn!("No data found to summarise");
            return Ok(None);
        }

        if totals.iter().all(|t| t.mrp == 0.0 && t.offer == 0.0) {
            warn!("All totals are 0; formulas may not have been calculated.");
            warn!("Open the workbook in Excel, let it recalculate, save, and run create-summary again");
        }

        let outcome = self.write(book, totals)?;
        info!(
            "Summary sheet '{}' updated with {} entries",
            outcome.sheet_name,
            outcome.totals.len()
        );
        Ok(Some(outcome))
    }

    pub fn collect(&self, book: &Spreadsheet) -> Vec<SheetTotals> {
        book.get_sheet_collection()
            .iter()
            .filter(|sheet| !self.config.is_summary_sheet(sheet.get_name()))
            .filter_map(|sheet| {
                let grid = SheetGrid::from_worksheet(sheet);
                let totals = self.totals_from_grid(&grid)?;
                info!("{}: MRP={}, Offer={}", totals.sheet_name, totals.mrp, totals.offer);
                Some(totals)
            })
            .collect()
    }

    /// Totals of one sheet, or `None` when it has no total row.
    pub fn totals_from_grid(&self, grid: &SheetGrid) -> Option<SheetTotals> {
        let total_row = grid.find_row_containing(&self.config.total_value_keywords)?;
        let columns = &self.config.summary;

        let resolve = |label: &str, total_col: u32, price_col: u32| -> f64 {
            if let Some(value) = parse_amount(grid.cell(total_col, total_row)) {
                return value;
            }
            match line_item_sum(grid, columns.quantity_column, price_col, columns.first_data_row, total_row) {
                Some(sum) => sum,
                None => {
                    warn!("{}: {} total not calculated, using 0", grid.name, label);
                    0.0
                }
            }
        };

        let mrp = resolve("MRP", columns.mrp_total_column, columns.mrp_column);
        let offer = resolve("offer", columns.offer_total_column, columns.offer_column);

        Some(SheetTotals {
            sheet_name: grid.name.clone(),
            mrp,
            offer,
            total_row,
        })
    }

    pub fn write(&self, book: &mut Spreadsheet, totals: Vec<SheetTotals>) -> Result<SummaryOutcome> {
        let existing = book
            .get_sheet_collection()
            .iter()
            .map(|s| s.get_name().to_string())
            .find(|name| self.config.is_summary_sheet(name));

        let sheet: &mut Worksheet = match existing {
            Some(name) => {
                let sheet = book
                    .get_sheet_by_name_mut(&name)
                    .ok_or_else(|| PricebookError::SheetNotFound(name.clone()))?;
                let rows = sheet.get_highest_row();
                if rows > 0 {
                    sheet.remove_row(&1, &rows);
                }
                sheet
            }
            None => book
                .new_sheet(DEFAULT_SUMMARY_NAME)
                .map_err(|e| PricebookError::Workbook(e.to_string()))?,
        };

        for (column, width) in COLUMN_WIDTHS {
            sheet.get_column_dimension_mut(column).set_width(width);
        }

        for (idx, header) in HEADERS.iter().enumerate() {
            let coordinate = (idx as u32 + 1, 1);
            sheet.get_cell_mut(coordinate).set_value(*header);
            let style = sheet.get_style_mut(coordinate);
            style.get_font_mut().set_bold(true);
            style.set_background_color(HEADER_FILL);
            center(style);
            thin_borders(style);
        }

        let mut total_mrp = 0.0;
        let mut total_offer = 0.0;
        for (idx, sheet_totals) in totals.iter().enumerate() {
            let row = idx as u32 + 2;

            sheet.get_cell_mut((1, row)).set_value_number((idx + 1) as f64);
            let style = sheet.get_style_mut((1, row));
            center(style);
            thin_borders(style);

            sheet.get_cell_mut((2, row)).set_value(sheet_totals.sheet_name.as_str());
            thin_borders(sheet.get_style_mut((2, row)));

            write_amount(sheet, (3, row), sheet_totals.mrp, false);
            write_amount(sheet, (4, row), sheet_totals.offer, false);

            total_mrp += sheet_totals.mrp;
            total_offer += sheet_totals.offer;
        }

        let total_row = totals.len() as u32 + 2;
        write_label(sheet, (2, total_row), "TOTAL MRP");
        write_amount(sheet, (3, total_row), total_mrp, true);
        write_amount(sheet, (4, total_row), total_offer, true);

        let final_row = total_row + 2;
        write_label(sheet, (2, final_row), "FINAL OFFER VALUE ( INCL GST )");
        write_amount(sheet, (3, final_row), total_offer, true);

        Ok(SummaryOutcome {
            sheet_name: sheet.get_name().to_string(),
            totals,
            total_mrp,
            total_offer,
        })
    }
}

/// Sum of quantity x unit price over the line items above the total row.
fn line_item_sum(grid: &SheetGrid, qty_col: u32, price_col: u32, first_row: u32, total_row: u32) -> Option<f64> {
    let items: Vec<f64> = (first_row..total_row)
        .filter_map(|row| {
            let qty = parse_amount(grid.cell(qty_col, row))?;
            let price = parse_amount(grid.cell(price_col, row))?;
            Some(qty * price)
        })
        .collect();

    if items.is_empty() {
        None
    } else {
        Some(items.iter().sum())
    }
}

fn center(style: &mut Style) {
    let alignment = style.get_alignment_mut();
    alignment.set_horizontal(HorizontalAlignmentValues::Center);
    alignment.set_vertical(VerticalAlignmentValues::Center);
}

fn thin_borders(style: &mut Style) {
    let borders = style.get_borders_mut();
    borders.get_left_mut().set_border_style(Border::BORDER_THIN);
    borders.get_right_mut().set_border_style(Border::BORDER_THIN);
    borders.get_top_mut().set_border_style(Border::BORDER_THIN);
    borders.get_bottom_mut().set_border_style(Border::BORDER_THIN);
}

fn write_label(sheet: &mut Worksheet, coordinate: (u32, u32), label: &str) {
    sheet.get_cell_mut(coordinate).set_value(label);
    let style = sheet.get_style_mut(coordinate);
    style.get_font_mut().set_bold(true);
    style.set_background_color(HEADER_FILL);
    thin_borders(style);
}

fn write_amount(sheet: &mut Worksheet, coordinate: (u32, u32), value: f64, highlight: bool) {
    sheet.get_cell_mut(coordinate).set_value_number(value);
    let style = sheet.get_style_mut(coordinate);
    style.get_number_format_mut().set_format_code(AMOUNT_FORMAT);
    style.get_alignment_mut().set_horizontal(HorizontalAlignmentValues::Right);
    if highlight {
        style.get_font_mut().set_bold(true);
        style.set_background_color(HEADER_FILL);
    }
    thin_borders(style);
}
