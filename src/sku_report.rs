// SKU exports (tab separated) and the PDF vs workbook comparison report
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use tracing::info;

use crate::types::{Result, SkuMap};
use crate::workbook::ExcelSku;

pub const PDF_EXPORT_FILE: &str = "pdf_skus_export.txt";
pub const EXCEL_EXPORT_FILE: &str = "excel_skus_export.txt";

// Differences listed per side before the rest is summarised
const REPORT_LIMIT: usize = 20;

#[derive(Debug, Serialize, Deserialize)]
struct PdfRecord {
    #[serde(rename = "SKU")]
    sku: String,
    #[serde(rename = "Normalized")]
    normalized: String,
    #[serde(rename = "HasImage")]
    has_image: String,
    #[serde(rename = "Page")]
    page: u32,
    #[serde(rename = "Description")]
    description: String,
    #[serde(rename = "MRP")]
    mrp: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExcelRecord {
    sheet: String,
    row: u32,
    #[serde(rename = "SKU")]
    sku: String,
    normalized: String,
}

// Only the columns the comparison needs; other columns are ignored
#[derive(Debug, Deserialize)]
struct NormalizedRecord {
    #[serde(rename = "Normalized", default)]
    normalized: String,
    #[serde(rename = "HasImage", default)]
    has_image: Option<String>,
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    Ok(csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?)
}

fn tsv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    Ok(csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)?)
}

/// Write every parsed pricebook SKU.
pub fn write_pdf_export(path: &Path, skus: &SkuMap) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    for entry in skus.values() {
        writer.serialize(PdfRecord {
            sku: entry.sku.clone(),
            normalized: entry.normalized.clone(),
            has_image: if entry.has_image() { "True" } else { "False" }.to_string(),
            page: entry.page,
            description: entry.description.clone(),
            mrp: entry.mrp.clone(),
        })?;
    }
    writer.flush()?;
    info!("Exported {} PDF SKUs to {}", skus.len(), path.display());
    Ok(())
}

/// Write every SKU scanned from the workbook.
pub fn write_excel_export(path: &Path, skus: &[ExcelSku]) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    for sku in skus {
        writer.serialize(ExcelRecord {
            sheet: sku.sheet.clone(),
            row: sku.row,
            sku: sku.sku.clone(),
            normalized: sku.normalized.clone(),
        })?;
    }
    writer.flush()?;
    info!("Exported {} Excel SKUs to {}", skus.len(), path.display());
    Ok(())
}

/// Normalized SKUs of a PDF export that have an image.
pub fn load_pdf_skus(path: &Path) -> Result<BTreeSet<String>> {
    let mut reader = tsv_reader(path)?;
    let mut skus = BTreeSet::new();
    for record in reader.deserialize() {
        let record: NormalizedRecord = record?;
        let has_image = record
            .has_image
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let normalized = record.normalized.trim();
        if has_image && !normalized.is_empty() {
            skus.insert(normalized.to_string());
        }
    }
    Ok(skus)
}

/// Normalized SKUs of a workbook export.
pub fn load_excel_skus(path: &Path) -> Result<BTreeSet<String>> {
    let mut reader = tsv_reader(path)?;
    let mut skus = BTreeSet::new();
    for record in reader.deserialize() {
        let record: NormalizedRecord = record?;
        let normalized = record.normalized.trim();
        if !normalized.is_empty() {
            skus.insert(normalized.to_string());
        }
    }
    Ok(skus)
}

/// Which workbook SKUs have no pricebook image and vice versa.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub excel_total: usize,
    pub pdf_total: usize,
    pub missing_in_pdf: Vec<String>,
    pub extra_in_pdf: Vec<String>,
}

impl ComparisonReport {
    pub fn from_sets(pdf: &BTreeSet<String>, excel: &BTreeSet<String>) -> Self {
        Self {
            excel_total: excel.len(),
            pdf_total: pdf.len(),
            missing_in_pdf: excel.difference(pdf).cloned().collect(),
            extra_in_pdf: pdf.difference(excel).cloned().collect(),
        }
    }
}

pub fn compare(pdf_export: &Path, excel_export: &Path) -> Result<ComparisonReport> {
    let pdf = load_pdf_skus(pdf_export)?;
    let excel = load_excel_skus(excel_export)?;
    Ok(ComparisonReport::from_sets(&pdf, &excel))
}

fn write_list(f: &mut fmt::Formatter<'_>, title: &str, skus: &[String]) -> fmt::Result {
    if skus.is_empty() {
        return Ok(());
    }
    writeln!(f)?;
    writeln!(f, "{} (first {}):", title, REPORT_LIMIT)?;
    for sku in skus.iter().take(REPORT_LIMIT) {
        writeln!(f, "  {}", sku)?;
    }
    if skus.len() > REPORT_LIMIT {
        writeln!(f, "  ... and {} more", skus.len() - REPORT_LIMIT)?;
    }
    Ok(())
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== SKU Comparison Report ===")?;
        writeln!(f, "Total SKUs in Excel: {}", self.excel_total)?;
        writeln!(f, "Total SKUs in PDF (with images): {}", self.pdf_total)?;
        writeln!(f, "SKUs in Excel but missing in PDF: {}", self.missing_in_pdf.len())?;
        writeln!(f, "SKUs in PDF but not in Excel: {}", self.extra_in_pdf.len())?;
        write_list(f, "SKUs in Excel but missing in PDF", &self.missing_in_pdf)?;
        write_list(f, "SKUs in PDF but not in Excel", &self.extra_in_pdf)
    }
}
