// Pipelines behind the CLI: fill images, build the summary, clear pictures
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::pdf_extraction::{load_pdf, ImageExtractor, PricebookParser};
use crate::sku_report::{write_excel_export, write_pdf_export, EXCEL_EXPORT_FILE, PDF_EXPORT_FILE};
use crate::types::{PricebookError, Result};
use crate::workbook::summary::SummaryOutcome;
use crate::workbook::{ExcelHandler, SummaryBuilder};

#[derive(Debug, Clone, Default)]
pub struct FillOptions {
    /// Save here instead of over the input workbook
    pub output: Option<PathBuf>,
    /// Leave the extracted PNGs on disk
    pub keep_images: bool,
    /// Write the PDF and workbook SKU exports into this directory
    pub export_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FillReport {
    pub pdf_skus: usize,
    pub pdf_skus_with_images: usize,
    pub images_extracted: usize,
    pub excel_skus: usize,
    pub images_inserted: usize,
    pub saved_to: PathBuf,
    pub image_dir: Option<PathBuf>,
    pub exports: Option<(PathBuf, PathBuf)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    /// Where the workbook was saved; `None` when there was nothing to summarise
    pub saved_to: Option<PathBuf>,
    pub outcome: Option<SummaryOutcome>,
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PricebookError::MissingFile(path.to_path_buf()))
    }
}

/// Parse the pricebook, extract its product images and place them in the
/// workbook rows whose codes match.
pub fn fill_images_from_pdf(excel: &Path, pdf: &Path, config: &Config, options: &FillOptions) -> Result<FillReport> {
    require_file(excel)?;
    require_file(pdf)?;

    info!("STEP 1: Parsing PDF for SKU-image mappings...");
    let document = load_pdf(pdf)?;
    let skus = PricebookParser::new(pdf, config.clone()).parse_document(&document)?;
    if skus.is_empty() {
        return Err(PricebookError::NoSkus);
    }
    let with_images = skus.values().filter(|e| e.has_image()).count();

    info!("STEP 2: Extracting images from PDF...");
    let mut extractor = ImageExtractor::new(config)?;
    let images = extractor.extract_images(&document, &skus)?;
    if images.is_empty() {
        return Err(PricebookError::NoImages);
    }

    info!("STEP 3: Scanning Excel for SKUs...");
    let mut handler = ExcelHandler::open(excel, config)?;
    let excel_skus = handler.scan_skus()?;

    let exports = match &options.export_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let pdf_export = dir.join(PDF_EXPORT_FILE);
            let excel_export = dir.join(EXCEL_EXPORT_FILE);
            write_pdf_export(&pdf_export, &skus)?;
            write_excel_export(&excel_export, &excel_skus)?;
            Some((pdf_export, excel_export))
        }
        None => None,
    };

    info!("STEP 4: Inserting images into Excel...");
    let inserted = handler.insert_images(&images)?;
    let saved_to = handler.save(options.output.as_deref())?;

    let image_dir = if options.keep_images {
        let dir = extractor.keep();
        info!("Images kept in {}", dir.display());
        Some(dir)
    } else {
        info!("STEP 5: Cleaning up temporary images...");
        extractor.cleanup();
        None
    };

    info!("Completed: inserted {} images into '{}'", inserted, saved_to.display());
    Ok(FillReport {
        pdf_skus: skus.len(),
        pdf_skus_with_images: with_images,
        images_extracted: images.len(),
        excel_skus: excel_skus.len(),
        images_inserted: inserted,
        saved_to,
        image_dir,
        exports,
    })
}

/// Create or refresh the summary sheet. The workbook is only saved when
/// there was something to summarise.
pub fn create_summary(excel: &Path, output: Option<&Path>, config: &Config) -> Result<SummaryReport> {
    require_file(excel)?;
    let mut handler = ExcelHandler::open(excel, config)?;

    let outcome = SummaryBuilder::new(config).build(handler.book_mut())?;
    let saved_to = match outcome {
        Some(_) => Some(handler.save(output)?),
        None => None,
    };
    Ok(SummaryReport { saved_to, outcome })
}

/// Remove every picture from the workbook. Returns the save path and count.
pub fn clear_images(excel: &Path, output: Option<&Path>, config: &Config) -> Result<(PathBuf, usize)> {
    require_file(excel)?;
    let mut handler = ExcelHandler::open(excel, config)?;
    let removed = handler.clear_images();
    let saved_to = handler.save(output)?;
    info!("Cleared {} images from {}", removed, saved_to.display());
    Ok((saved_to, removed))
}
