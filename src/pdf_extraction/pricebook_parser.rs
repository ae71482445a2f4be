// Pricebook parser - the SKU-to-image matching engine
use lopdf::Document;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::lopdf_helper::load_pdf;
use super::page_layout::{page_layout, PageLayout, PlacedImage};
use super::table_builder::{extract_tables, group_lines, Table, TextLine};
use crate::config::Config;
use crate::sku::{extract_all_skus, find_column_index, find_free_column_index, is_reference_row, is_valid_sku, normalize_sku, TEXT_SKU};
use crate::types::{ImageRef, Result, SkuEntry, SkuMap};

/// Parse a vendor pricebook PDF into a SKU map.
pub struct PricebookParser {
    pdf_path: PathBuf,
    config: Config,
}

impl PricebookParser {
    pub fn new(pdf_path: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            pdf_path: pdf_path.into(),
            config,
        }
    }

    pub fn parse(&self) -> Result<SkuMap> {
        info!("Parsing PDF: {}", self.pdf_path.display());
        let document = load_pdf(&self.pdf_path).map_err(|e| {
            warn!("Error parsing PDF: {}", e);
            e
        })?;
        self.parse_document(&document)
    }

    /// Parse an already loaded document.
    pub fn parse_document(&self, document: &Document) -> Result<SkuMap> {
        let mut matcher = SkuMatcher::new(&self.config);
        let pages = document.get_pages();
        let total = pages.len();

        for (page_number, page_id) in pages {
            info!("Processing page {}/{}...", page_number, total);
            match page_layout(document, page_number, page_id) {
                Ok(layout) => matcher.parse_page(&layout),
                Err(e) => warn!("Skipping page {}: {}", page_number, e),
            }
        }

        let map = matcher.finish();
        let with_images = map.values().filter(|e| e.has_image()).count();
        debug!(
            "SKUs with images (normalized): {:?}",
            map.values().filter(|e| e.has_image()).map(|e| &e.normalized).collect::<Vec<_>>()
        );
        info!("Found {} SKUs, {} with images", map.len(), with_images);
        Ok(map)
    }
}

/// Convenience wrapper around [`PricebookParser`].
pub fn parse_pdf(pdf_path: &Path, config: &Config) -> Result<SkuMap> {
    PricebookParser::new(pdf_path, config.clone()).parse()
}

/// Accumulates SKU entries page by page.
pub struct SkuMatcher<'c> {
    config: &'c Config,
    entries: SkuMap,
}

impl<'c> SkuMatcher<'c> {
    pub fn new(config: &'c Config) -> Self {
        Self {
            config,
            entries: SkuMap::new(),
        }
    }

    pub fn parse_page(&mut self, layout: &PageLayout) {
        let lines = group_lines(&layout.runs, &self.config.layout);
        let tables = extract_tables(&lines, &self.config.code_column_names, &self.config.layout);

        let min_size = self.config.layout.min_image_points;
        let images: Vec<&PlacedImage> = layout
            .images
            .iter()
            .filter(|img| img.bbox.width() >= min_size && img.bbox.height() >= min_size)
            .collect();

        if tables.is_empty() {
            self.parse_text_mode(&lines, &images, layout.page_number);
            return;
        }

        for table in &tables {
            self.process_table(table, &images, layout.page_number);
        }
    }

    /// Fallback for pages without a recognisable table: every code-looking
    /// token is kept and paired with the image closest to its line.
    fn parse_text_mode(&mut self, lines: &[TextLine], images: &[&PlacedImage], page: u32) {
        for line in lines {
            let text = line.text();
            for m in TEXT_SKU.find_iter(&text) {
                let raw = m.as_str();
                if !is_valid_sku(raw) {
                    continue;
                }
                let normalized = normalize_sku(raw);
                let image = nearest_by_position(images, line.center_y()).map(|img| image_ref(img, page));

                let entry = self.entries.entry(normalized.clone()).or_insert_with(|| SkuEntry {
                    sku: raw.to_string(),
                    normalized,
                    description: String::new(),
                    mrp: String::new(),
                    page,
                    row_index: None,
                    image: None,
                });
                if entry.image.is_none() {
                    entry.image = image;
                }
            }
        }
    }

    fn process_table(&mut self, table: &Table, images: &[&PlacedImage], page: u32) {
        if table.rows.len() < 2 {
            return;
        }

        let header = &table.rows[0];
        let Some(code_idx) = find_column_index(header, &self.config.code_column_names) else {
            return;
        };
        let desc_idx = find_free_column_index(header, &self.config.desc_column_names, &[code_idx]);
        let mrp_idx = find_free_column_index(header, &self.config.price_column_names, &[code_idx]);

        for (row_idx, row) in table.rows.iter().enumerate().skip(1) {
            let Some(Some(code_cell)) = row.get(code_idx) else {
                continue;
            };
            if self.config.skip_reference_rows && is_reference_row(row, &self.config.skip_keywords) {
                debug!("page {}: skipping reference row {}", page, row_idx);
                continue;
            }

            let cell_at = |idx: Option<usize>| {
                idx.and_then(|i| row.get(i).cloned().flatten())
                    .unwrap_or_default()
            };

            for raw in extract_all_skus(code_cell) {
                let normalized = normalize_sku(&raw);
                if normalized.is_empty() {
                    continue;
                }

                let row_center = if self.config.layout.use_row_positions {
                    table.row_center(row_idx)
                } else {
                    None
                };
                let image = find_nearest_image(row_idx, images, table.rows.len(), row_center)
                    .map(|img| image_ref(img, page));

                let previous_image = self.entries.get(&normalized).and_then(|e| e.image.clone());
                self.entries.insert(
                    normalized.clone(),
                    SkuEntry {
                        sku: raw,
                        normalized,
                        description: cell_at(desc_idx),
                        mrp: cell_at(mrp_idx),
                        page,
                        row_index: Some(row_idx),
                        image: image.or(previous_image),
                    },
                );
            }
        }
    }

    pub fn finish(self) -> SkuMap {
        self.entries
    }
}

fn image_ref(image: &PlacedImage, page: u32) -> ImageRef {
    ImageRef {
        page,
        name: image.name.clone(),
        object_id: image.object_id,
        bbox: image.bbox,
    }
}

/// Pick the image for 1-based data row `row_idx` of a table with
/// `total_rows` rows (header included).
///
/// With at least one image per data row the images are taken in top-to-bottom
/// order. Otherwise the row's own Y position is used when known, and as a last
/// resort the row's Y is interpolated between the first and last image.
pub fn find_nearest_image<'i>(
    row_idx: usize,
    images: &[&'i PlacedImage],
    total_rows: usize,
    row_center: Option<f32>,
) -> Option<&'i PlacedImage> {
    if images.is_empty() || row_idx == 0 {
        return None;
    }

    let mut sorted: Vec<&PlacedImage> = images.to_vec();
    sorted.sort_by(|a, b| a.bbox.top.partial_cmp(&b.bbox.top).unwrap_or(std::cmp::Ordering::Equal));

    let data_rows = total_rows.saturating_sub(1);
    if sorted.len() >= data_rows && row_idx <= sorted.len() {
        return Some(sorted[row_idx - 1]);
    }

    if let Some(y) = row_center {
        return nearest_by_position(&sorted, y);
    }

    if sorted.len() == 1 || data_rows == 0 {
        return Some(sorted[0]);
    }

    let first_top = sorted[0].bbox.top;
    let last_top = sorted[sorted.len() - 1].bbox.top;
    let fraction = (row_idx - 1) as f32 / (data_rows.max(2) - 1) as f32;
    let estimated_y = first_top + fraction * (last_top - first_top);

    sorted.into_iter().min_by(|a, b| {
        (a.bbox.top - estimated_y)
            .abs()
            .partial_cmp(&(b.bbox.top - estimated_y).abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}

/// Image whose vertical span is closest to `y`; the first one wins ties.
fn nearest_by_position<'i>(images: &[&'i PlacedImage], y: f32) -> Option<&'i PlacedImage> {
    images.iter().copied().min_by(|a, b| {
        a.bbox
            .vertical_distance(y)
            .partial_cmp(&b.bbox.vertical_distance(y))
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}
