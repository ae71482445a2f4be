// Table reconstruction from positioned text runs
//
// Pricebooks rarely carry real table structure, so rows are rebuilt from
// geometry: runs sharing a baseline form a line, wide horizontal gaps split a
// line into cells, and a line naming a code column starts a table.

use super::page_layout::TextRun;
use crate::config::LayoutConfig;
use crate::sku::find_column_index;

#[derive(Debug, Clone, PartialEq)]
pub struct TextCell {
    pub text: String,
    pub x0: f32,
    pub x1: f32,
}

impl TextCell {
    fn center_x(&self) -> f32 {
        (self.x0 + self.x1) / 2.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub top: f32,
    pub bottom: f32,
    pub cells: Vec<TextCell>,
}

impl TextLine {
    pub fn center_y(&self) -> f32 {
        (self.top + self.bottom) / 2.0
    }

    pub fn text(&self) -> String {
        self.cells
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn as_row(&self) -> Vec<Option<String>> {
        self.cells.iter().map(|c| Some(c.text.clone())).collect()
    }
}

/// A rebuilt table; row 0 is the header.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub rows: Vec<Vec<Option<String>>>,
    /// Vertical span of each row, same indexing as `rows`
    pub row_spans: Vec<(f32, f32)>,
}

impl Table {
    pub fn row_center(&self, row_idx: usize) -> Option<f32> {
        self.row_spans.get(row_idx).map(|(top, bottom)| (top + bottom) / 2.0)
    }
}

/// Group runs into lines (top to bottom) and split each line into cells.
pub fn group_lines(runs: &[TextRun], config: &LayoutConfig) -> Vec<TextLine> {
    let mut sorted: Vec<&TextRun> = runs.iter().collect();
    sorted.sort_by(|a, b| {
        a.center_y()
            .partial_cmp(&b.center_y())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.x0.partial_cmp(&b.x0).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut grouped: Vec<Vec<&TextRun>> = Vec::new();
    for run in sorted {
        match grouped.last_mut() {
            Some(line) if (line[0].center_y() - run.center_y()).abs() <= config.line_tolerance => {
                line.push(run)
            }
            _ => grouped.push(vec![run]),
        }
    }

    grouped
        .into_iter()
        .map(|mut line| {
            line.sort_by(|a, b| a.x0.partial_cmp(&b.x0).unwrap_or(std::cmp::Ordering::Equal));
            let top = line.iter().map(|r| r.top).fold(f32::INFINITY, f32::min);
            let bottom = line.iter().map(|r| r.bottom).fold(f32::NEG_INFINITY, f32::max);
            TextLine {
                top,
                bottom,
                cells: split_cells(&line, config.cell_gap),
            }
        })
        .collect()
}

fn split_cells(line: &[&TextRun], cell_gap: f32) -> Vec<TextCell> {
    let mut cells: Vec<TextCell> = Vec::new();
    for run in line {
        match cells.last_mut() {
            Some(cell) if run.x0 - cell.x1 <= cell_gap => {
                // a visible gap inside a cell is a word break
                if run.x0 - cell.x1 > run.font_size * 0.15 && !cell.text.ends_with(' ') {
                    cell.text.push(' ');
                }
                cell.text.push_str(&run.text);
                cell.x1 = cell.x1.max(run.x1);
            }
            _ => cells.push(TextCell {
                text: run.text.clone(),
                x0: run.x0,
                x1: run.x1,
            }),
        }
    }
    cells
}

/// Find tables: a header line naming a code column followed by data lines.
pub fn extract_tables<S: AsRef<str>>(lines: &[TextLine], code_names: &[S], config: &LayoutConfig) -> Vec<Table> {
    let is_header = |line: &TextLine| line.cells.len() >= 2 && find_column_index(&line.as_row(), code_names).is_some();

    let mut tables = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if !is_header(&lines[i]) {
            i += 1;
            continue;
        }

        let header = &lines[i];
        let mut rows = vec![header.as_row()];
        let mut row_spans = vec![(header.top, header.bottom)];
        let mut previous_bottom = header.bottom;

        i += 1;
        while i < lines.len() && !is_header(&lines[i]) {
            let line = &lines[i];
            if line.top - previous_bottom > config.table_row_gap {
                break;
            }
            rows.push(assign_columns(header, line));
            row_spans.push((line.top, line.bottom));
            previous_bottom = line.bottom;
            i += 1;
        }

        tables.push(Table { rows, row_spans });
    }
    tables
}

/// Place each cell of `line` under the header column it overlaps most, or the
/// nearest one when it overlaps none.
fn assign_columns(header: &TextLine, line: &TextLine) -> Vec<Option<String>> {
    let mut row: Vec<Option<String>> = vec![None; header.cells.len()];

    for cell in &line.cells {
        let best = header
            .cells
            .iter()
            .enumerate()
            .map(|(idx, h)| {
                let overlap = cell.x1.min(h.x1) - cell.x0.max(h.x0);
                let distance = (cell.center_x() - h.center_x()).abs();
                (idx, overlap, distance)
            })
            .max_by(|a, b| {
                let key_a = if a.1 > 0.0 { a.1 } else { -a.2 - 1.0e6 };
                let key_b = if b.1 > 0.0 { b.1 } else { -b.2 - 1.0e6 };
                // prefer the leftmost column on ties
                key_a
                    .partial_cmp(&key_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.0.cmp(&a.0))
            })
            .map(|(idx, _, _)| idx);

        if let Some(idx) = best {
            match &mut row[idx] {
                Some(existing) => {
                    existing.push(' ');
                    existing.push_str(&cell.text);
                }
                slot => *slot = Some(cell.text.clone()),
            }
        }
    }
    row
}
