//! Tables: extraction interface, Markdown rendering and merging into page text.
//!
//! Tables come from the PDF's native structure through a [`TableExtractor`],
//! never from OCR. Each one carries its page and, when the extractor knows
//! it, its vertical position on the page. [`merge_page_text`] uses that
//! position to place the rendered table at the nearest paragraph break of
//! the recognised text.

use crate::error::CollaboratorError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Table bounds in relative page coordinates (0–1, origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingRegion {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// One rectangular table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// 0-indexed page the table sits on.
    pub page_index: usize,
    #[serde(default)]
    pub region: Option<BoundingRegion>,
    /// Rows of cells; the first row is treated as the header.
    pub grid: Vec<Vec<String>>,
}

impl Table {
    pub fn new(page_index: usize, grid: Vec<Vec<String>>) -> Self {
        Self {
            page_index,
            region: None,
            grid,
        }
    }

    pub fn with_region(mut self, region: BoundingRegion) -> Self {
        self.region = Some(region);
        self
    }

    pub fn to_markdown(&self) -> String {
        render_markdown(&self.grid)
    }
}

// ── Extractors ───────────────────────────────────────────────────────────────

/// Source of native PDF tables.
pub trait TableExtractor: Send + Sync {
    /// All tables of the document, in document order.
    fn extract_tables(&self, pdf: &Path) -> Result<Vec<Table>, CollaboratorError>;
}

/// Extractor for documents known to have no tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTableExtractor;

impl TableExtractor for NoTableExtractor {
    fn extract_tables(&self, _pdf: &Path) -> Result<Vec<Table>, CollaboratorError> {
        Ok(Vec::new())
    }
}

/// Reads tables produced by an external extractor from a JSON file.
///
/// The file holds a JSON array of [`Table`] objects. With
/// [`JsonTableExtractor::sidecar`] the file is looked up next to the PDF as
/// `<name>.tables.json` and a missing file means "no tables"; with
/// [`JsonTableExtractor::from_file`] the file must exist.
#[derive(Debug, Clone)]
pub struct JsonTableExtractor {
    path: Option<PathBuf>,
}

impl JsonTableExtractor {
    pub fn sidecar() -> Self {
        Self { path: None }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Sidecar path for a PDF: `report.pdf` → `report.tables.json`.
    pub fn sidecar_path(pdf: &Path) -> PathBuf {
        pdf.with_extension("tables.json")
    }
}

impl TableExtractor for JsonTableExtractor {
    fn extract_tables(&self, pdf: &Path) -> Result<Vec<Table>, CollaboratorError> {
        let path = match &self.path {
            Some(p) => p.clone(),
            None => {
                let p = Self::sidecar_path(pdf);
                if !p.exists() {
                    debug!("No table sidecar at {}", p.display());
                    return Ok(Vec::new());
                }
                p
            }
        };

        let bytes = std::fs::read(&path).map_err(|e| {
            CollaboratorError::new(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| CollaboratorError::new(format!("invalid tables in {}: {e}", path.display())))
    }
}

// ── Rendering ────────────────────────────────────────────────────────────────

/// Render a grid as a GitHub-flavoured Markdown table.
///
/// Short rows are padded with empty cells. `|` inside a cell is escaped and
/// line breaks become spaces. An empty grid renders as an empty string.
pub fn render_markdown(grid: &[Vec<String>]) -> String {
    let cols = grid.iter().map(Vec::len).max().unwrap_or(0);
    if cols == 0 {
        return String::new();
    }

    let row_line = |row: &[String]| {
        let mut line = String::from("|");
        for i in 0..cols {
            let cell = row.get(i).map(|c| escape_cell(c)).unwrap_or_default();
            line.push(' ');
            line.push_str(&cell);
            line.push_str(" |");
        }
        line
    };

    let mut lines = Vec::with_capacity(grid.len() + 1);
    lines.push(row_line(&grid[0]));
    lines.push(format!("|{}", " --- |".repeat(cols)));
    for row in &grid[1..] {
        lines.push(row_line(row));
    }
    lines.join("\n")
}

fn escape_cell(cell: &str) -> String {
    cell.trim()
        .replace('|', "\\|")
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}

// ── Merging ──────────────────────────────────────────────────────────────────

/// Insert rendered tables into one page's text.
///
/// The text is split into paragraphs at blank lines. A table with a region
/// goes to the paragraph break whose line offset is nearest to
/// `region.y0 × line count`; the earlier break wins a tie. Tables without a
/// region follow the page text. Tables sharing a slot keep their order in
/// `tables`. Blocks are joined with a blank line.
pub fn merge_page_text(text: &str, tables: &[&Table]) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let total_lines = lines.len();

    let mut paragraphs: Vec<(usize, String)> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut start = 0usize;
    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push((start, current.join("\n")));
                current.clear();
            }
        } else {
            if current.is_empty() {
                start = i;
            }
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push((start, current.join("\n")));
    }

    // Break k sits before paragraph k; break P is the end of the text.
    let break_offsets: Vec<usize> = paragraphs
        .iter()
        .map(|(start, _)| *start)
        .chain(std::iter::once(total_lines))
        .collect();
    let end_slot = paragraphs.len();

    let mut placed: Vec<(usize, String)> = tables
        .iter()
        .filter_map(|t| {
            let rendered = t.to_markdown();
            if rendered.is_empty() {
                return None;
            }
            let slot = match t.region {
                Some(region) => nearest_break(&break_offsets, region.y0, total_lines),
                None => end_slot + 1,
            };
            Some((slot, rendered))
        })
        .collect();
    placed.sort_by_key(|(slot, _)| *slot);

    let mut blocks: Vec<String> = Vec::with_capacity(paragraphs.len() + placed.len());
    let mut pending = placed.into_iter().peekable();
    for (k, (_, para)) in paragraphs.into_iter().enumerate() {
        while let Some((_, table)) = pending.next_if(|(slot, _)| *slot <= k) {
            blocks.push(table);
        }
        blocks.push(para);
    }
    blocks.extend(pending.map(|(_, table)| table));

    blocks.join("\n\n")
}

fn nearest_break(offsets: &[usize], y0: f32, total_lines: usize) -> usize {
    let target = y0.clamp(0.0, 1.0) as f64 * total_lines as f64;
    let mut best = 0usize;
    let mut best_distance = f64::INFINITY;
    for (k, &offset) in offsets.iter().enumerate() {
        let distance = (offset as f64 - target).abs();
        if distance < best_distance {
            best = k;
            best_distance = distance;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn at(y0: f32, g: Vec<Vec<String>>) -> Table {
        Table::new(0, g).with_region(BoundingRegion {
            x0: 0.1,
            y0,
            x1: 0.9,
            y1: (y0 + 0.1).min(1.0),
        })
    }

    #[test]
    fn renders_github_table() {
        let md = render_markdown(&grid(&[&["A", "B"], &["1", "2"]]));
        assert_eq!(md, "| A | B |\n| --- | --- |\n| 1 | 2 |");
    }

    #[test]
    fn ragged_rows_are_padded_and_pipes_escaped() {
        let md = render_markdown(&grid(&[&["x", "y", "z"], &["a|b"]]));
        assert_eq!(md, "| x | y | z |\n| --- | --- | --- |\n| a\\|b |  |  |");
    }

    #[test]
    fn empty_grid_renders_nothing() {
        assert_eq!(render_markdown(&[]), "");
        assert_eq!(render_markdown(&[vec![]]), "");
    }

    #[test]
    fn regionless_tables_follow_text_in_order() {
        let t1 = Table::new(0, grid(&[&["first"]]));
        let t2 = Table::new(0, grid(&[&["second"]]));
        let merged = merge_page_text("Intro line", &[&t1, &t2]);
        let p_text = merged.find("Intro line").expect("text");
        let p1 = merged.find("first").expect("t1");
        let p2 = merged.find("second").expect("t2");
        assert!(p_text < p1 && p1 < p2, "{merged}");
    }

    #[test]
    fn table_is_anchored_at_nearest_paragraph_break() {
        let text = "Title\n\nPara one\nmore\n\nPara two\nmore\n\nClosing";
        let table = at(0.5, grid(&[&["A", "B"], &["1", "2"]]));
        let merged = merge_page_text(text, &[&table]);
        let blocks: Vec<&str> = merged.split("\n\n").collect();
        // 9 lines, target offset 4.5: breaks at 0, 2, 5, 8, 9 → offset 5.
        assert_eq!(blocks[0], "Title");
        assert_eq!(blocks[1], "Para one\nmore");
        assert!(blocks[2].starts_with("| A | B |"));
        assert_eq!(blocks[3], "Para two\nmore");
        assert_eq!(blocks.last().copied(), Some("Closing"));
    }

    #[test]
    fn table_at_top_precedes_text() {
        let text = "Body text";
        let table = at(0.0, grid(&[&["H"]]));
        let merged = merge_page_text(text, &[&table]);
        assert!(merged.starts_with("| H |"), "{merged}");
    }

    #[test]
    fn tables_sharing_a_break_keep_extractor_order() {
        let text = "One\n\nTwo";
        let a = at(0.99, grid(&[&["a"]]));
        let b = at(0.95, grid(&[&["b"]]));
        let merged = merge_page_text(text, &[&a, &b]);
        assert!(merged.find("| a |").unwrap() < merged.find("| b |").unwrap());
        assert!(merged.find("Two").unwrap() < merged.find("| a |").unwrap());
    }

    #[test]
    fn merge_into_empty_text_is_just_tables() {
        let t = Table::new(0, grid(&[&["A"], &["1"]]));
        assert_eq!(merge_page_text("", &[&t]), "| A |\n| --- |\n| 1 |");
    }

    #[test]
    fn json_extractor_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pdf = dir.path().join("doc.pdf");
        let tables = vec![Table::new(2, grid(&[&["k", "v"]]))];
        std::fs::write(
            JsonTableExtractor::sidecar_path(&pdf),
            serde_json::to_vec(&tables).expect("json"),
        )
        .expect("write");

        let got = JsonTableExtractor::sidecar().extract_tables(&pdf).expect("read");
        assert_eq!(got, tables);
    }

    #[test]
    fn missing_sidecar_means_no_tables() {
        let dir = tempfile::tempdir().expect("tempdir");
        let got = JsonTableExtractor::sidecar()
            .extract_tables(&dir.path().join("none.pdf"))
            .expect("ok");
        assert!(got.is_empty());
    }

    #[test]
    fn explicit_file_must_exist() {
        let err = JsonTableExtractor::from_file("/nonexistent/tables.json")
            .extract_tables(Path::new("x.pdf"))
            .unwrap_err();
        assert!(err.message.contains("cannot read"));
    }
}
