//! Output types: the processed [`Document`], per-page results and metrics.
//!
//! Everything here is plain data with `Serialize`/`Deserialize`, so callers
//! can persist a document as JSON or feed the metrics into their own
//! reporting without the library choosing a file format.

use crate::condition::{ImageQuality, SkipReason, Stage};
use crate::error::{Degradation, ScanError};
use crate::quality::QualityScore;
use crate::recognize::RecognitionResult;
use crate::tables::Table;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Result of processing one PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Source file name (without directories).
    pub name: String,
    /// Page texts with tables merged in, joined by the configured separator.
    pub full_text: String,
    /// Every extracted table, in extractor order.
    pub tables: Vec<Table>,
    /// Per-page results, sorted by page number.
    pub pages: Vec<PageResult>,
    pub metrics: ProcessingMetrics,
}

impl Document {
    /// Whether any page ended with a placeholder instead of recognised text.
    pub fn is_partial(&self) -> bool {
        self.metrics.partial
    }

    /// Write `full_text` to `path` atomically (temp file + rename).
    pub async fn write_text(&self, path: impl AsRef<Path>) -> Result<(), ScanError> {
        write_atomic(path.as_ref(), self.full_text.as_bytes()).await
    }

    /// Write the whole document as pretty JSON to `path` atomically.
    pub async fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ScanError> {
        let path = path.as_ref();
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| ScanError::Internal(format!("Failed to serialise document: {e}")))?;
        write_atomic(path, &json).await
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ScanError> {
    let fail = |source| ScanError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(fail)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(fail)?;
    Ok(())
}

/// How a page's retry loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageOutcome {
    /// An attempt reached the quality threshold.
    Accepted,
    /// Every allowed retry ran; the best attempt was kept.
    RetriesExhausted,
    /// The time budget stopped further retries; the best attempt was kept.
    TimeBudgetExceeded,
    /// No attempt produced a recognition result.
    RecognitionFailed,
}

/// The result of processing a single page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Text of the kept attempt with the page's tables merged in, or a placeholder.
    pub text: String,
    /// Best recognition result, `None` when every attempt failed.
    pub recognition: Option<RecognitionResult>,
    /// Score of the kept attempt.
    pub quality: Option<QualityScore>,
    /// Attempts run (first try plus retries).
    pub attempts: u32,
    pub retries: u32,
    /// 0-indexed attempt whose result was kept.
    pub best_attempt: Option<u32>,
    pub outcome: PageOutcome,
    pub duration_ms: u64,
    /// Degradations recorded for this page.
    pub degradations: Vec<Degradation>,
    /// Quality of the raster as rendered, before any conditioning.
    #[serde(default)]
    pub image_quality: Option<ImageQuality>,
    /// Enabled conditioning stages that passed their input through.
    #[serde(default)]
    pub skipped_stages: Vec<SkippedStage>,
}

/// A conditioning stage that was enabled for an attempt but skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedStage {
    /// 0-indexed attempt.
    pub attempt: u32,
    pub stage: Stage,
    pub reason: SkipReason,
}

impl PageResult {
    pub fn is_placeholder(&self) -> bool {
        self.recognition.as_ref().is_none_or(|r| !r.has_text())
    }
}

/// Quality summary of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageQuality {
    pub page_num: usize,
    pub score: f32,
    pub acceptable: bool,
    pub attempts: u32,
    pub retries: u32,
    pub outcome: PageOutcome,
    #[serde(default)]
    pub image_quality: Option<ImageQuality>,
}

/// Diagnostics for one [`Document`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    /// Pages in the source PDF.
    pub total_pages: usize,
    /// Pages selected for processing.
    pub processed_pages: usize,
    pub total_duration_ms: u64,
    pub rasterize_duration_ms: u64,
    /// Wall time of the page phase (conditioning + recognition + scoring).
    pub recognition_duration_ms: u64,
    pub table_duration_ms: u64,
    pub per_page_quality: Vec<PageQuality>,
    pub retries_performed: u32,
    pub table_count: usize,
    /// Scored words across the kept attempts.
    pub word_count: usize,
    /// Mean score over pages with a recognition result.
    pub mean_quality: f32,
    /// At least one page is a placeholder.
    pub partial: bool,
    /// At least one page was accepted below the threshold.
    pub low_quality: bool,
    pub time_budget_exceeded: bool,
    pub degradations: Vec<Degradation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> ProcessingMetrics {
        ProcessingMetrics {
            total_pages: 1,
            processed_pages: 1,
            partial: true,
            ..ProcessingMetrics::default()
        }
    }

    fn doc() -> Document {
        Document {
            name: "scan.pdf".into(),
            full_text: "hello\n".into(),
            tables: Vec::new(),
            pages: vec![PageResult {
                page_num: 1,
                text: "[page 1: no text recognized]".into(),
                recognition: None,
                quality: None,
                attempts: 3,
                retries: 2,
                best_attempt: None,
                outcome: PageOutcome::RecognitionFailed,
                duration_ms: 12,
                degradations: Vec::new(),
                image_quality: None,
                skipped_stages: Vec::new(),
            }],
            metrics: metrics(),
        }
    }

    #[test]
    fn placeholder_detection() {
        let d = doc();
        assert!(d.pages[0].is_placeholder());
        assert!(d.is_partial());
    }

    #[test]
    fn document_json_roundtrip() {
        let json = serde_json::to_string(&doc()).expect("serialise");
        assert!(json.contains("\"outcome\":\"recognition_failed\""));
        let back: Document = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back.pages[0].attempts, 3);
    }

    #[tokio::test]
    async fn write_text_is_atomic_and_creates_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/out.txt");
        doc().write_text(&path).await.expect("write");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "hello\n");
        assert!(!dir.path().join("nested/out.txt.tmp").exists());
    }

    #[tokio::test]
    async fn write_json_produces_valid_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.json");
        doc().write_json(&path).await.expect("write");
        let v: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("json");
        assert_eq!(v["name"], "scan.pdf");
    }
}
