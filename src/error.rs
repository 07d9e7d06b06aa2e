//! Error types for the scanrefine library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`ScanError`]: **Fatal**: the document cannot be processed at all
//!   (unreadable source, invalid configuration, page selection outside the
//!   document). Returned as `Err(ScanError)` from
//!   [`crate::DocumentOrchestrator::process`].
//!
//! * [`Degradation`]: **Non-fatal**: something went wrong for one page or
//!   for the table pass, but a usable document was still produced. Recorded
//!   in [`crate::output::ProcessingMetrics::degradations`] and on the
//!   affected [`crate::output::PageResult`].
//!
//! * [`CollaboratorError`]: what an external capability (recognition
//!   engine, table extractor) reports back. The orchestrator converts it into
//!   a [`Degradation`]; it never escapes as a fatal error.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the scanrefine library.
///
/// Page-level and table-level failures use [`Degradation`] and are stored
/// in the output metrics rather than propagated here.
#[derive(Debug, Error)]
pub enum ScanError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The source document could not be opened, downloaded or rasterised.
    #[error("Source '{source_name}' is unreadable: {reason}")]
    SourceUnreadable { source_name: String, reason: String },

    /// The page selection does not match any page of the document.
    #[error("Page selection matches no page (document has {total} pages)")]
    PageOutOfRange { total: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (runtime creation, worker panic).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// Shorthand for [`ScanError::SourceUnreadable`].
    pub fn unreadable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        ScanError::SourceUnreadable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by an external capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct CollaboratorError {
    pub message: String,
}

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A non-fatal condition recorded while processing a document.
///
/// None of these abort processing; the document is returned with the
/// affected page or table pass degraded and the condition listed here.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum Degradation {
    /// Every recognition attempt for the page failed; a placeholder was emitted.
    #[error("Page {page}: recognition failed after {attempts} attempts: {detail}")]
    PageRecognitionFailed {
        page: usize,
        attempts: u32,
        detail: String,
    },

    /// Retries ended without reaching the quality threshold; the best attempt was kept.
    #[error("Page {page}: best quality {score:.1} is below threshold {threshold:.1}")]
    LowQualityAccepted { page: usize, score: f32, threshold: f32 },

    /// The table extractor failed; the document carries no tables.
    #[error("Table extraction failed: {detail}")]
    TableExtractionFailed { detail: String },

    /// The processing time budget ran out before the page's retries finished.
    #[error("Page {page}: retries abandoned after {elapsed_ms}ms (time budget exceeded)")]
    TimeBudgetExceeded { page: usize, elapsed_ms: u64 },
}

impl Degradation {
    /// 1-indexed page the degradation refers to, if any.
    pub fn page(&self) -> Option<usize> {
        match self {
            Degradation::PageRecognitionFailed { page, .. }
            | Degradation::LowQualityAccepted { page, .. }
            | Degradation::TimeBudgetExceeded { page, .. } => Some(*page),
            Degradation::TableExtractionFailed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_unreadable_display() {
        let e = ScanError::unreadable("scan.pdf", "not a PDF");
        let msg = e.to_string();
        assert!(msg.contains("scan.pdf"), "got: {msg}");
        assert!(msg.contains("not a PDF"), "got: {msg}");
    }

    #[test]
    fn page_out_of_range_display() {
        let e = ScanError::PageOutOfRange { total: 4 };
        assert!(e.to_string().contains("4 pages"));
    }

    #[test]
    fn low_quality_display() {
        let d = Degradation::LowQualityAccepted {
            page: 3,
            score: 41.25,
            threshold: 60.0,
        };
        let msg = d.to_string();
        assert!(msg.contains("Page 3"), "got: {msg}");
        assert!(msg.contains("41.2") || msg.contains("41.3"), "got: {msg}");
    }

    #[test]
    fn degradation_page_accessor() {
        let d = Degradation::TimeBudgetExceeded {
            page: 7,
            elapsed_ms: 1200,
        };
        assert_eq!(d.page(), Some(7));
        let t = Degradation::TableExtractionFailed {
            detail: "boom".into(),
        };
        assert_eq!(t.page(), None);
    }

    #[test]
    fn degradation_serialises() {
        let d = Degradation::PageRecognitionFailed {
            page: 2,
            attempts: 3,
            detail: "engine crashed".into(),
        };
        let json = serde_json::to_string(&d).expect("serialise");
        assert!(json.contains("PageRecognitionFailed"));
        let back: Degradation = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, d);
    }
}
