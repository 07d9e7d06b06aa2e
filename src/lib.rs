//! # scanrefine
//!
//! Quality-driven OCR for scanned PDFs.
//!
//! Raw OCR on a photocopied or faxed page is often poor. This crate wraps
//! an existing recognition engine in two layers that make it reliable:
//!
//! - a deterministic image-conditioning pipeline (denoise, CLAHE contrast,
//!   adaptive binarization, Hough-based deskew, morphological cleanup);
//! - an orchestrator that scores every recognition attempt, retries with
//!   progressively stronger conditioning until the score is good enough,
//!   and merges natively extracted tables back into the text.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Rasterize  render pages via pdfium (spawn_blocking)
//!  ├─ 3. Condition  grayscale → resample → denoise → contrast → binarize → deskew → morphology
//!  ├─ 4. Recognize  tesseract (or any RecognitionEngine)
//!  ├─ 5. Score      confidence × density × charset plausibility
//!  │      └─ below threshold? escalate conditioning and go back to 3
//!  ├─ 6. Tables     extracted once per document, merged at paragraph breaks
//!  └─ 7. Output     Document { full_text, tables, pages, metrics }
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scanrefine::{DocumentOrchestrator, ProcessingConfig, QualityProfile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProcessingConfig::builder()
//!         .profile(QualityProfile::MaximumQuality)
//!         .language("spa")
//!         .build()?;
//!     let doc = DocumentOrchestrator::with_defaults(config)
//!         .process_input("scan.pdf")
//!         .await?;
//!     println!("{}", doc.full_text);
//!     eprintln!("mean quality {:.1}, {} retries",
//!         doc.metrics.mean_quality,
//!         doc.metrics.retries_performed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scanrefine` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! scanrefine = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod condition;
pub mod config;
pub mod error;
pub mod escalation;
pub mod output;
pub mod page;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod quality;
pub mod recognize;
pub mod tables;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use condition::{
    assess_image_quality, condition, condition_with_report, ConditioningConfig,
    ConditioningReport, DenoiseMethod, ImageQuality, SkewEstimator, SkipReason, Stage,
};
pub use config::{
    PageSelection, PageSeparator, ProcessingConfig, ProcessingConfigBuilder, QualityProfile,
};
pub use error::{CollaboratorError, Degradation, ScanError};
pub use escalation::{EscalationPolicy, NoEscalation, ProgressiveEscalation};
pub use output::{
    Document, PageOutcome, PageQuality, PageResult, ProcessingMetrics, SkippedStage,
};
pub use page::PageImage;
pub use pipeline::render::{PdfiumRasterizer, Rasterizer};
pub use pipeline::tesseract::TesseractEngine;
pub use process::DocumentOrchestrator;
pub use progress::{NoopProgressCallback, ProcessingProgressCallback, ProgressCallback};
pub use quality::{QualityConfig, QualityScore, QualityScorer};
pub use recognize::{
    recognize, RawRecognition, RawWord, RecognitionEngine, RecognitionResult, SegmentationMode,
};
pub use tables::{JsonTableExtractor, NoTableExtractor, Table, TableExtractor};
