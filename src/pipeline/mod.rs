//! Pipeline stages and the concrete collaborators behind them.
//!
//! Each submodule implements exactly one step around the core
//! condition → recognize → score loop. The loop itself only sees the
//! [`Rasterizer`](render::Rasterizer) and
//! [`RecognitionEngine`](crate::recognize::RecognitionEngine) traits, so
//! any backend here can be swapped without touching the orchestrator.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ (condition) ──▶ encode ──▶ tesseract ──▶ postprocess
//! (URL/path) (pdfium)                  (PNG)      (TSV words)   (cleanup)
//! ```
//!
//! 1. [`input`]: canonicalise the user-supplied path or URL to a local file
//! 2. [`render`]: rasterise pages; runs in `spawn_blocking` because pdfium
//!    is not async-safe
//! 3. [`encode`]: PNG-encode a conditioned page for the engine's stdin
//! 4. [`tesseract`]: run the `tesseract` binary and parse its TSV report
//! 5. [`postprocess`]: deterministic text cleanup of accepted page text

pub mod encode;
pub mod input;
pub mod postprocess;
pub mod render;
pub mod tesseract;
