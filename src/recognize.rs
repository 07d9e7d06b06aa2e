//! Recognition: call the external OCR engine and normalise what it returns.
//!
//! Engines differ in how they report confidence. Some give a score per
//! word, some only for part of the words, some mark "no score" with -1.
//! [`recognize`] folds all of that into one [`RecognitionResult`]:
//! confidence is the mean over the words that carry a score, and a result
//! with no scored words has confidence 0 and word count 0.

use crate::error::CollaboratorError;
use crate::page::PageImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

// ── Engine interface ─────────────────────────────────────────────────────────

/// Page-layout hint passed to the engine.
///
/// Discriminants match Tesseract's page segmentation modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMode {
    /// Fully automatic layout analysis. (default)
    #[default]
    Auto,
    /// A single column of text of variable sizes.
    SingleColumn,
    /// A single uniform block of text.
    SingleBlock,
    /// A single text line.
    SingleLine,
    /// As much text as possible, in no particular order.
    SparseText,
}

impl SegmentationMode {
    pub fn as_psm(self) -> u8 {
        match self {
            SegmentationMode::Auto => 3,
            SegmentationMode::SingleColumn => 4,
            SegmentationMode::SingleBlock => 6,
            SegmentationMode::SingleLine => 7,
            SegmentationMode::SparseText => 11,
        }
    }

    pub fn from_psm(psm: u8) -> Option<Self> {
        match psm {
            3 => Some(SegmentationMode::Auto),
            4 => Some(SegmentationMode::SingleColumn),
            6 => Some(SegmentationMode::SingleBlock),
            7 => Some(SegmentationMode::SingleLine),
            11 => Some(SegmentationMode::SparseText),
            _ => None,
        }
    }
}

impl FromStr for SegmentationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(SegmentationMode::Auto),
            "column" | "single-column" => Ok(SegmentationMode::SingleColumn),
            "block" | "single-block" => Ok(SegmentationMode::SingleBlock),
            "line" | "single-line" => Ok(SegmentationMode::SingleLine),
            "sparse" => Ok(SegmentationMode::SparseText),
            other => other
                .parse::<u8>()
                .ok()
                .and_then(SegmentationMode::from_psm)
                .ok_or_else(|| format!("unknown segmentation mode '{other}'")),
        }
    }
}

impl fmt::Display for SegmentationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "psm {}", self.as_psm())
    }
}

/// Pixel rectangle of a recognised word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// One word as reported by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawWord {
    pub text: String,
    /// 0–100, or `None` when the engine gave no score.
    pub confidence: Option<f32>,
    pub bbox: Option<BoundingBox>,
}

/// Unprocessed engine output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecognition {
    /// Full text in reading order, as laid out by the engine.
    pub text: String,
    pub words: Vec<RawWord>,
}

/// An OCR engine.
///
/// Implementations must be `Send + Sync`: pages are recognised
/// concurrently on blocking worker threads.
pub trait RecognitionEngine: Send + Sync {
    fn recognize_raw(
        &self,
        image: &PageImage,
        language: &str,
        mode: SegmentationMode,
    ) -> Result<RawRecognition, CollaboratorError>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "engine"
    }
}

// ── Normalised result ────────────────────────────────────────────────────────

/// A recognised word after normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub confidence: Option<f32>,
    pub bbox: Option<BoundingBox>,
}

/// What the engine read from one conditioned page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub text: String,
    /// Mean word confidence, 0–100.
    pub confidence: f32,
    /// Non-blank words that carry a confidence score.
    pub word_count: usize,
    pub words: Vec<Word>,
    /// Dimensions of the image that was recognised.
    pub image_width: u32,
    pub image_height: u32,
}

impl RecognitionResult {
    /// A result with no text, as for a blank page.
    pub fn empty(image_width: u32, image_height: u32) -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            word_count: 0,
            words: Vec::new(),
            image_width,
            image_height,
        }
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    pub fn megapixels(&self) -> f64 {
        self.image_width as f64 * self.image_height as f64 / 1_000_000.0
    }
}

/// Recognise one page and normalise the engine's output.
///
/// Engine failures are returned unchanged; this function never retries.
pub fn recognize(
    engine: &dyn RecognitionEngine,
    image: &PageImage,
    language: &str,
    mode: SegmentationMode,
) -> Result<RecognitionResult, CollaboratorError> {
    let raw = engine.recognize_raw(image, language, mode)?;
    let result = normalize(raw, image.width(), image.height());
    debug!(
        engine = engine.name(),
        words = result.word_count,
        confidence = result.confidence,
        "Recognition complete"
    );
    Ok(result)
}

/// Fold raw engine output into a [`RecognitionResult`].
pub fn normalize(raw: RawRecognition, image_width: u32, image_height: u32) -> RecognitionResult {
    let words: Vec<Word> = raw
        .words
        .into_iter()
        .filter(|w| !w.text.trim().is_empty())
        .map(|w| Word {
            text: w.text.trim().to_string(),
            confidence: w
                .confidence
                .filter(|c| c.is_finite() && *c >= 0.0)
                .map(|c| c.min(100.0)),
            bbox: w.bbox,
        })
        .collect();

    let scored: Vec<f32> = words.iter().filter_map(|w| w.confidence).collect();
    let (confidence, word_count) = if scored.is_empty() {
        (0.0, 0)
    } else {
        let mean = scored.iter().map(|&c| c as f64).sum::<f64>() / scored.len() as f64;
        (mean as f32, scored.len())
    };

    RecognitionResult {
        text: raw.text.trim_end().to_string(),
        confidence,
        word_count,
        words,
        image_width,
        image_height,
    }
}
