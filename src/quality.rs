//! Quality scoring of a recognition attempt.
//!
//! The score starts from the engine's mean word confidence and is pulled
//! down by two plausibility checks:
//!
//! * **density**: a page that yields far fewer words than its area
//!   suggests probably lost text;
//! * **gibberish**: characters outside the language's alphabet and the
//!   usual punctuation are a typical sign of noise read as glyphs.
//!
//! ```text
//! score = confidence × (1 − w_density × shortfall) × (1 − w_gibberish × gibberish_ratio)
//! ```
//!
//! clamped to 0–100. Both factors are in 0–1, so the score never decreases
//! when confidence rises and nothing else changes.

use crate::recognize::RecognitionResult;
use serde::{Deserialize, Serialize};

/// Weights and threshold for [`QualityScorer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Minimum acceptable score, 0–100. Default: 60.
    pub threshold: f32,
    /// Words expected per megapixel of recognised image. Default: 2.0.
    pub min_words_per_megapixel: f32,
    /// Weight of the density shortfall, 0–1. Default: 0.5.
    pub density_weight: f32,
    /// Weight of the gibberish ratio, 0–1. Default: 1.0.
    pub gibberish_weight: f32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            threshold: 60.0,
            min_words_per_megapixel: 2.0,
            density_weight: 0.5,
            gibberish_weight: 1.0,
        }
    }
}

/// Score of one recognition attempt plus the parts it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub score: f32,
    pub acceptable: bool,
    pub mean_confidence: f32,
    /// 0 when the page has at least the expected word count, 1 when it has none.
    pub density_shortfall: f32,
    /// Share of non-whitespace characters outside the allowed set.
    pub gibberish_ratio: f32,
}

/// Scores recognition results for one language.
#[derive(Debug, Clone)]
pub struct QualityScorer {
    config: QualityConfig,
    charset: AllowedCharset,
}

impl QualityScorer {
    pub fn new(config: QualityConfig, language: &str) -> Self {
        Self {
            config,
            charset: AllowedCharset::for_language(language),
        }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    pub fn threshold(&self) -> f32 {
        self.config.threshold
    }

    pub fn score(&self, result: &RecognitionResult) -> QualityScore {
        let confidence = result.confidence.clamp(0.0, 100.0);
        let shortfall = self.density_shortfall(result);
        let gibberish = self.charset.gibberish_ratio(&result.text);

        let density_factor =
            (1.0 - self.config.density_weight.clamp(0.0, 1.0) * shortfall).clamp(0.0, 1.0);
        let gibberish_factor =
            (1.0 - self.config.gibberish_weight.clamp(0.0, 1.0) * gibberish).clamp(0.0, 1.0);

        let score = (confidence * density_factor * gibberish_factor).clamp(0.0, 100.0);
        QualityScore {
            score,
            acceptable: score >= self.config.threshold,
            mean_confidence: confidence,
            density_shortfall: shortfall,
            gibberish_ratio: gibberish,
        }
    }

    fn density_shortfall(&self, result: &RecognitionResult) -> f32 {
        let expected = self.config.min_words_per_megapixel.max(0.0) as f64 * result.megapixels();
        if expected <= f64::EPSILON {
            return 0.0;
        }
        (1.0 - result.word_count as f64 / expected).clamp(0.0, 1.0) as f32
    }
}

// ── Character plausibility ───────────────────────────────────────────────────

const COMMON_PUNCTUATION: &str = ".,;:!?'\"()-–—%/&$€£@#*+=«»“”‘’…°§";

/// Letters a language is expected to produce beyond ASCII.
#[derive(Debug, Clone)]
struct AllowedCharset {
    /// `None` means any alphanumeric character is allowed.
    extra_letters: Option<String>,
}

impl AllowedCharset {
    /// Charset for a Tesseract-style language code (`spa`, `eng+fra`, `de`).
    fn for_language(language: &str) -> Self {
        let mut extra = String::new();
        for code in language.split('+') {
            match code.trim().to_lowercase().as_str() {
                "eng" | "en" => {}
                "spa" | "es" => extra.push_str("áéíóúüñÁÉÍÓÚÜÑ¿¡"),
                "fra" | "fr" => extra.push_str("àâæçéèêëîïôœùûüÿÀÂÆÇÉÈÊËÎÏÔŒÙÛÜŸ"),
                "deu" | "de" => extra.push_str("äöüßÄÖÜ"),
                "por" | "pt" => extra.push_str("áâãàçéêíóôõúÁÂÃÀÇÉÊÍÓÔÕÚ"),
                "ita" | "it" => extra.push_str("àèéìíîòóùúÀÈÉÌÍÎÒÓÙÚ"),
                _ => return Self { extra_letters: None },
            }
        }
        Self {
            extra_letters: Some(extra),
        }
    }

    fn allows(&self, c: char) -> bool {
        if c.is_ascii_alphanumeric() || COMMON_PUNCTUATION.contains(c) {
            return true;
        }
        match &self.extra_letters {
            Some(extra) => extra.contains(c),
            None => c.is_alphanumeric(),
        }
    }

    fn gibberish_ratio(&self, text: &str) -> f32 {
        let mut total = 0usize;
        let mut bad = 0usize;
        for c in text.chars().filter(|c| !c.is_whitespace()) {
            total += 1;
            if !self.allows(c) {
                bad += 1;
            }
        }
        if total == 0 {
            0.0
        } else {
            bad as f32 / total as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(text: &str, confidence: f32, word_count: usize) -> RecognitionResult {
        RecognitionResult {
            text: text.into(),
            confidence,
            word_count,
            words: Vec::new(),
            image_width: 1000,
            image_height: 1000,
        }
    }

    #[test]
    fn clean_text_scores_its_confidence() {
        let scorer = QualityScorer::new(QualityConfig::default(), "eng");
        let s = scorer.score(&result("HELLO WORLD", 92.0, 2));
        assert!((s.score - 92.0).abs() < 1e-3, "score {}", s.score);
        assert!(s.acceptable);
        assert_eq!(s.gibberish_ratio, 0.0);
        assert_eq!(s.density_shortfall, 0.0);
    }

    #[test]
    fn score_is_monotonic_in_confidence() {
        let scorer = QualityScorer::new(QualityConfig::default(), "eng");
        let mut last = -1.0f32;
        for c in (0..=100).step_by(5) {
            let s = scorer.score(&result("t|xt ~~ here", c as f32, 1)).score;
            assert!(s >= last, "score dropped from {last} to {s} at confidence {c}");
            last = s;
        }
    }

    #[test]
    fn gibberish_pulls_score_down() {
        let scorer = QualityScorer::new(QualityConfig::default(), "eng");
        let clean = scorer.score(&result("plain words", 80.0, 2));
        let noisy = scorer.score(&result("~|^ {}<> \\|~", 80.0, 2));
        assert!(noisy.score < clean.score);
        assert!(noisy.gibberish_ratio > 0.9);
        assert!(!noisy.acceptable);
    }

    #[test]
    fn sparse_page_gets_density_penalty() {
        let config = QualityConfig {
            min_words_per_megapixel: 10.0,
            ..QualityConfig::default()
        };
        let scorer = QualityScorer::new(config, "eng");
        let s = scorer.score(&result("one", 90.0, 1));
        assert!((s.density_shortfall - 0.9).abs() < 1e-4);
        assert!((s.score - 90.0 * 0.55).abs() < 1e-2, "score {}", s.score);
    }

    #[test]
    fn spanish_letters_are_not_gibberish() {
        let spa = QualityScorer::new(QualityConfig::default(), "spa");
        let eng = QualityScorer::new(QualityConfig::default(), "eng");
        let text = "¿Año número?";
        assert_eq!(spa.score(&result(text, 80.0, 2)).gibberish_ratio, 0.0);
        assert!(eng.score(&result(text, 80.0, 2)).gibberish_ratio > 0.0);
    }

    #[test]
    fn unknown_language_allows_any_letter() {
        let scorer = QualityScorer::new(QualityConfig::default(), "rus");
        assert_eq!(scorer.score(&result("привет мир", 70.0, 2)).gibberish_ratio, 0.0);
    }

    #[test]
    fn empty_result_scores_zero() {
        let scorer = QualityScorer::new(QualityConfig::default(), "eng");
        let s = scorer.score(&RecognitionResult::empty(800, 600));
        assert_eq!(s.score, 0.0);
        assert!(!s.acceptable);
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let config = QualityConfig {
            threshold: 75.0,
            ..QualityConfig::default()
        };
        let scorer = QualityScorer::new(config, "eng");
        assert!(scorer.score(&result("ok then", 75.0, 2)).acceptable);
        assert!(!scorer.score(&result("ok then", 74.9, 2)).acceptable);
    }
}
