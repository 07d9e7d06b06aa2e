//! Configuration types for document processing.
//!
//! All processing behaviour is controlled through [`ProcessingConfig`], built
//! via its [`ProcessingConfigBuilder`]. One struct holds every knob so a
//! config can be shared across worker threads and logged as a whole.

use crate::condition::ConditioningConfig;
use crate::error::ScanError;
use crate::escalation::{EscalationPolicy, NoEscalation, ProgressiveEscalation};
use crate::progress::ProgressCallback;
use crate::quality::QualityConfig;
use crate::recognize::SegmentationMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for processing one PDF.
///
/// Built via [`ProcessingConfig::builder()`] or using
/// [`ProcessingConfig::default()`].
///
/// # Example
/// ```rust
/// use scanrefine::{ProcessingConfig, QualityProfile};
/// use std::time::Duration;
///
/// let config = ProcessingConfig::builder()
///     .profile(QualityProfile::MaximumQuality)
///     .language("spa")
///     .max_retries(4)
///     .max_processing_time(Duration::from_secs(600))
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 600);
/// ```
#[derive(Clone)]
pub struct ProcessingConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Cap on either rendered dimension, in pixels. Default: 7200.
    ///
    /// Pages whose rendering at `dpi` would exceed the cap are scaled down
    /// proportionally.
    pub max_rendered_pixels: u32,

    /// Recognition language in Tesseract notation (`eng`, `spa`, `spa+eng`). Default: `eng`.
    ///
    /// Also selects the alphabet used by the gibberish check in
    /// [`crate::quality::QualityScorer`].
    pub language: String,

    /// Layout hint for the engine. Default: [`SegmentationMode::Auto`].
    pub segmentation_mode: SegmentationMode,

    /// Conditioning used on the first attempt and handed to the escalation
    /// policy as the base for retries.
    pub conditioning: ConditioningConfig,

    /// Quality threshold and scoring weights.
    pub quality: QualityConfig,

    /// Retries per page after the first attempt. Default: 2.
    ///
    /// A page runs at most `max_retries + 1` attempts.
    pub max_retries: u32,

    /// Soft wall-clock budget for the whole document. Default: 30 minutes.
    ///
    /// Checked before each retry. Every page always gets its first attempt;
    /// once the budget is spent no further retries start and the affected
    /// pages are flagged in the metrics.
    pub max_processing_time: Duration,

    /// Pages processed in parallel. Default: number of CPUs (at least 1).
    pub concurrency: usize,

    /// Run the table extractor and merge its tables into the text. Default: true.
    pub extract_tables: bool,

    /// Normalise recognised text (line endings, spacing, hyphenation). Default: true.
    pub clean_text: bool,

    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// Page separator in the assembled text. Default: None.
    pub page_separator: PageSeparator,

    /// Decides the conditioning of each retry. Default: [`ProgressiveEscalation`].
    pub escalation: Arc<dyn EscalationPolicy>,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 7200,
            language: "eng".to_string(),
            segmentation_mode: SegmentationMode::default(),
            conditioning: ConditioningConfig::default(),
            quality: QualityConfig::default(),
            max_retries: 2,
            max_processing_time: Duration::from_secs(30 * 60),
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            extract_tables: true,
            clean_text: true,
            pages: PageSelection::default(),
            page_separator: PageSeparator::default(),
            escalation: Arc::new(ProgressiveEscalation::default()),
            progress_callback: None,
            download_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for ProcessingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("language", &self.language)
            .field("segmentation_mode", &self.segmentation_mode)
            .field("conditioning", &self.conditioning)
            .field("quality", &self.quality)
            .field("max_retries", &self.max_retries)
            .field("max_processing_time", &self.max_processing_time)
            .field("concurrency", &self.concurrency)
            .field("extract_tables", &self.extract_tables)
            .field("clean_text", &self.clean_text)
            .field("pages", &self.pages)
            .field("page_separator", &self.page_separator)
            .field("escalation", &"<dyn EscalationPolicy>")
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ProcessingProgressCallback>"),
            )
            .finish()
    }
}

impl ProcessingConfig {
    /// Create a new builder for `ProcessingConfig`.
    pub fn builder() -> ProcessingConfigBuilder {
        ProcessingConfigBuilder {
            config: Self::default(),
        }
    }

    /// Default config with a quality profile applied.
    pub fn from_profile(profile: QualityProfile) -> Self {
        let mut config = Self::default();
        profile.apply(&mut config);
        config
    }
}

/// Builder for [`ProcessingConfig`].
#[derive(Debug)]
pub struct ProcessingConfigBuilder {
    config: ProcessingConfig,
}

impl ProcessingConfigBuilder {
    /// Apply a preset. Setters called afterwards override it.
    pub fn profile(mut self, profile: QualityProfile) -> Self {
        profile.apply(&mut self.config);
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.language = language.into();
        self
    }

    pub fn segmentation_mode(mut self, mode: SegmentationMode) -> Self {
        self.config.segmentation_mode = mode;
        self
    }

    pub fn conditioning(mut self, conditioning: ConditioningConfig) -> Self {
        self.config.conditioning = conditioning;
        self
    }

    pub fn quality(mut self, quality: QualityConfig) -> Self {
        self.config.quality = quality;
        self
    }

    pub fn quality_threshold(mut self, threshold: f32) -> Self {
        self.config.quality.threshold = threshold.clamp(0.0, 100.0);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn max_processing_time(mut self, budget: Duration) -> Self {
        self.config.max_processing_time = budget;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn extract_tables(mut self, v: bool) -> Self {
        self.config.extract_tables = v;
        self
    }

    pub fn clean_text(mut self, v: bool) -> Self {
        self.config.clean_text = v;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn escalation(mut self, policy: Arc<dyn EscalationPolicy>) -> Self {
        self.config.escalation = policy;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessingConfig, ScanError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(ScanError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(ScanError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.language.trim().is_empty() {
            return Err(ScanError::InvalidConfig("Language must not be empty".into()));
        }
        if !(0.0..=100.0).contains(&c.quality.threshold) {
            return Err(ScanError::InvalidConfig(format!(
                "Quality threshold must be 0–100, got {}",
                c.quality.threshold
            )));
        }
        if !c.conditioning.scale.is_finite() || c.conditioning.scale <= 0.0 {
            return Err(ScanError::InvalidConfig(format!(
                "Conditioning scale must be positive, got {}",
                c.conditioning.scale
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Preset trade-offs between speed and recognition quality.
///
/// | Profile | DPI | Threshold | Preprocessing | Retries | Budget |
/// |---------|-----|-----------|---------------|---------|--------|
/// | `MaximumQuality` | 600 | 80 | every stage | 3 | 60 min |
/// | `Balanced` | 300 | 60 | denoise, contrast, binarize, deskew | 2 | 30 min |
/// | `FastProcessing` | 150 | 50 | contrast only | 0 | 10 min |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityProfile {
    MaximumQuality,
    #[default]
    Balanced,
    FastProcessing,
}

impl QualityProfile {
    fn apply(self, config: &mut ProcessingConfig) {
        match self {
            QualityProfile::MaximumQuality => {
                config.dpi = 600;
                config.quality.threshold = 80.0;
                config.conditioning = ConditioningConfig::full();
                config.max_retries = 3;
                config.max_processing_time = Duration::from_secs(60 * 60);
                config.escalation = Arc::new(ProgressiveEscalation::default());
            }
            QualityProfile::Balanced => {
                config.dpi = 300;
                config.quality.threshold = 60.0;
                config.conditioning = ConditioningConfig::default();
                config.max_retries = 2;
                config.max_processing_time = Duration::from_secs(30 * 60);
                config.escalation = Arc::new(ProgressiveEscalation::default());
            }
            QualityProfile::FastProcessing => {
                config.dpi = 150;
                config.quality.threshold = 50.0;
                config.conditioning = ConditioningConfig {
                    enhance_contrast: true,
                    ..ConditioningConfig::none()
                };
                config.max_retries = 0;
                config.max_processing_time = Duration::from_secs(10 * 60);
                config.escalation = Arc::new(NoEscalation);
            }
        }
    }
}

impl FromStr for QualityProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "maximum_quality" | "max" | "maximum" => Ok(QualityProfile::MaximumQuality),
            "balanced" => Ok(QualityProfile::Balanced),
            "fast_processing" | "fast" => Ok(QualityProfile::FastProcessing),
            other => Err(format!("unknown quality profile '{other}'")),
        }
    }
}

/// Specifies which pages of the PDF to process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Process all pages (default).
    #[default]
    All,
    /// Process a single page (1-indexed).
    Single(usize),
    /// Process a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Process specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

/// How to separate pages in the assembled text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSeparator {
    /// No separator; pages joined with "\n\n". (default)
    #[default]
    None,
    /// Horizontal rule: "\n\n---\n\n"
    HorizontalRule,
    /// Page marker line: "--- page N ---"
    Marker,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator placed before the given page (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Marker => format!("\n\n--- page {} ---\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}
