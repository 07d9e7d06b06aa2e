//! Document processing: the quality-driven retry loop and document assembly.
//!
//! ## Flow
//!
//! ```text
//! PDF ─▶ rasterize ─▶ select pages ─┬─▶ per page (bounded parallel):
//!                                   │     condition ─▶ recognize ─▶ score
//!                                   │        ▲                        │
//!                                   │        └── escalate ◀─ below ───┘
//!                                   │
//!                                   └─▶ extract tables (concurrently)
//!                                              │
//!                      merge tables into page text ─▶ assemble Document
//! ```
//!
//! Only an unreadable source aborts a document. Every other failure (an
//! engine error, a page that never reaches the threshold, a failed table
//! pass, an exhausted time budget) is recorded as a [`Degradation`] and the
//! document is still returned.

use crate::condition::{assess_image_quality, condition_with_report};
use crate::config::ProcessingConfig;
use crate::error::{Degradation, ScanError};
use crate::output::{
    Document, PageOutcome, PageQuality, PageResult, ProcessingMetrics, SkippedStage,
};
use crate::page::PageImage;
use crate::pipeline::{input, postprocess};
use crate::pipeline::render::{PdfiumRasterizer, Rasterizer};
use crate::pipeline::tesseract::TesseractEngine;
use crate::quality::{QualityScore, QualityScorer};
use crate::recognize::{recognize, RecognitionEngine, RecognitionResult};
use crate::tables::{merge_page_text, JsonTableExtractor, Table, TableExtractor};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runs the full pipeline for one PDF at a time.
///
/// Collaborators are injected as trait objects; [`DocumentOrchestrator::with_defaults`]
/// wires up pdfium, the `tesseract` binary and the JSON table sidecar.
///
/// # Example
/// ```rust,no_run
/// use scanrefine::{DocumentOrchestrator, ProcessingConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let orchestrator = DocumentOrchestrator::with_defaults(ProcessingConfig::default());
/// let doc = orchestrator.process("scan.pdf").await?;
/// println!("{}", doc.full_text);
/// eprintln!("retries: {}", doc.metrics.retries_performed);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DocumentOrchestrator {
    config: ProcessingConfig,
    rasterizer: Arc<dyn Rasterizer>,
    engine: Arc<dyn RecognitionEngine>,
    table_extractor: Arc<dyn TableExtractor>,
}

impl std::fmt::Debug for DocumentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentOrchestrator")
            .field("config", &self.config)
            .field("engine", &self.engine.name())
            .finish_non_exhaustive()
    }
}

impl DocumentOrchestrator {
    pub fn new(
        config: ProcessingConfig,
        rasterizer: Arc<dyn Rasterizer>,
        engine: Arc<dyn RecognitionEngine>,
        table_extractor: Arc<dyn TableExtractor>,
    ) -> Self {
        Self {
            config,
            rasterizer,
            engine,
            table_extractor,
        }
    }

    /// pdfium rasteriser, `tesseract` from `PATH`, tables from `<name>.tables.json`.
    pub fn with_defaults(config: ProcessingConfig) -> Self {
        let rasterizer = PdfiumRasterizer::new(config.max_rendered_pixels);
        let engine = TesseractEngine::new().with_dpi(config.dpi);
        Self::new(
            config,
            Arc::new(rasterizer),
            Arc::new(engine),
            Arc::new(JsonTableExtractor::sidecar()),
        )
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Resolve a local path or HTTP(S) URL, then [`process`](Self::process) it.
    pub async fn process_input(&self, input_str: impl AsRef<str>) -> Result<Document, ScanError> {
        let input_str = input_str.as_ref();
        let resolved = input::resolve_input(input_str, self.config.download_timeout_secs).await?;
        self.process(resolved.path()).await
    }

    /// Synchronous wrapper around [`process`](Self::process).
    ///
    /// Creates a temporary tokio runtime internally; do not call it from
    /// inside an async context.
    pub fn process_sync(&self, pdf: impl AsRef<Path>) -> Result<Document, ScanError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| ScanError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.process(pdf))
    }

    /// Process one PDF into a [`Document`].
    ///
    /// # Errors
    /// Returns `Err` only when the document as a whole cannot be processed:
    /// - [`ScanError::SourceUnreadable`]: the PDF cannot be rasterised or has no pages
    /// - [`ScanError::PageOutOfRange`]: the page selection matches no page
    /// - [`ScanError::Internal`]: the rasterisation worker crashed
    pub async fn process(&self, pdf: impl AsRef<Path>) -> Result<Document, ScanError> {
        let total_start = Instant::now();
        let pdf_path = pdf.as_ref().to_path_buf();
        let config = &self.config;
        info!("Starting processing: {}", pdf_path.display());

        // ── Step 1: Rasterise ────────────────────────────────────────────
        let raster_start = Instant::now();
        let rasterizer = Arc::clone(&self.rasterizer);
        let raster_path = pdf_path.clone();
        let dpi = config.dpi;
        let rasters = tokio::task::spawn_blocking(move || rasterizer.rasterize(&raster_path, dpi))
            .await
            .map_err(|e| ScanError::Internal(format!("Rasterisation task panicked: {}", e)))??;
        let rasterize_duration_ms = raster_start.elapsed().as_millis() as u64;

        let total_pages = rasters.len();
        if total_pages == 0 {
            return Err(ScanError::unreadable(
                pdf_path.display().to_string(),
                "document has no pages",
            ));
        }
        info!(
            "Rasterised {} pages at {} DPI in {}ms",
            total_pages, dpi, rasterize_duration_ms
        );

        // ── Step 2: Select pages ─────────────────────────────────────────
        let indices = config.pages.to_indices(total_pages);
        if indices.is_empty() {
            return Err(ScanError::PageOutOfRange { total: total_pages });
        }
        let mut rasters: Vec<Option<PageImage>> = rasters.into_iter().map(Some).collect();
        let selected: Vec<(usize, PageImage)> = indices
            .iter()
            .filter_map(|&idx| rasters[idx].take().map(|img| (idx, img)))
            .collect();
        drop(rasters);
        debug!("Selected {} of {} pages", selected.len(), total_pages);

        if let Some(ref cb) = config.progress_callback {
            cb.on_document_start(selected.len());
        }

        // ── Step 3: Pages and tables, concurrently ───────────────────────
        let ctx = Arc::new(PageContext::new(self, total_start));
        let selected_count = selected.len();

        let pages_future = async {
            let start = Instant::now();
            let pages = process_pages(Arc::clone(&ctx), selected, config.concurrency).await;
            (pages, start.elapsed().as_millis() as u64)
        };
        let tables_future = self.extract_tables(&pdf_path);
        let ((mut pages, recognition_duration_ms), (tables, table_degradation, table_duration_ms)) =
            tokio::join!(pages_future, tables_future);

        // ── Step 4: Merge tables into page text ──────────────────────────
        pages.sort_by_key(|p| p.page_num);
        for page in pages.iter_mut() {
            let on_page: Vec<&Table> = tables
                .iter()
                .filter(|t| table_on_page(t, page.page_num))
                .collect();
            if !on_page.is_empty() {
                page.text = merge_page_text(&page.text, &on_page);
            }
        }
        let orphans: Vec<&Table> = tables
            .iter()
            .filter(|t| !pages.iter().any(|p| table_on_page(t, p.page_num)))
            .collect();
        if !orphans.is_empty() {
            debug!("{} tables reference unprocessed pages", orphans.len());
        }

        // ── Step 5: Assemble ─────────────────────────────────────────────
        let full_text = assemble_document(&pages, &orphans, config);

        let mut metrics = compute_metrics(&pages, total_pages, &tables, table_degradation);
        metrics.total_duration_ms = total_start.elapsed().as_millis() as u64;
        metrics.rasterize_duration_ms = rasterize_duration_ms;
        metrics.recognition_duration_ms = recognition_duration_ms;
        metrics.table_duration_ms = table_duration_ms;

        let success_count = pages.iter().filter(|p| !p.is_placeholder()).count();
        info!(
            "Processing complete: {}/{} pages recognised, {} retries, {} tables, {}ms total",
            success_count,
            selected_count,
            metrics.retries_performed,
            metrics.table_count,
            metrics.total_duration_ms
        );
        if let Some(ref cb) = config.progress_callback {
            cb.on_document_complete(selected_count, success_count);
        }

        Ok(Document {
            name: document_name(&pdf_path),
            full_text,
            tables,
            pages,
            metrics,
        })
    }

    /// Run the table extractor on a blocking thread.
    ///
    /// Returns the tables, the degradation if the pass failed and its duration.
    async fn extract_tables(&self, pdf: &Path) -> (Vec<Table>, Option<Degradation>, u64) {
        if !self.config.extract_tables {
            return (Vec::new(), None, 0);
        }
        let start = Instant::now();
        let extractor = Arc::clone(&self.table_extractor);
        let path = pdf.to_path_buf();
        let outcome = tokio::task::spawn_blocking(move || extractor.extract_tables(&path)).await;
        let elapsed = start.elapsed().as_millis() as u64;

        let detail = match outcome {
            Ok(Ok(tables)) => {
                debug!("Extracted {} tables in {}ms", tables.len(), elapsed);
                return (tables, None, elapsed);
            }
            Ok(Err(e)) => e.message,
            Err(e) => format!("table extraction task panicked: {e}"),
        };
        warn!("Table extraction failed: {}", detail);
        (
            Vec::new(),
            Some(Degradation::TableExtractionFailed { detail }),
            elapsed,
        )
    }
}

// ── Per-page retry loop ──────────────────────────────────────────────────────

/// Everything a page worker needs, shared across blocking threads.
struct PageContext {
    engine: Arc<dyn RecognitionEngine>,
    scorer: QualityScorer,
    config: ProcessingConfig,
    started: Instant,
    deadline: Option<Instant>,
}

impl PageContext {
    fn new(orchestrator: &DocumentOrchestrator, started: Instant) -> Self {
        let config = orchestrator.config.clone();
        Self {
            engine: Arc::clone(&orchestrator.engine),
            scorer: QualityScorer::new(config.quality.clone(), &config.language),
            deadline: started.checked_add(config.max_processing_time),
            config,
            started,
        }
    }

    fn budget_spent(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

async fn process_pages(
    ctx: Arc<PageContext>,
    selected: Vec<(usize, PageImage)>,
    concurrency: usize,
) -> Vec<PageResult> {
    let total = selected.len();
    stream::iter(selected.into_iter().map(|(idx, image)| {
        let ctx = Arc::clone(&ctx);
        let page_num = idx + 1;
        async move {
            let worker_ctx = Arc::clone(&ctx);
            let result =
                tokio::task::spawn_blocking(move || process_page(&worker_ctx, page_num, total, image))
                    .await;
            let page = match result {
                Ok(page) => page,
                Err(e) => {
                    let detail = format!("page worker panicked: {e}");
                    warn!("Page {}: {}", page_num, detail);
                    failed_page(page_num, 0, detail, Duration::ZERO)
                }
            };
            if let Some(ref cb) = ctx.config.progress_callback {
                match page.quality.as_ref().filter(|_| !page.is_placeholder()) {
                    Some(q) => cb.on_page_complete(page_num, total, q.score, page.text.len()),
                    None => cb.on_page_error(page_num, total, page.text.clone()),
                }
            }
            page
        }
    }))
    .buffer_unordered(concurrency.max(1))
    .collect()
    .await
}

/// Condition, recognise and score one page until it is good enough.
///
/// Attempt 0 always runs. Retry `n` runs with `escalation.config_for(n, base)`
/// on the original raster, unless the time budget is already spent. The
/// best-scoring attempt is kept; on equal scores the earlier one wins.
fn process_page(ctx: &PageContext, page_num: usize, total: usize, image: PageImage) -> PageResult {
    let page_start = Instant::now();
    let config = &ctx.config;
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_start(page_num, total);
    }

    let image_quality = assess_image_quality(&image.to_gray());
    debug!(
        page = page_num,
        score = image_quality.score,
        sharpness = image_quality.sharpness,
        noise = image_quality.noise,
        "Raster quality assessed"
    );

    let mut best: Option<(u32, RecognitionResult, QualityScore)> = None;
    let mut skipped_stages = Vec::new();
    let mut attempts = 0u32;
    let mut accepted = false;
    let mut budget_hit = false;
    let mut last_error: Option<String> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 && ctx.budget_spent() {
            budget_hit = true;
            break;
        }

        let conditioning = config.escalation.config_for(attempt, &config.conditioning);
        let report = condition_with_report(&image, &conditioning);
        for (stage, reason) in report.skipped {
            debug!(page = page_num, attempt, %stage, %reason, "Conditioning stage skipped");
            skipped_stages.push(SkippedStage {
                attempt,
                stage,
                reason,
            });
        }
        let conditioned = report.image;
        attempts += 1;

        match recognize(
            ctx.engine.as_ref(),
            &conditioned,
            &config.language,
            config.segmentation_mode,
        ) {
            Ok(result) => {
                let score = ctx.scorer.score(&result);
                debug!(
                    page = page_num,
                    attempt,
                    score = score.score,
                    words = result.word_count,
                    "Attempt scored"
                );
                if let Some(ref cb) = config.progress_callback {
                    cb.on_attempt_scored(page_num, attempt, score.score, score.acceptable);
                }
                let done = score.acceptable;
                let better = best
                    .as_ref()
                    .is_none_or(|(_, _, kept)| score.score > kept.score);
                if better {
                    best = Some((attempt, result, score));
                }
                if done {
                    accepted = true;
                    break;
                }
            }
            Err(e) => {
                warn!("Page {} attempt {}: engine error: {}", page_num, attempt, e);
                last_error = Some(e.message);
            }
        }
    }

    let duration = page_start.elapsed();
    let retries = attempts.saturating_sub(1);
    let mut degradations = Vec::new();
    if budget_hit {
        let elapsed_ms = ctx.elapsed_ms();
        warn!(
            "Page {}: time budget spent after {}ms, retries abandoned",
            page_num, elapsed_ms
        );
        degradations.push(Degradation::TimeBudgetExceeded {
            page: page_num,
            elapsed_ms,
        });
    }

    let Some((best_attempt, recognition, quality)) = best else {
        let detail = last_error.unwrap_or_else(|| "no attempt was run".to_string());
        let mut page = failed_page(page_num, attempts, detail, duration);
        degradations.append(&mut page.degradations);
        page.degradations = degradations;
        page.image_quality = Some(image_quality);
        page.skipped_stages = skipped_stages;
        return page;
    };

    let outcome = if accepted {
        PageOutcome::Accepted
    } else if budget_hit {
        PageOutcome::TimeBudgetExceeded
    } else {
        PageOutcome::RetriesExhausted
    };

    let text = if recognition.has_text() {
        if !accepted {
            warn!(
                "Page {}: accepting best score {:.1} below threshold {:.1}",
                page_num,
                quality.score,
                ctx.scorer.threshold()
            );
            degradations.push(Degradation::LowQualityAccepted {
                page: page_num,
                score: quality.score,
                threshold: ctx.scorer.threshold(),
            });
        }
        if config.clean_text {
            postprocess::clean_text(&recognition.text)
        } else {
            recognition.text.clone()
        }
    } else {
        warn!("Page {}: no text recognised in {} attempts", page_num, attempts);
        degradations.push(Degradation::PageRecognitionFailed {
            page: page_num,
            attempts,
            detail: "no text recognized".to_string(),
        });
        no_text_placeholder(page_num)
    };

    debug!(
        page = page_num,
        attempts,
        best_attempt,
        score = quality.score,
        ?outcome,
        "Page done"
    );

    PageResult {
        page_num,
        text,
        recognition: Some(recognition),
        quality: Some(quality),
        attempts,
        retries,
        best_attempt: Some(best_attempt),
        outcome,
        duration_ms: duration.as_millis() as u64,
        degradations,
        image_quality: Some(image_quality),
        skipped_stages,
    }
}

/// Whether a table's 0-based page index names this 1-indexed page.
fn table_on_page(table: &Table, page_num: usize) -> bool {
    page_num.checked_sub(1) == Some(table.page_index)
}

fn no_text_placeholder(page_num: usize) -> String {
    format!("[page {}: no text recognized]", page_num)
}

fn failed_placeholder(page_num: usize) -> String {
    format!("[page {}: recognition failed]", page_num)
}

/// Page result for a page where no attempt produced a recognition.
fn failed_page(page_num: usize, attempts: u32, detail: String, duration: Duration) -> PageResult {
    PageResult {
        page_num,
        text: failed_placeholder(page_num),
        recognition: None,
        quality: None,
        attempts,
        retries: attempts.saturating_sub(1),
        best_attempt: None,
        outcome: PageOutcome::RecognitionFailed,
        duration_ms: duration.as_millis() as u64,
        degradations: vec![Degradation::PageRecognitionFailed {
            page: page_num,
            attempts,
            detail,
        }],
        image_quality: None,
        skipped_stages: Vec::new(),
    }
}

// ── Assembly ─────────────────────────────────────────────────────────────────

/// Join page texts with the configured separator; tables whose page was
/// not processed follow the last page in extractor order.
fn assemble_document(pages: &[PageResult], orphans: &[&Table], config: &ProcessingConfig) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(pages.len() * 2 + orphans.len());

    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            parts.push(config.page_separator.render(page.page_num));
        }
        parts.push(page.text.clone());
    }

    for table in orphans {
        let rendered = table.to_markdown();
        if rendered.is_empty() {
            continue;
        }
        if !parts.is_empty() {
            parts.push("\n\n".to_string());
        }
        parts.push(rendered);
    }

    parts.join("")
}

fn compute_metrics(
    pages: &[PageResult],
    total_pages: usize,
    tables: &[Table],
    table_degradation: Option<Degradation>,
) -> ProcessingMetrics {
    let per_page_quality: Vec<PageQuality> = pages
        .iter()
        .map(|p| PageQuality {
            page_num: p.page_num,
            score: p.quality.as_ref().map_or(0.0, |q| q.score),
            acceptable: p.quality.as_ref().is_some_and(|q| q.acceptable),
            attempts: p.attempts,
            retries: p.retries,
            outcome: p.outcome,
            image_quality: p.image_quality,
        })
        .collect();

    let scored: Vec<f32> = pages
        .iter()
        .filter_map(|p| p.quality.as_ref().map(|q| q.score))
        .collect();
    let mean_quality = if scored.is_empty() {
        0.0
    } else {
        scored.iter().sum::<f32>() / scored.len() as f32
    };

    let mut degradations: Vec<Degradation> = table_degradation.into_iter().collect();
    degradations.extend(pages.iter().flat_map(|p| p.degradations.iter().cloned()));

    ProcessingMetrics {
        total_pages,
        processed_pages: pages.len(),
        per_page_quality,
        retries_performed: pages.iter().map(|p| p.retries).sum(),
        table_count: tables.len(),
        word_count: pages
            .iter()
            .filter_map(|p| p.recognition.as_ref())
            .map(|r| r.word_count)
            .sum(),
        mean_quality,
        partial: pages.iter().any(|p| p.is_placeholder()),
        low_quality: degradations
            .iter()
            .any(|d| matches!(d, Degradation::LowQualityAccepted { .. })),
        time_budget_exceeded: degradations
            .iter()
            .any(|d| matches!(d, Degradation::TimeBudgetExceeded { .. })),
        degradations,
        ..ProcessingMetrics::default()
    }
}

fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
