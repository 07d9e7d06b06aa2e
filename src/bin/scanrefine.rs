//! CLI binary for scanrefine.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ProcessingConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use scanrefine::{
    Document, DocumentOrchestrator, JsonTableExtractor, NoTableExtractor, PageSelection,
    PageSeparator, PdfiumRasterizer, ProcessingConfig, ProcessingProgressCallback,
    ProgressCallback, QualityProfile, SegmentationMode, TableExtractor, TesseractEngine,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Live progress bar plus one log line per finished page.
///
/// Pages finish out of order, so start times are kept per page.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    retries: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_document_start` tells us the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rasterising PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            retries: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Recognising");
        self.bar.reset_eta();
    }

    fn page_elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ProcessingProgressCallback for CliProgressCallback {
    fn on_document_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_attempt_scored(&self, page_num: usize, attempt: u32, score: f32, acceptable: bool) {
        if attempt > 0 {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }
        if !acceptable {
            self.bar
                .set_message(format!("page {page_num}: attempt {attempt} scored {score:.0}"));
        }
    }

    fn on_page_complete(&self, page_num: usize, total: usize, score: f32, text_len: usize) {
        let secs = self.page_elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("q {score:>5.1}")),
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: String) {
        let secs = self.page_elapsed_secs(page_num);
        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        let retries = self.retries.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} pages recognised  {}",
                green("✔"),
                bold(&success_count.to_string()),
                dim(&format!("({retries} retries)"))
            );
        } else {
            eprintln!(
                "{} {}/{} pages recognised  ({} placeholders, {} retries)",
                if failed == total_pages {
                    red("✘")
                } else {
                    yellow("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
                retries,
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Recognise a scan with the balanced profile (stdout)
  scanrefine scan.pdf

  # Write text to a file
  scanrefine scan.pdf -o scan.txt

  # Spanish fax, best quality, up to 4 retries per page
  scanrefine --profile max --lang spa --max-retries 4 fax.pdf -o fax.txt

  # Quick pass without preprocessing or retries
  scanrefine --profile fast --no-preprocess report.pdf

  # Pages 3 to 9 with page markers, full JSON document
  scanrefine --pages 3-9 --separator marker --json scan.pdf > scan.json

  # Tables from an external extractor
  scanrefine --tables scan.tables.json scan.pdf

  # From a URL
  scanrefine https://example.org/archive/scan.pdf -o scan.txt

PROFILES:
  Profile   DPI  Threshold  Preprocessing                        Retries  Budget
  ───────   ───  ─────────  ───────────────────────────────────  ───────  ──────
  fast      150  50         contrast only                        0        10 min
  balanced  300  60         denoise, contrast, binarize, deskew  2        30 min
  max       600  80         every stage                          3        60 min

TABLES:
  Tables are read from a JSON sidecar next to the PDF (scan.pdf →
  scan.tables.json) unless --tables names another file. Each entry is
  {"page_index": 0, "region": {"x0":0,"y0":0.4,"x1":1,"y1":0.6}, "grid": [["A","B"],["1","2"]]}
  with "region" optional. A missing sidecar means no tables.

ENVIRONMENT VARIABLES:
  TESSERACT_BIN     Path to the tesseract executable
  RUST_LOG          Log filter (overrides -v / -q)

SETUP:
  Install tesseract with the language packs you need
  (e.g. `apt install tesseract-ocr tesseract-ocr-spa`). libpdfium is
  loaded from the working directory or the system library path.
"#;

/// Quality-driven OCR for scanned PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "scanrefine",
    version,
    about = "Quality-driven OCR for scanned PDFs",
    long_about = "Recognise scanned PDF documents with tesseract. Every page is conditioned \
(denoise, contrast, binarization, deskew), scored, and retried with stronger conditioning \
until its quality reaches the threshold. Tables from a JSON sidecar are merged into the text.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write the text (or JSON with --json) to this file instead of stdout.
    #[arg(short, long, env = "SCANREFINE_OUTPUT")]
    output: Option<PathBuf>,

    /// Quality profile: fast, balanced, max.
    #[arg(long, env = "SCANREFINE_PROFILE", value_enum, default_value = "balanced")]
    profile: ProfileArg,

    /// Rendering DPI (72–600). Overrides the profile.
    #[arg(long, env = "SCANREFINE_DPI",
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: Option<u32>,

    /// Recognition language(s), tesseract notation: eng, spa, spa+eng.
    #[arg(short, long, env = "SCANREFINE_LANG", default_value = "eng")]
    lang: String,

    /// Segmentation mode: auto, column, block, line, sparse, or a tesseract psm number.
    #[arg(long, env = "SCANREFINE_PSM", default_value = "auto", value_parser = parse_psm)]
    psm: SegmentationMode,

    /// Retries per page after the first attempt. Overrides the profile.
    #[arg(long, env = "SCANREFINE_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Soft time budget for the whole document, in seconds. Overrides the profile.
    #[arg(long, env = "SCANREFINE_TIME_BUDGET")]
    time_budget: Option<u64>,

    /// Minimum acceptable quality score (0–100). Overrides the profile.
    #[arg(long, env = "SCANREFINE_THRESHOLD")]
    threshold: Option<f32>,

    /// Pages recognised in parallel. Default: number of CPUs.
    #[arg(short, long, env = "SCANREFINE_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "SCANREFINE_PAGES", default_value = "all")]
    pages: String,

    /// Page separator: none, hr, marker, or custom string.
    #[arg(long, env = "SCANREFINE_SEPARATOR", default_value = "none")]
    separator: String,

    /// Disable denoising on the first attempt.
    #[arg(long)]
    no_denoise: bool,

    /// Disable contrast enhancement on the first attempt.
    #[arg(long)]
    no_contrast: bool,

    /// Disable adaptive binarization on the first attempt.
    #[arg(long)]
    no_binarize: bool,

    /// Disable deskew on the first attempt.
    #[arg(long)]
    no_deskew: bool,

    /// Enable morphological cleanup on the first attempt.
    #[arg(long)]
    morphology: bool,

    /// First attempt on the plain grayscale page; retries still escalate.
    #[arg(long)]
    no_preprocess: bool,

    /// Tables JSON file. Default: <input>.tables.json next to the PDF.
    #[arg(long, env = "SCANREFINE_TABLES")]
    tables: Option<PathBuf>,

    /// Skip table extraction.
    #[arg(long)]
    no_tables: bool,

    /// Keep the recognised text exactly as the engine returned it.
    #[arg(long)]
    no_clean: bool,

    /// Path to the tesseract executable.
    #[arg(long, env = "TESSERACT_BIN", default_value = "tesseract")]
    tesseract: PathBuf,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "SCANREFINE_PASSWORD")]
    password: Option<String>,

    /// Output the full Document (pages, tables, metrics) as JSON.
    #[arg(long, env = "SCANREFINE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "SCANREFINE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCANREFINE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCANREFINE_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "SCANREFINE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ProfileArg {
    Fast,
    Balanced,
    Max,
}

impl From<ProfileArg> for QualityProfile {
    fn from(v: ProfileArg) -> Self {
        match v {
            ProfileArg::Fast => QualityProfile::FastProcessing,
            ProfileArg::Balanced => QualityProfile::Balanced,
            ProfileArg::Max => QualityProfile::MaximumQuality,
        }
    }
}

fn parse_psm(s: &str) -> Result<SegmentationMode, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO-level library logs would interleave with the progress bar.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config and collaborators ───────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ProcessingProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    let orchestrator = build_orchestrator(&cli, config);

    // ── Run ──────────────────────────────────────────────────────────────
    let doc = orchestrator
        .process_input(&cli.input)
        .await
        .context("Processing failed")?;

    if let Some(ref output_path) = cli.output {
        let written = if cli.json {
            doc.write_json(output_path).await
        } else {
            doc.write_text(output_path).await
        };
        written.context("Failed to write output")?;
    } else if cli.json {
        let json = serde_json::to_string_pretty(&doc).context("Failed to serialise document")?;
        println!("{json}");
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(doc.full_text.as_bytes())
            .context("Failed to write to stdout")?;
        if !doc.full_text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet {
        print_summary(&doc, cli.output.as_ref(), show_progress);
    }

    Ok(())
}

/// Map CLI args to `ProcessingConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ProcessingConfig> {
    let profile: QualityProfile = cli.profile.clone().into();
    let pages = parse_pages(&cli.pages)?;
    let separator = parse_separator(&cli.separator);

    let mut conditioning = ProcessingConfig::from_profile(profile).conditioning;
    if cli.no_preprocess {
        conditioning.denoise = false;
        conditioning.enhance_contrast = false;
        conditioning.adaptive_binarize = false;
        conditioning.deskew = false;
        conditioning.morphological_cleanup = false;
    }
    if cli.no_denoise {
        conditioning.denoise = false;
    }
    if cli.no_contrast {
        conditioning.enhance_contrast = false;
    }
    if cli.no_binarize {
        conditioning.adaptive_binarize = false;
    }
    if cli.no_deskew {
        conditioning.deskew = false;
    }
    if cli.morphology {
        conditioning.morphological_cleanup = true;
    }

    let mut builder = ProcessingConfig::builder()
        .profile(profile)
        .conditioning(conditioning)
        .language(cli.lang.clone())
        .segmentation_mode(cli.psm)
        .pages(pages)
        .page_separator(separator)
        .extract_tables(!cli.no_tables)
        .clean_text(!cli.no_clean)
        .download_timeout_secs(cli.download_timeout);

    if let Some(dpi) = cli.dpi {
        builder = builder.dpi(dpi);
    }
    if let Some(n) = cli.max_retries {
        builder = builder.max_retries(n);
    }
    if let Some(secs) = cli.time_budget {
        builder = builder.max_processing_time(Duration::from_secs(secs));
    }
    if let Some(t) = cli.threshold {
        builder = builder.quality_threshold(t);
    }
    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn build_orchestrator(cli: &Cli, config: ProcessingConfig) -> DocumentOrchestrator {
    let mut rasterizer = PdfiumRasterizer::new(config.max_rendered_pixels);
    if let Some(ref password) = cli.password {
        rasterizer = rasterizer.with_password(password.clone());
    }
    let engine = TesseractEngine::new()
        .with_binary(cli.tesseract.clone())
        .with_dpi(config.dpi);
    let tables: Arc<dyn TableExtractor> = match (&cli.tables, cli.no_tables) {
        (_, true) => Arc::new(NoTableExtractor),
        (Some(path), false) => Arc::new(JsonTableExtractor::from_file(path.clone())),
        (None, false) => Arc::new(JsonTableExtractor::sidecar()),
    };
    DocumentOrchestrator::new(config, Arc::new(rasterizer), Arc::new(engine), tables)
}

fn print_summary(doc: &Document, output: Option<&PathBuf>, show_progress: bool) {
    let m = &doc.metrics;
    let mark = if m.partial {
        red("✘")
    } else if m.low_quality || m.time_budget_exceeded {
        yellow("⚠")
    } else {
        green("✔")
    };

    if !show_progress {
        eprintln!(
            "{}  {} pages  mean quality {:.1}  {} retries  {} tables  {}ms",
            mark,
            m.processed_pages,
            m.mean_quality,
            m.retries_performed,
            m.table_count,
            m.total_duration_ms
        );
    } else {
        eprintln!(
            "   mean quality {:.1}  {} tables  {} words  {}ms total",
            m.mean_quality,
            m.table_count,
            dim(&m.word_count.to_string()),
            m.total_duration_ms
        );
    }
    for d in &m.degradations {
        eprintln!("   {} {}", yellow("•"), d);
    }
    if let Some(path) = output {
        eprintln!("   → {}", bold(&path.display().to_string()));
    }
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }

        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .context(format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }

        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "none" => PageSeparator::None,
        "hr" | "---" => PageSeparator::HorizontalRule,
        "marker" | "page" => PageSeparator::Marker,
        _ => PageSeparator::Custom(s.to_string()),
    }
}
