//! CLI binary for edgequake-pdf2img.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints the run report.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2img::{
    ConversionPipeline, ConversionProgressCallback, Document, FilterPolicy, PipelineConfig,
    ProgressCallback, RasterTarget, RunReport, ToolBackend,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per page. Pages finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_run_start` reports how many pages will be sent.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Selecting pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Uploading");
        self.bar.reset_eta();
    }

    fn elapsed(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .map(|mut t| t.remove(&page_num))
            .ok()
            .flatten()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Sending {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut t) = self.start_times.lock() {
            t.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_delivered(&self, page_num: usize, total: usize, bytes: u64) {
        let secs = self.elapsed(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{:>6} KiB", bytes / 1024)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: String) {
        let secs = self.elapsed(page_num);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
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

    fn on_run_complete(&self, total_pages: usize, delivered: usize) {
        self.bar.finish_and_clear();
        let failed = total_pages.saturating_sub(delivered);
        if failed == 0 {
            eprintln!(
                "{} {} pages delivered",
                green("✔"),
                bold(&delivered.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages delivered  ({} failed)",
                if failed == total_pages { red("✘") } else { cyan("⚠") },
                bold(&delivered.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Every page, uploaded to the default endpoint
  pdf2img report.pdf

  # Only pages mentioning the action plan, never the change history
  pdf2img --include "Plano de Ação" --exclude "Histórico de alterações" report.pdf

  # Preview which pages would be sent, without rendering or uploading
  pdf2img --include "Plano de Ação" --select-only report.pdf

  # Different endpoint, bounded requests, JSON report
  pdf2img --endpoint http://storage:3008/minio/upload --request-timeout 60 --json report.pdf

MATCHING:
  Page text and patterns are compared after removing accents, all whitespace
  and case, so "PLANO DE ACAO" matches "Plano de Ação". A page containing the
  exclusion pattern is skipped even when it also contains the inclusion one.

REQUIREMENTS:
  poppler-utils (pdfinfo, pdftotext, pdftoppm) on $PATH or in --poppler-dir.
  --backend pdfium instead binds libpdfium from PDFIUM_LIB_PATH, the working
  directory, or the system library path.
"#;

/// Select PDF pages by content, rasterise them and upload each image.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2img",
    version,
    about = "Select PDF pages by content, rasterise them to PNG and upload each image",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file.
    input: PathBuf,

    /// Multipart upload endpoint.
    #[arg(long, env = "PDF2IMG_ENDPOINT", default_value = "http://localhost:3008/minio/upload")]
    endpoint: String,

    /// Convert only pages whose text contains this pattern.
    #[arg(long, env = "PDF2IMG_INCLUDE")]
    include: Option<String>,

    /// Skip pages whose text contains this pattern (checked first).
    #[arg(long, env = "PDF2IMG_EXCLUDE")]
    exclude: Option<String>,

    /// Pages processed at once.
    #[arg(short, long, env = "PDF2IMG_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,

    /// Upload retries after the first failed attempt.
    #[arg(long, env = "PDF2IMG_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Delay between upload attempts in milliseconds.
    #[arg(long, env = "PDF2IMG_RETRY_BACKOFF_MS", default_value_t = 0)]
    retry_backoff_ms: u64,

    /// Per-request upload timeout in seconds (default: none).
    #[arg(long, env = "PDF2IMG_REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,

    /// Ceiling for any single poppler invocation in seconds (default: none).
    #[arg(long, env = "PDF2IMG_TOOL_TIMEOUT")]
    tool_timeout: Option<u64>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDF2IMG_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Where single-page renders go before upload.
    #[arg(long, env = "PDF2IMG_RASTER_TARGET", value_enum, default_value = "memory")]
    raster_target: RasterTargetArg,

    /// Rendering backend.
    #[arg(long, env = "PDF2IMG_BACKEND", value_enum, default_value = "poppler")]
    backend: BackendArg,

    /// Directory holding the poppler binaries.
    #[arg(long, env = "PDF2IMG_POPPLER_DIR")]
    poppler_dir: Option<PathBuf>,

    /// Directory the per-run working directory is created in.
    #[arg(long, env = "PDF2IMG_WORK_ROOT")]
    work_root: Option<PathBuf>,

    /// Delete the input PDF when the run ends.
    #[arg(long, env = "PDF2IMG_REMOVE_SOURCE")]
    remove_source: bool,

    /// Exit with an error when every selected page fails.
    #[arg(long, env = "PDF2IMG_FAIL_ON_ALL_FAILED")]
    fail_on_all_failed: bool,

    /// Declared media type of the input (default: guessed from extension).
    #[arg(long, env = "PDF2IMG_MEDIA_TYPE")]
    media_type: Option<String>,

    /// Print the run report as JSON on stdout.
    #[arg(long, env = "PDF2IMG_JSON")]
    json: bool,

    /// Only list the pages that would be sent.
    #[arg(long)]
    select_only: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2IMG_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2IMG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2IMG_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum RasterTargetArg {
    Memory,
    File,
}

impl From<RasterTargetArg> for RasterTarget {
    fn from(v: RasterTargetArg) -> Self {
        match v {
            RasterTargetArg::Memory => RasterTarget::Memory,
            RasterTargetArg::File => RasterTarget::File,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Poppler,
    Pdfium,
}

fn tool_backend(arg: BackendArg) -> Result<ToolBackend> {
    match arg {
        BackendArg::Poppler => Ok(ToolBackend::Poppler),
        #[cfg(feature = "pdfium")]
        BackendArg::Pdfium => Ok(ToolBackend::Pdfium),
        #[cfg(not(feature = "pdfium"))]
        BackendArg::Pdfium => anyhow::bail!("built without the `pdfium` feature"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.select_only;
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    let pipeline =
        ConversionPipeline::from_config(config).context("Failed to set up pipeline")?;

    let mut document = Document::new(&cli.input);
    if let Some(ref media_type) = cli.media_type {
        document = document.with_media_type(media_type.clone());
    }

    // ── Select-only mode ─────────────────────────────────────────────────
    if cli.select_only {
        let result = pipeline
            .select_pages(&document)
            .await
            .context("Page selection failed")?;
        if cli.json {
            let json = serde_json::json!({
                "pages": result.selection.pages(),
                "page_count": result.selection.page_count(),
                "extraction_errors": result.failures,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&json).context("Failed to serialise selection")?
            );
        } else {
            println!("Pages:     {}", result.selection.page_count());
            println!("Selected:  {:?}", result.selection.pages());
            for e in &result.failures {
                println!("Skipped:   {e}");
            }
        }
        return Ok(());
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let report = pipeline.run(&document).await.context("Conversion failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&report, show_progress);
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .endpoint_url(cli.endpoint.clone())
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .request_timeout_secs(cli.request_timeout)
        .tool_timeout_secs(cli.tool_timeout)
        .dpi(cli.dpi)
        .raster_target(cli.raster_target.into())
        .backend(tool_backend(cli.backend)?)
        .remove_source(cli.remove_source)
        .fail_on_all_pages_failed(cli.fail_on_all_failed);

    if cli.include.is_some() || cli.exclude.is_some() {
        builder = builder.filter(FilterPolicy::new(
            cli.include.as_deref().unwrap_or(""),
            cli.exclude.as_deref().unwrap_or(""),
        ));
    }
    if let Some(ref dir) = cli.poppler_dir {
        builder = builder.poppler_dir(dir);
    }
    if let Some(ref dir) = cli.work_root {
        builder = builder.work_root(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(report: &RunReport, show_progress: bool) {
    let stats = &report.stats;
    if !show_progress {
        for o in &report.outcomes {
            match &o.error {
                None => eprintln!(
                    "{} {}  {}",
                    green("✓"),
                    o.file_name,
                    dim(o.response.as_deref().unwrap_or(""))
                ),
                Some(e) => eprintln!("{} {}  {}", red("✗"), o.file_name, red(&e.to_string())),
            }
        }
    }
    for e in &report.extraction_errors {
        eprintln!("{} {}", cyan("⚠"), e);
    }
    let pages = match stats.total_pages {
        Some(total) => format!("{}/{} pages selected", stats.selected_pages, total),
        None => format!("{} pages", stats.selected_pages),
    };
    eprintln!(
        "{}  {}  {} delivered  {} failed  {}ms",
        if stats.failed_pages == 0 { green("✔") } else { cyan("⚠") },
        pages,
        stats.delivered_pages,
        stats.failed_pages,
        stats.total_duration_ms,
    );
}
