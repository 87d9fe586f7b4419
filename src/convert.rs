//! The conversion-and-delivery run.
//!
//! ```text
//! Start ─▶ Validating ─┬─────────────────────────────▶ Converting-All ──────┐
//!                      │ (filter configured)                                ├─▶ Uploading ─▶ CleaningUp ─▶ Done
//!                      └─▶ CountingPages ─▶ Filtering ─▶ Converting-Selected┘
//! ```
//!
//! Any step can end in an error; cleanup still runs.
//!
//! ## Why a cleanup guard?
//!
//! The source document and the per-run working directory must be gone after
//! every run: success, fatal error, or the caller dropping the future half
//! way through. [`RunGuard`] owns both. The normal path calls
//! [`RunGuard::cleanup`] after the last page task has finished; if the run is
//! cancelled instead, `Drop` does the same work synchronously. Cleanup
//! failures are logged and never replace the run's own result.

use crate::config::{PipelineConfig, RasterTarget, ToolBackend};
use crate::error::{PageError, Pdf2ImgError};
use crate::output::{PageOutcome, RunMode, RunReport, RunStats};
use crate::pipeline::filter::FilterPolicy;
use crate::pipeline::input::Document;
use crate::pipeline::render::{ImageArtifact, ImagePayload, PageTarget, Rasterizer};
use crate::pipeline::select::{self, PageSelection, SelectionResult};
use crate::pipeline::upload::{DeliveryTarget, HttpTarget, UploadClient};
use crate::tool::poppler::PopplerTool;
use crate::tool::DocumentTool;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Prefix of every per-run working directory.
pub const WORK_DIR_PREFIX: &str = "pdf2img-";

/// Runs documents through select → render → upload.
///
/// Cheap to share: one pipeline can serve many documents, sequentially or
/// from concurrent tasks.
#[derive(Clone)]
pub struct ConversionPipeline {
    config: PipelineConfig,
    tool: Arc<dyn DocumentTool>,
    uploader: UploadClient,
}

impl ConversionPipeline {
    /// Assemble a pipeline from explicit collaborators.
    pub fn new(
        config: PipelineConfig,
        tool: Arc<dyn DocumentTool>,
        target: Arc<dyn DeliveryTarget>,
    ) -> Self {
        let uploader = UploadClient::from_config(target, &config);
        Self {
            config,
            tool,
            uploader,
        }
    }

    /// Production pipeline: the configured backend plus [`HttpTarget`].
    pub fn from_config(config: PipelineConfig) -> Result<Self, Pdf2ImgError> {
        let tool: Arc<dyn DocumentTool> = match config.backend {
            ToolBackend::Poppler => Arc::new(PopplerTool::from_config(&config)),
            #[cfg(feature = "pdfium")]
            ToolBackend::Pdfium => {
                Arc::new(crate::tool::pdfium::PdfiumTool::from_config(&config))
            }
        };
        let target = Arc::new(HttpTarget::from_config(&config)?);
        Ok(Self::new(config, tool, target))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Convert `document` and deliver every resulting image.
    ///
    /// # Returns
    /// `Ok(RunReport)` whenever the document itself could be processed, even
    /// if individual pages failed (see [`RunReport::failed`]). An empty
    /// selection is a successful run with no outcomes.
    ///
    /// # Errors
    /// Fatal, document-level failures only: invalid input, page count
    /// unavailable, whole-document rasterisation failed, working directory
    /// unavailable, and [`Pdf2ImgError::AllPagesFailed`] when
    /// `fail_on_all_pages_failed` is set.
    ///
    /// The source document (when `remove_source` is on) and the working
    /// directory are removed before this returns, whatever the result.
    pub async fn run(&self, document: &Document) -> Result<RunReport, Pdf2ImgError> {
        let started = Instant::now();
        info!("Starting run: {}", document.path().display());

        let source = self
            .config
            .remove_source
            .then(|| document.path().to_path_buf());
        let mut guard = RunGuard::new(source);

        let result = self.execute(document, &mut guard, started).await;
        guard.cleanup().await;

        match &result {
            Ok(report) => info!(
                "Run complete: {}/{} pages delivered, {}ms",
                report.stats.delivered_pages,
                report.stats.selected_pages,
                report.stats.total_duration_ms
            ),
            Err(e) => warn!("Run failed: {}", e),
        }
        result
    }

    /// Synchronous wrapper around [`ConversionPipeline::run`].
    ///
    /// Creates a temporary tokio runtime internally; do not call from inside
    /// an async context.
    pub fn run_sync(&self, document: &Document) -> Result<RunReport, Pdf2ImgError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| Pdf2ImgError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.run(document))
    }

    /// Run only validation, page counting and filtering.
    ///
    /// Nothing is rendered, uploaded or deleted. Without a configured filter
    /// every page is selected.
    pub async fn select_pages(&self, document: &Document) -> Result<SelectionResult, Pdf2ImgError> {
        document.validate().await?;
        let page_count = self.count_pages(document).await?;
        Ok(match &self.config.filter {
            Some(policy) => {
                select::select_pages(
                    &self.tool,
                    document.path(),
                    page_count,
                    policy,
                    self.config.concurrency,
                )
                .await
            }
            None => SelectionResult {
                selection: PageSelection::all(page_count),
                failures: Vec::new(),
            },
        })
    }

    // ── Run body ─────────────────────────────────────────────────────────

    async fn execute(
        &self,
        document: &Document,
        guard: &mut RunGuard,
        started: Instant,
    ) -> Result<RunReport, Pdf2ImgError> {
        // ── Step 1: Validate ─────────────────────────────────────────────
        document.validate().await?;

        // ── Step 2: Working directory ────────────────────────────────────
        let work_dir = guard
            .create_work_dir(self.config.work_root.as_deref())?
            .to_path_buf();
        let prefix = document.artifact_prefix();
        debug!("Working directory: {}", work_dir.display());

        // ── Step 3: Convert + upload ─────────────────────────────────────
        let mut report = match &self.config.filter {
            None => self.run_whole(document, &work_dir, &prefix).await?,
            Some(policy) => {
                self.run_selective(document, policy, &work_dir, &prefix)
                    .await?
            }
        };
        report.outcomes.sort_by_key(|o| o.page_num);
        report.stats.delivered_pages = report.delivered().count();
        report.stats.failed_pages = report.failed().count();
        report.stats.total_duration_ms = started.elapsed().as_millis() as u64;

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_complete(report.outcomes.len(), report.stats.delivered_pages);
        }

        // ── Step 4: All-failed policy ────────────────────────────────────
        if self.config.fail_on_all_pages_failed
            && !report.outcomes.is_empty()
            && report.stats.delivered_pages == 0
        {
            let first_error = report
                .outcomes
                .iter()
                .find_map(|o| o.error.as_ref())
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(Pdf2ImgError::AllPagesFailed {
                total: report.outcomes.len(),
                first_error,
            });
        }

        Ok(report)
    }

    /// No filter: one rasteriser call for the whole document, then one upload
    /// per produced image.
    async fn run_whole(
        &self,
        document: &Document,
        work_dir: &Path,
        prefix: &str,
    ) -> Result<RunReport, Pdf2ImgError> {
        let convert_start = Instant::now();
        let rasterizer = Rasterizer::new(Arc::clone(&self.tool));
        let artifacts = rasterizer
            .render_all(document.path(), work_dir, prefix)
            .await
            .map_err(|source| Pdf2ImgError::RasterisationFailed {
                path: document.path().to_path_buf(),
                source,
            })?;
        let total = artifacts.len();
        info!("Rendered {} pages with {}", total, self.tool.name());

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_start(total);
        }

        let outcomes: Vec<PageOutcome> = stream::iter(artifacts.into_iter().map(|artifact| async move {
            let started = Instant::now();
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_page_start(artifact.page_num, total);
            }
            self.deliver(artifact, total, started).await
        }))
        .buffer_unordered(self.config.concurrency)
        .collect()
        .await;

        Ok(RunReport {
            mode: RunMode::WholeDocument,
            prefix: prefix.to_string(),
            outcomes,
            extraction_errors: Vec::new(),
            stats: RunStats {
                total_pages: None,
                selected_pages: total,
                convert_duration_ms: convert_start.elapsed().as_millis() as u64,
                ..RunStats::default()
            },
        })
    }

    /// Filter configured: count, extract and filter, then render and upload
    /// each qualifying page as one concurrent unit.
    async fn run_selective(
        &self,
        document: &Document,
        policy: &FilterPolicy,
        work_dir: &Path,
        prefix: &str,
    ) -> Result<RunReport, Pdf2ImgError> {
        let select_start = Instant::now();
        let page_count = self.count_pages(document).await?;
        info!("{} has {} pages", document.path().display(), page_count);

        let SelectionResult {
            selection,
            failures,
        } = select::select_pages(
            &self.tool,
            document.path(),
            page_count,
            policy,
            self.config.concurrency,
        )
        .await;
        let select_duration_ms = select_start.elapsed().as_millis() as u64;
        info!(
            "{} of {} pages qualify: {:?}",
            selection.len(),
            page_count,
            selection.pages()
        );

        let total = selection.len();
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_start(total);
        }

        let convert_start = Instant::now();
        let target = match self.config.raster_target {
            RasterTarget::Memory => PageTarget::Memory,
            RasterTarget::File => PageTarget::Directory(work_dir),
        };
        let rasterizer = Rasterizer::new(Arc::clone(&self.tool));
        let rasterizer = &rasterizer;

        let outcomes: Vec<PageOutcome> =
            stream::iter(selection.pages().iter().copied().map(|page| async move {
                let started = Instant::now();
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_page_start(page, total);
                }
                match rasterizer
                    .render_page(document.path(), page, prefix, target)
                    .await
                {
                    Ok(artifact) => self.deliver(artifact, total, started).await,
                    Err(e) => {
                        warn!("Page {}: rasterisation failed: {}", page, e);
                        let error = PageError::RenderFailed {
                            page,
                            detail: e.to_string(),
                        };
                        self.report_error(page, total, &error);
                        PageOutcome {
                            page_num: page,
                            file_name: ImageArtifact::page_file_name(prefix, page),
                            response: None,
                            attempts: 0,
                            bytes: 0,
                            duration_ms: started.elapsed().as_millis() as u64,
                            error: Some(error),
                        }
                    }
                }
            }))
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        Ok(RunReport {
            mode: RunMode::Selective,
            prefix: prefix.to_string(),
            outcomes,
            stats: RunStats {
                total_pages: Some(page_count),
                selected_pages: total,
                extraction_failures: failures.len(),
                select_duration_ms,
                convert_duration_ms: convert_start.elapsed().as_millis() as u64,
                ..RunStats::default()
            },
            extraction_errors: failures,
        })
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    async fn count_pages(&self, document: &Document) -> Result<usize, Pdf2ImgError> {
        document
            .page_count(self.tool.as_ref())
            .await
            .map_err(|source| Pdf2ImgError::PageCountFailed {
                path: document.path().to_path_buf(),
                source,
            })
    }

    /// Upload one artifact and record the outcome. A file-backed artifact is
    /// removed once its upload has finished either way.
    async fn deliver(&self, artifact: ImageArtifact, total: usize, started: Instant) -> PageOutcome {
        let bytes = match &artifact.payload {
            ImagePayload::Memory(b) => b.len() as u64,
            ImagePayload::File(p) => tokio::fs::metadata(p).await.map(|m| m.len()).unwrap_or(0),
        };

        let result = self.uploader.upload(&artifact).await;

        if let Err(e) = artifact.discard().await {
            warn!("Could not remove {}: {}", artifact.file_name, e);
        }

        let page_num = artifact.page_num;
        let duration_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(delivered) => {
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_page_delivered(page_num, total, bytes);
                }
                PageOutcome {
                    page_num,
                    file_name: artifact.file_name,
                    response: Some(delivered.response),
                    attempts: delivered.attempts,
                    bytes,
                    duration_ms,
                    error: None,
                }
            }
            Err(error) => {
                self.report_error(page_num, total, &error);
                let attempts = match &error {
                    PageError::DeliveryFailed { attempts, .. } => *attempts,
                    _ => self.config.max_attempts(),
                };
                PageOutcome {
                    page_num,
                    file_name: artifact.file_name,
                    response: None,
                    attempts,
                    bytes,
                    duration_ms,
                    error: Some(error),
                }
            }
        }
    }

    fn report_error(&self, page: usize, total: usize, error: &PageError) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_page_error(page, total, error.to_string());
        }
    }
}

// ── Cleanup ──────────────────────────────────────────────────────────────

/// Owns everything a run must remove when it ends.
struct RunGuard {
    source: Option<PathBuf>,
    work_dir: Option<TempDir>,
}

impl RunGuard {
    fn new(source: Option<PathBuf>) -> Self {
        Self {
            source,
            work_dir: None,
        }
    }

    /// Create the run's `pdf2img-*` directory under `root` (or the system
    /// temp directory).
    fn create_work_dir(&mut self, root: Option<&Path>) -> Result<&Path, Pdf2ImgError> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix(WORK_DIR_PREFIX);
            b
        };
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|source| Pdf2ImgError::WorkDir {
            path: root.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir),
            source,
        })?;
        Ok(self.work_dir.insert(dir).path())
    }

    async fn cleanup(mut self) {
        if let Some(dir) = self.work_dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!("Removed working directory {}", path.display()),
                Err(e) => warn!("Could not remove working directory {}: {}", path.display(), e),
            }
        }
        if let Some(source) = self.source.take() {
            match tokio::fs::remove_file(&source).await {
                Ok(()) => debug!("Removed source document {}", source.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Source document {} already gone", source.display())
                }
                Err(e) => warn!("Could not remove source document {}: {}", source.display(), e),
            }
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        // Only reached with work left when the run future was dropped early.
        if let Some(dir) = self.work_dir.take() {
            if let Err(e) = dir.close() {
                warn!("Could not remove working directory: {}", e);
            }
        }
        if let Some(source) = self.source.take() {
            if let Err(e) = std::fs::remove_file(&source) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not remove source document {}: {}", source.display(), e);
                }
            }
        }
    }
}
