//! Configuration for a conversion-and-delivery run.
//!
//! Everything that used to be a compiled-in constant (endpoint URL, retry
//! count, timeouts, fan-out width) lives in [`PipelineConfig`], built via
//! [`PipelineConfigBuilder`]. Tests swap the endpoint for a local server
//! without touching any code.

use crate::error::Pdf2ImgError;
use crate::pipeline::filter::FilterPolicy;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for a pipeline run.
///
/// # Example
/// ```rust
/// use edgequake_pdf2img::{FilterPolicy, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .endpoint_url("http://storage.internal:3008/minio/upload")
///     .filter(FilterPolicy::new("plano de ação", "histórico de alterações"))
///     .concurrency(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_retries, 2);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Multipart upload endpoint. Default: `http://localhost:3008/minio/upload`.
    pub endpoint_url: String,

    /// Retries after the first failed upload attempt. Default: 2 (3 attempts).
    pub max_retries: u32,

    /// Delay between upload attempts in milliseconds. Default: 0 (immediate).
    pub retry_backoff_ms: u64,

    /// Per-request HTTP timeout in seconds. Default: `None` (wait forever).
    pub request_timeout_secs: Option<u64>,

    /// Pages processed at once (text extraction and render+upload). Default: 8.
    pub concurrency: usize,

    /// Content filter. `None` converts every page in one pass.
    pub filter: Option<FilterPolicy>,

    /// Where single-page renders go. Default: [`RasterTarget::Memory`].
    pub raster_target: RasterTarget,

    /// Which toolchain renders pages. Default: [`ToolBackend::Poppler`].
    pub backend: ToolBackend,

    /// Render resolution. Range: 72–400. Default: 150.
    /// The pdfium backend also caps either edge at 2000 px.
    pub dpi: u32,

    /// Ceiling for any single tool invocation, in seconds. Applies to both
    /// backends; a timed-out pdfium render is abandoned rather than killed.
    /// Default: `None`.
    pub tool_timeout_secs: Option<u64>,

    /// Directory holding `pdfinfo`/`pdftotext`/`pdftoppm`. `None` uses `$PATH`.
    pub poppler_dir: Option<PathBuf>,

    /// Directory per-run working directories are created under. `None` uses
    /// the system temp directory.
    pub work_root: Option<PathBuf>,

    /// Delete the source document when the run ends. Default: true.
    pub remove_source: bool,

    /// Return [`Pdf2ImgError::AllPagesFailed`] when every selected page
    /// fails. Default: false (the report lists the failures instead).
    pub fail_on_all_pages_failed: bool,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:3008/minio/upload".to_string(),
            max_retries: 2,
            retry_backoff_ms: 0,
            request_timeout_secs: None,
            concurrency: 8,
            filter: None,
            raster_target: RasterTarget::default(),
            backend: ToolBackend::default(),
            dpi: 150,
            tool_timeout_secs: None,
            poppler_dir: None,
            work_root: None,
            remove_source: true,
            fail_on_all_pages_failed: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("filter", &self.filter)
            .field("raster_target", &self.raster_target)
            .field("backend", &self.backend)
            .field("dpi", &self.dpi)
            .field("tool_timeout_secs", &self.tool_timeout_secs)
            .field("poppler_dir", &self.poppler_dir)
            .field("work_root", &self.work_root)
            .field("remove_source", &self.remove_source)
            .field("fail_on_all_pages_failed", &self.fail_on_all_pages_failed)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Total upload attempts per artifact.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint_url = url.into();
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn request_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn filter(mut self, policy: FilterPolicy) -> Self {
        self.config.filter = Some(policy);
        self
    }

    pub fn raster_target(mut self, target: RasterTarget) -> Self {
        self.config.raster_target = target;
        self
    }

    pub fn backend(mut self, backend: ToolBackend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn tool_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.tool_timeout_secs = secs;
        self
    }

    pub fn poppler_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.poppler_dir = Some(dir.into());
        self
    }

    pub fn work_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_root = Some(dir.into());
        self
    }

    pub fn remove_source(mut self, v: bool) -> Self {
        self.config.remove_source = v;
        self
    }

    pub fn fail_on_all_pages_failed(mut self, v: bool) -> Self {
        self.config.fail_on_all_pages_failed = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Pdf2ImgError> {
        let c = &self.config;

        let url = reqwest::Url::parse(&c.endpoint_url).map_err(|e| {
            Pdf2ImgError::InvalidConfig(format!("endpoint URL '{}': {e}", c.endpoint_url))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Pdf2ImgError::InvalidConfig(format!(
                "endpoint URL must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if c.dpi < 72 || c.dpi > 400 {
            return Err(Pdf2ImgError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(Pdf2ImgError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if matches!(c.request_timeout_secs, Some(0)) || matches!(c.tool_timeout_secs, Some(0)) {
            return Err(Pdf2ImgError::InvalidConfig(
                "Timeouts must be ≥ 1 second (omit them for no limit)".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Where a single-page render is written before upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RasterTarget {
    /// Capture the rasteriser's stdout; nothing touches disk. (default)
    #[default]
    Memory,
    /// Write `{prefix}-{page}.png` into the run's working directory.
    File,
}

/// Toolchain used for counting, text extraction and rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ToolBackend {
    /// `pdfinfo` / `pdftotext` / `pdftoppm` subprocesses. (default)
    #[default]
    Poppler,
    /// In-process pdfium (feature `pdfium`).
    #[cfg(feature = "pdfium")]
    Pdfium,
}
