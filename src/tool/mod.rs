//! Document tools: the only code that actually touches PDF internals.
//!
//! The pipeline never parses a PDF itself. Everything it needs (page count,
//! page text, page images) comes through the [`DocumentTool`] trait so the
//! selection, retry and cleanup logic can run against a fake in tests and
//! against either backend in production:
//!
//! * [`poppler::PopplerTool`] shells out to `pdfinfo`, `pdftotext` and
//!   `pdftoppm` (default).
//! * [`pdfium::PdfiumTool`] renders in-process through `pdfium-render`
//!   (feature `pdfium`).
//!
//! Page indices are 1-based everywhere in this module.

#[cfg(feature = "pdfium")]
pub mod pdfium;
pub mod poppler;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure of a single tool invocation.
///
/// Whether the failure is fatal for the run or scoped to one page is decided
/// by the caller, not here.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool could not be started (binary missing, not executable, ...).
    #[error("failed to launch '{tool}': {source}")]
    Launch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran and exited unsuccessfully.
    #[error("'{tool}' exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// The tool exceeded the configured ceiling and was killed.
    #[error("'{tool}' timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    /// The tool succeeded but its output could not be interpreted.
    #[error("'{tool}' returned unexpected output: {detail}")]
    InvalidOutput { tool: String, detail: String },

    /// A page index outside `1..=total` was requested.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// An in-process backend reported an error.
    #[error("{backend}: {detail}")]
    Backend { backend: &'static str, detail: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Capabilities the pipeline needs from a PDF toolchain.
///
/// Implementations must be cheap to share: the pipeline holds one behind an
/// `Arc` and calls it from many concurrent page tasks.
#[async_trait]
pub trait DocumentTool: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Total number of pages in `document`.
    async fn page_count(&self, document: &Path) -> Result<usize, ToolError>;

    /// Plain text of one page. Pages without a text layer yield `""`.
    async fn extract_text(&self, document: &Path, page: usize) -> Result<String, ToolError>;

    /// Rasterise every page to `{out_dir}/{prefix}-{N}.png`.
    ///
    /// The numeric suffix may be zero-padded; callers recover page numbers
    /// from the file names rather than relying on directory order.
    async fn rasterize_all(
        &self,
        document: &Path,
        out_dir: &Path,
        prefix: &str,
    ) -> Result<(), ToolError>;

    /// Rasterise one page to `{out_stem}.png` and return that path.
    async fn rasterize_page_to_file(
        &self,
        document: &Path,
        page: usize,
        out_stem: &Path,
    ) -> Result<PathBuf, ToolError>;

    /// Rasterise one page straight into a PNG byte buffer.
    async fn rasterize_page(&self, document: &Path, page: usize) -> Result<Vec<u8>, ToolError>;
}

/// Append `.png` to a path stem without touching dots already in it.
pub(crate) fn png_path(stem: &Path) -> PathBuf {
    let mut os = stem.as_os_str().to_owned();
    os.push(".png");
    PathBuf::from(os)
}
