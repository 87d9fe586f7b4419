//! Error types for the edgequake-pdf2img library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2ImgError`] is **fatal**: the run cannot proceed at all (not a PDF,
//!   page count unavailable, working directory cannot be created). Returned
//!   as `Err(Pdf2ImgError)` from [`crate::ConversionPipeline::run`].
//!
//! * [`PageError`] is **non-fatal**: one page failed (text unreadable,
//!   rasteriser crashed, upload exhausted its retries) while the other pages
//!   carry on. Stored inside [`crate::output::PageOutcome`].
//!
//! Cleanup failures are neither: they are logged and never replace the
//! run's real result.

use crate::tool::ToolError;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2img library.
#[derive(Debug, Error)]
pub enum Pdf2ImgError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The declared (or guessed) media type is not `application/pdf`.
    #[error("'{path}' is not a PDF (media type: {media_type})")]
    InvalidInput { path: PathBuf, media_type: String },

    /// The file claims to be a PDF but does not start with `%PDF`.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Tool errors ───────────────────────────────────────────────────────
    /// Page count could not be determined; nothing can be selected.
    #[error("Could not count pages of '{path}': {source}")]
    PageCountFailed {
        path: PathBuf,
        #[source]
        source: ToolError,
    },

    /// Whole-document rasterisation failed before producing any artifact.
    #[error("Rasterisation of '{path}' failed: {source}")]
    RasterisationFailed {
        path: PathBuf,
        #[source]
        source: ToolError,
    },

    // ── Run errors ────────────────────────────────────────────────────────
    /// Could not create the per-run working directory.
    #[error("Failed to create working directory under '{path}': {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every selected page failed and the run is configured to treat that as
    /// an error.
    #[error("All {total} pages failed.\nFirst error: {first_error}")]
    AllPagesFailed { total: usize, first_error: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The page's text could not be read, so it could not be filtered.
    #[error("Page {page}: text extraction failed: {detail}")]
    TextExtractionFailed { page: usize, detail: String },

    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// Upload failed on every attempt; `detail` is the last attempt's error.
    #[error("Page {page}: upload failed after {attempts} attempts: {detail}")]
    DeliveryFailed {
        page: usize,
        attempts: u32,
        detail: String,
    },
}

impl PageError {
    /// The 1-based page this error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::TextExtractionFailed { page, .. }
            | PageError::RenderFailed { page, .. }
            | PageError::DeliveryFailed { page, .. } => *page,
        }
    }
}
