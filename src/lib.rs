//! # edgequake-pdf2img
//!
//! Pick the relevant pages of a PDF by their text, rasterise them to PNG and
//! deliver each image to a storage endpoint over HTTP.
//!
//! ## Why filter on text first?
//!
//! Rasterising and uploading a page costs a rasteriser process and a network
//! round trip; extracting its text costs almost nothing. When only a handful
//! of pages in a long document matter (say, the action-plan pages of a
//! report, but not the change-history page that mentions the same words),
//! deciding on text first keeps the expensive work proportional to what is
//! actually wanted.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Validate  media type + %PDF signature
//!  ├─ 2. Select    page count, per-page text, include/exclude filter
//!  │               (skipped without a filter: every page is converted)
//!  ├─ 3. Render    pdftoppm / pdfium, one pass or one page at a time
//!  ├─ 4. Upload    multipart POST per image, bounded retries
//!  └─ 5. Cleanup   source document + working directory, always
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2img::{ConversionPipeline, Document, FilterPolicy, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .endpoint_url("http://localhost:3008/minio/upload")
//!         .filter(FilterPolicy::new("Plano de Ação", "Histórico de alterações"))
//!         .build()?;
//!     let pipeline = ConversionPipeline::from_config(config)?;
//!
//!     let report = pipeline.run(&Document::new("upload/report.pdf")).await?;
//!     for page in report.delivered() {
//!         println!("{} -> {}", page.file_name, page.response.as_deref().unwrap_or(""));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `pdf2img` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `pdfium` | on      | In-process `PdfiumTool` backend via `pdfium-render` |
//!
//! The default backend shells out to poppler-utils (`pdfinfo`, `pdftotext`,
//! `pdftoppm`), which must be installed. Library-only use:
//! ```toml
//! edgequake-pdf2img = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod tool;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder, RasterTarget, ToolBackend};
pub use convert::ConversionPipeline;
pub use error::{PageError, Pdf2ImgError};
pub use output::{PageOutcome, RunMode, RunReport, RunStats};
pub use pipeline::filter::{normalize, FilterPolicy};
pub use pipeline::input::Document;
pub use pipeline::render::{ImageArtifact, ImagePayload, Rasterizer};
pub use pipeline::select::{PageSelection, SelectionResult};
pub use pipeline::upload::{AttemptError, Delivered, DeliveryTarget, HttpTarget, UploadClient};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
#[cfg(feature = "pdfium")]
pub use tool::pdfium::PdfiumTool;
pub use tool::poppler::PopplerTool;
pub use tool::{DocumentTool, ToolError};
