//! In-process backend built on `pdfium-render`.
//!
//! ## Why spawn_blocking?
//!
//! pdfium keeps thread-local state and every call into it is synchronous and
//! CPU-bound. Each operation binds the library, opens the document and does
//! its work on tokio's blocking pool so page tasks running on the async
//! workers are never stalled by a slow render.
//!
//! Library lookup order: explicit path, `PDFIUM_LIB_PATH`, the working
//! directory, then the system library path.
//!
//! A timeout fails the waiting page, but the blocking render it abandons runs
//! to completion on its pool thread: pdfium calls cannot be interrupted.

use super::{png_path, DocumentTool, ToolError};
use crate::config::PipelineConfig;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const BACKEND: &str = "pdfium";

/// [`DocumentTool`] that renders with a dynamically bound pdfium library.
#[derive(Debug, Clone)]
pub struct PdfiumTool {
    library_dir: Option<PathBuf>,
    password: Option<String>,
    max_rendered_pixels: u32,
    dpi: Option<u32>,
    timeout: Option<Duration>,
}

impl Default for PdfiumTool {
    fn default() -> Self {
        Self {
            library_dir: std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from),
            password: None,
            max_rendered_pixels: 2000,
            dpi: None,
            timeout: None,
        }
    }
}

impl PdfiumTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tool from the pipeline settings (`dpi`, `tool_timeout_secs`).
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            dpi: Some(config.dpi),
            timeout: config.tool_timeout_secs.map(Duration::from_secs),
            ..Self::default()
        }
    }

    /// Directory containing `libpdfium` (or `pdfium.dll`).
    pub fn with_library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.library_dir = Some(dir.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Render at `dpi` instead of fitting the page to the pixel cap.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = Some(dpi);
        self
    }

    /// Give up on any single operation that runs longer than `limit`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Cap on the longest rendered edge, in pixels.
    pub fn with_max_rendered_pixels(mut self, px: u32) -> Self {
        self.max_rendered_pixels = px.max(100);
        self
    }

    /// Run `f` against the opened document on the blocking pool.
    async fn with_document<T, F>(&self, document: &Path, f: F) -> Result<T, ToolError>
    where
        T: Send + 'static,
        F: FnOnce(&PdfDocument<'_>, RenderSize) -> Result<T, ToolError> + Send + 'static,
    {
        let path = document.to_path_buf();
        let this = self.clone();
        let size = RenderSize {
            dpi: self.dpi,
            max_pixels: self.max_rendered_pixels,
        };

        let task = tokio::task::spawn_blocking(move || {
            let pdfium = this.bind()?;
            let doc = pdfium
                .load_pdf_from_file(&path, this.password.as_deref())
                .map_err(backend_err)?;
            f(&doc, size)
        });

        let joined = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| ToolError::Timeout {
                    tool: BACKEND.to_string(),
                    secs: limit.as_secs(),
                })?,
            None => task.await,
        };
        joined.map_err(|e| ToolError::Backend {
            backend: BACKEND,
            detail: format!("render task panicked: {e}"),
        })?
    }

    fn bind(&self) -> Result<Pdfium, ToolError> {
        let explicit = self
            .library_dir
            .as_ref()
            .map(|dir| Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)));

        let bindings = match explicit {
            Some(result) => result,
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| ToolError::Backend {
            backend: BACKEND,
            detail: format!("failed to bind pdfium library: {e:?}"),
        })?;

        Ok(Pdfium::new(bindings))
    }
}

#[async_trait]
impl DocumentTool for PdfiumTool {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn page_count(&self, document: &Path) -> Result<usize, ToolError> {
        self.with_document(document, |doc, _| Ok(doc.pages().len() as usize))
            .await
    }

    async fn extract_text(&self, document: &Path, page: usize) -> Result<String, ToolError> {
        self.with_document(document, move |doc, _| {
            let pdf_page = get_page(doc, page)?;
            // Image-only pages have no text layer; that is not an error.
            Ok(pdf_page.text().map(|t| t.all()).unwrap_or_default())
        })
        .await
    }

    async fn rasterize_all(
        &self,
        document: &Path,
        out_dir: &Path,
        prefix: &str,
    ) -> Result<(), ToolError> {
        let out_dir = out_dir.to_path_buf();
        let prefix = prefix.to_string();

        self.with_document(document, move |doc, size| {
            let total = doc.pages().len() as usize;
            for page in 1..=total {
                let bytes = render_png(doc, page, size)?;
                let path = out_dir.join(format!("{prefix}-{page}.png"));
                std::fs::write(&path, bytes).map_err(|source| ToolError::Io { path, source })?;
            }
            Ok(())
        })
        .await
    }

    async fn rasterize_page_to_file(
        &self,
        document: &Path,
        page: usize,
        out_stem: &Path,
    ) -> Result<PathBuf, ToolError> {
        let bytes = self.rasterize_page(document, page).await?;
        let path = png_path(out_stem);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| ToolError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    async fn rasterize_page(&self, document: &Path, page: usize) -> Result<Vec<u8>, ToolError> {
        self.with_document(document, move |doc, size| render_png(doc, page, size))
            .await
    }
}

fn get_page<'a>(doc: &PdfDocument<'a>, page: usize) -> Result<PdfPage<'a>, ToolError> {
    let total = doc.pages().len() as usize;
    if page == 0 || page > total {
        return Err(ToolError::PageOutOfRange { page, total });
    }
    doc.pages().get((page - 1) as u16).map_err(backend_err)
}

/// Output size: `dpi` scales the page, `max_pixels` bounds either edge.
#[derive(Debug, Clone, Copy)]
struct RenderSize {
    dpi: Option<u32>,
    max_pixels: u32,
}

impl RenderSize {
    fn config(self) -> PdfRenderConfig {
        let max = self.max_pixels as i32;
        match self.dpi {
            Some(dpi) => PdfRenderConfig::new()
                .scale_page_by_factor(dpi as f32 / 72.0)
                .set_maximum_width(max)
                .set_maximum_height(max),
            None => PdfRenderConfig::new()
                .set_target_width(max)
                .set_maximum_height(max),
        }
    }
}

fn render_png(doc: &PdfDocument<'_>, page: usize, size: RenderSize) -> Result<Vec<u8>, ToolError> {
    let render_config = size.config();

    let image: DynamicImage = get_page(doc, page)?
        .render_with_config(&render_config)
        .map_err(backend_err)?
        .as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        page,
        image.width(),
        image.height()
    );

    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| ToolError::Backend {
            backend: BACKEND,
            detail: format!("PNG encoding failed for page {page}: {e}"),
        })?;
    Ok(buf)
}

fn backend_err(e: PdfiumError) -> ToolError {
    ToolError::Backend {
        backend: BACKEND,
        detail: format!("{e:?}"),
    }
}
