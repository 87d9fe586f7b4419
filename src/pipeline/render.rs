//! Rasterisation: turn pages into PNG [`ImageArtifact`]s.
//!
//! Two shapes of output, matching the two run modes:
//!
//! * **whole document**: one tool call writes every page into the working
//!   directory; artifacts are then recovered by scanning the directory.
//! * **single page**: one tool call per selected page, either straight into
//!   memory (default, nothing to clean up) or into the working directory.
//!
//! ## Why parse the page number out of the file name?
//!
//! Directory listings come back in arbitrary order and `pdftoppm` zero-pads
//! its suffix to the width of the page count (`doc-01.png` … `doc-12.png`).
//! The only reliable ordering is the number embedded in each name, so it is
//! parsed and sorted on explicitly.

use crate::tool::{DocumentTool, ToolError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// `-<digits>.png` or bare `.png`, applied to what follows the prefix.
static RE_ARTIFACT_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:-(\d+))?\.png$").unwrap());

/// Where a page image lives until it has been delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    Memory(Vec<u8>),
    File(PathBuf),
}

/// One rendered page, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    /// 1-based source page.
    pub page_num: usize,
    /// Name the image is delivered under; unique within a run.
    pub file_name: String,
    pub payload: ImagePayload,
}

impl ImageArtifact {
    /// `{prefix}-{page}.png`
    pub fn page_file_name(prefix: &str, page: usize) -> String {
        format!("{prefix}-{page}.png")
    }

    /// `{prefix}.png`, used when a run yields one undistinguished image.
    pub fn single_file_name(prefix: &str) -> String {
        format!("{prefix}.png")
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        match &self.payload {
            ImagePayload::File(p) => Some(p),
            ImagePayload::Memory(_) => None,
        }
    }

    /// Remove the backing file. Memory payloads are a no-op.
    pub async fn discard(&self) -> std::io::Result<()> {
        match self.path() {
            Some(p) => tokio::fs::remove_file(p).await,
            None => Ok(()),
        }
    }
}

/// Recover the page number from an artifact file name.
///
/// `doc-7.png` and `doc-007.png` give `Some(7)`; the bare `doc.png` written by
/// single-file rendering gives `Some(1)`; anything else is `None`.
pub fn page_from_file_name(file_name: &str, prefix: &str) -> Option<usize> {
    let rest = file_name.strip_prefix(prefix)?;
    let caps = RE_ARTIFACT_SUFFIX.captures(rest)?;
    match caps.get(1) {
        Some(n) => n.as_str().parse().ok(),
        None => Some(1),
    }
}

/// Where single-page output should go.
#[derive(Debug, Clone, Copy)]
pub enum PageTarget<'a> {
    Memory,
    Directory(&'a Path),
}

/// Rasteriser over any [`DocumentTool`].
#[derive(Clone)]
pub struct Rasterizer {
    tool: Arc<dyn DocumentTool>,
}

impl Rasterizer {
    pub fn new(tool: Arc<dyn DocumentTool>) -> Self {
        Self { tool }
    }

    /// Render every page into `out_dir` and return the artifacts in page
    /// order.
    ///
    /// When exactly one image comes out it is named `{prefix}.png`; otherwise
    /// each is `{prefix}-{page}.png`.
    pub async fn render_all(
        &self,
        document: &Path,
        out_dir: &Path,
        prefix: &str,
    ) -> Result<Vec<ImageArtifact>, ToolError> {
        self.tool.rasterize_all(document, out_dir, prefix).await?;
        let artifacts = collect_artifacts(out_dir, prefix).await?;
        debug!(
            "Rendered {} artifacts into {}",
            artifacts.len(),
            out_dir.display()
        );
        Ok(artifacts)
    }

    /// Render a single page.
    pub async fn render_page(
        &self,
        document: &Path,
        page: usize,
        prefix: &str,
        target: PageTarget<'_>,
    ) -> Result<ImageArtifact, ToolError> {
        let file_name = ImageArtifact::page_file_name(prefix, page);
        let payload = match target {
            PageTarget::Memory => {
                ImagePayload::Memory(self.tool.rasterize_page(document, page).await?)
            }
            PageTarget::Directory(dir) => {
                let stem = dir.join(format!("{prefix}-{page}"));
                ImagePayload::File(
                    self.tool
                        .rasterize_page_to_file(document, page, &stem)
                        .await?,
                )
            }
        };
        Ok(ImageArtifact {
            page_num: page,
            file_name,
            payload,
        })
    }
}

/// Scan `dir` for `{prefix}[-N].png` files, sorted by page number.
pub async fn collect_artifacts(dir: &Path, prefix: &str) -> Result<Vec<ImageArtifact>, ToolError> {
    let io_err = |source: std::io::Error| ToolError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut found: Vec<(usize, PathBuf)> = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(page) = page_from_file_name(name, prefix) {
            found.push((page, entry.path()));
        }
    }
    found.sort_by_key(|(page, _)| *page);

    let single = found.len() == 1;
    Ok(found
        .into_iter()
        .map(|(page_num, path)| ImageArtifact {
            page_num,
            file_name: if single {
                ImageArtifact::single_file_name(prefix)
            } else {
                ImageArtifact::page_file_name(prefix, page_num)
            },
            payload: ImagePayload::File(path),
        })
        .collect())
}
