//! Input validation: check the caller's document before any tool touches it.
//!
//! ## Why check the magic bytes as well as the media type?
//!
//! The media type is whatever the uploader declared (or what the extension
//! suggests), which says nothing about the content. A renamed `.docx` would
//! otherwise reach `pdftoppm` and fail once per page with an opaque exit
//! status. Reading the first four bytes turns that into one clear
//! [`Pdf2ImgError::NotAPdf`] up front.

use crate::error::Pdf2ImgError;
use crate::tool::{DocumentTool, ToolError};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::debug;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// A local PDF handed to the pipeline.
///
/// The page count is discovered at most once and cached; it never changes
/// afterwards.
#[derive(Debug)]
pub struct Document {
    path: PathBuf,
    media_type: Option<String>,
    page_count: OnceCell<usize>,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            media_type: None,
            page_count: OnceCell::new(),
        }
    }

    /// Media type declared by whoever supplied the file, e.g. the upload's
    /// `Content-Type`. Without one, the type is guessed from the extension.
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn declared_media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    /// Declared media type, else the one guessed from the extension.
    pub fn media_type(&self) -> Option<String> {
        self.media_type.clone().or_else(|| {
            mime_guess::from_path(&self.path)
                .first_raw()
                .map(str::to_string)
        })
    }

    /// Page count, if it has been discovered.
    pub fn known_page_count(&self) -> Option<usize> {
        self.page_count.get().copied()
    }

    /// Ask `tool` for the page count once; later calls return the cached value.
    pub async fn page_count(&self, tool: &dyn DocumentTool) -> Result<usize, ToolError> {
        if let Some(n) = self.page_count.get() {
            return Ok(*n);
        }
        let n = tool.page_count(&self.path).await?;
        // A concurrent caller may have won the race; both saw the same file.
        let _ = self.page_count.set(n);
        Ok(n)
    }

    /// Prefix for artifact names: the file stem with whitespace runs replaced
    /// by `_`.
    pub fn artifact_prefix(&self) -> String {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let prefix = RE_WHITESPACE.replace_all(stem.trim(), "_").into_owned();
        if prefix.is_empty() {
            "document".to_string()
        } else {
            prefix
        }
    }

    /// Check media type, existence, readability and the `%PDF` signature.
    pub async fn validate(&self) -> Result<(), Pdf2ImgError> {
        let path = self.path.clone();

        if let Some(media_type) = self.media_type() {
            if !is_pdf_media_type(&media_type) {
                return Err(Pdf2ImgError::InvalidInput { path, media_type });
            }
        }

        let mut file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Pdf2ImgError::FileNotFound { path });
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(Pdf2ImgError::PermissionDenied { path });
            }
            Err(e) => {
                return Err(Pdf2ImgError::Internal(format!(
                    "cannot open '{}': {e}",
                    path.display()
                )));
            }
        };

        let mut magic = [0u8; 4];
        let mut filled = 0;
        while filled < magic.len() {
            let n = file
                .read(&mut magic[filled..])
                .await
                .map_err(|e| Pdf2ImgError::Internal(format!("cannot read '{}': {e}", path.display())))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if &magic != b"%PDF" {
            return Err(Pdf2ImgError::NotAPdf { path, magic });
        }

        debug!("Validated PDF: {}", path.display());
        Ok(())
    }
}

/// `application/pdf`, ignoring case and parameters (`; charset=...`).
pub fn is_pdf_media_type(media_type: &str) -> bool {
    media_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case(PDF_MEDIA_TYPE))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn media_type_matching() {
        assert!(is_pdf_media_type("application/pdf"));
        assert!(is_pdf_media_type("Application/PDF; charset=binary"));
        assert!(!is_pdf_media_type("image/png"));
        assert!(!is_pdf_media_type(""));
    }

    #[test]
    fn media_type_falls_back_to_extension() {
        assert_eq!(
            Document::new("/tmp/a.pdf").media_type().as_deref(),
            Some("application/pdf")
        );
        assert_eq!(
            Document::new("/tmp/a.txt").media_type().as_deref(),
            Some("text/plain")
        );
        assert_eq!(Document::new("/tmp/upload").media_type(), None);
        assert_eq!(
            Document::new("/tmp/a.txt")
                .with_media_type("application/pdf")
                .media_type()
                .as_deref(),
            Some("application/pdf")
        );
    }

    #[test]
    fn prefix_replaces_whitespace() {
        assert_eq!(
            Document::new("/in/Relatório  Anual\t2024.pdf").artifact_prefix(),
            "Relatório_Anual_2024"
        );
        assert_eq!(Document::new("/in/plain.pdf").artifact_prefix(), "plain");
        assert_eq!(Document::new("/in/ .pdf").artifact_prefix(), "document");
    }

    #[tokio::test]
    async fn accepts_a_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "ok.pdf", b"%PDF-1.7\n...");
        assert!(Document::new(&path).validate().await.is_ok());
    }

    #[tokio::test]
    async fn rejects_declared_non_pdf_before_touching_disk() {
        let err = Document::new("/does/not/exist.pdf")
            .with_media_type("image/jpeg")
            .validate()
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2ImgError::InvalidInput { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn rejects_guessed_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "notes.txt", b"%PDF-1.4");
        let err = Document::new(&path).validate().await.unwrap_err();
        assert!(matches!(err, Pdf2ImgError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn missing_file() {
        let err = Document::new("/does/not/exist.pdf")
            .validate()
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2ImgError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn wrong_magic_and_short_files() {
        let dir = tempfile::tempdir().unwrap();
        let zip = write(dir.path(), "fake.pdf", b"PK\x03\x04rest");
        match Document::new(&zip).validate().await.unwrap_err() {
            Pdf2ImgError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected: {other:?}"),
        }

        let short = write(dir.path(), "short.pdf", b"%P");
        assert!(matches!(
            Document::new(&short).validate().await.unwrap_err(),
            Pdf2ImgError::NotAPdf { .. }
        ));
    }
}
