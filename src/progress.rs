//! Progress-callback trait for per-page pipeline events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to observe a
//! run as it happens: the CLI drives its progress bar from these events, a
//! service could forward them to a job table or a websocket.
//!
//! Pages are processed concurrently, so `on_page_*` may be called from
//! several tasks at once and out of page order. Implementations guard their
//! own state (`Mutex`, atomics).
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2img::{ConversionProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Delivered(AtomicUsize);
//!
//! impl ConversionProgressCallback for Delivered {
//!     fn on_page_delivered(&self, page_num: usize, total: usize, bytes: u64) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {page_num}/{total} stored ({bytes} bytes)");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(Delivered(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Receives pipeline events. Every method defaults to a no-op.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once the set of pages to convert is known.
    ///
    /// In whole-document mode this fires after rendering, with the number of
    /// images produced; in selective mode after filtering, with the number of
    /// qualifying pages.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when work on a page begins (render, or upload for pre-rendered
    /// pages).
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page image has been accepted by the endpoint.
    fn on_page_delivered(&self, page_num: usize, total_pages: usize, bytes: u64) {
        let _ = (page_num, total_pages, bytes);
    }

    /// Called when a page fails to render or exhausts its upload attempts.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: String) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page has been attempted, before cleanup.
    fn on_run_complete(&self, total_pages: usize, delivered: usize) {
        let _ = (total_pages, delivered);
    }
}

/// A callback that ignores every event.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
