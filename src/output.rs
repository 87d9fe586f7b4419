//! Result types returned by a pipeline run.

use crate::error::PageError;
use serde::{Deserialize, Serialize};

/// Which path the run took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// No filter configured: every page rendered in one pass.
    WholeDocument,
    /// Filter configured: only qualifying pages rendered, one by one.
    Selective,
}

/// Delivery result for one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageOutcome {
    /// 1-based page number.
    pub page_num: usize,
    /// Name the image was (or would have been) uploaded under.
    pub file_name: String,
    /// Response body from the storage endpoint, verbatim. `None` on failure.
    pub response: Option<String>,
    /// Upload attempts made; 0 when the page failed before upload.
    pub attempts: u32,
    /// Size of the uploaded image in bytes.
    pub bytes: u64,
    /// Wall-clock time for render + upload of this page.
    pub duration_ms: u64,
    pub error: Option<PageError>,
}

impl PageOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate counters for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Page count of the document; `None` in whole-document mode, which
    /// never asks for it.
    pub total_pages: Option<usize>,
    /// Pages that went on to conversion.
    pub selected_pages: usize,
    pub delivered_pages: usize,
    pub failed_pages: usize,
    /// Pages left out because their text could not be read.
    pub extraction_failures: usize,
    pub select_duration_ms: u64,
    pub convert_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: RunMode,
    /// Prefix used for artifact names.
    pub prefix: String,
    /// One entry per converted page, sorted by `page_num`.
    pub outcomes: Vec<PageOutcome>,
    /// Text-extraction failures from the selection stage, sorted by page.
    pub extraction_errors: Vec<PageError>,
    pub stats: RunStats,
}

impl RunReport {
    /// Outcomes that were delivered.
    pub fn delivered(&self) -> impl Iterator<Item = &PageOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    /// Outcomes that failed.
    pub fn failed(&self) -> impl Iterator<Item = &PageOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// `true` when nothing was selected or every selected page was delivered.
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(PageOutcome::is_success)
    }
}
