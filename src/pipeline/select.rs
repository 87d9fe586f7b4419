//! Page selection: count pages, pull each page's text, keep the ones the
//! [`FilterPolicy`] accepts.
//!
//! Text extraction runs through the same bounded `buffer_unordered` pool as
//! conversion. Completion order is irrelevant because the result is a set;
//! [`PageSelection`] sorts and deduplicates on construction.

use crate::error::PageError;
use crate::pipeline::filter::FilterPolicy;
use crate::tool::{DocumentTool, ToolError};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Strictly increasing, duplicate-free 1-based page indices, all within
/// `1..=page_count`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSelection {
    pages: Vec<usize>,
    page_count: usize,
}

impl PageSelection {
    /// Build a selection, dropping out-of-range indices and duplicates.
    pub fn new(pages: impl IntoIterator<Item = usize>, page_count: usize) -> Self {
        let mut pages: Vec<usize> = pages
            .into_iter()
            .filter(|&p| p >= 1 && p <= page_count)
            .collect();
        pages.sort_unstable();
        pages.dedup();
        Self { pages, page_count }
    }

    /// Every page of a `page_count`-page document.
    pub fn all(page_count: usize) -> Self {
        Self {
            pages: (1..=page_count).collect(),
            page_count,
        }
    }

    pub fn pages(&self) -> &[usize] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn contains(&self, page: usize) -> bool {
        self.pages.binary_search(&page).is_ok()
    }
}

/// Result of the filtering stage.
#[derive(Debug, Clone, Default)]
pub struct SelectionResult {
    pub selection: PageSelection,
    /// Pages whose text could not be extracted. They are left out of the
    /// selection; the rest of the document is unaffected.
    pub failures: Vec<PageError>,
}

/// Extract the text of every page and keep the qualifying ones.
///
/// `page_count` comes from [`DocumentTool::page_count`]; a count of zero
/// makes no tool calls at all.
pub async fn select_pages(
    tool: &Arc<dyn DocumentTool>,
    document: &Path,
    page_count: usize,
    policy: &FilterPolicy,
    concurrency: usize,
) -> SelectionResult {
    if page_count == 0 {
        return SelectionResult {
            selection: PageSelection::new([], 0),
            failures: Vec::new(),
        };
    }

    let verdicts: Vec<(usize, Result<bool, ToolError>)> = stream::iter(1..=page_count)
        .map(|page| {
            let tool = Arc::clone(tool);
            async move {
                let verdict = tool
                    .extract_text(document, page)
                    .await
                    .map(|text| policy.qualifies(&text));
                (page, verdict)
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut qualifying = Vec::new();
    let mut failures = Vec::new();
    for (page, verdict) in verdicts {
        match verdict {
            Ok(true) => qualifying.push(page),
            Ok(false) => debug!("Page {} does not qualify", page),
            Err(e) => {
                warn!("Page {}: text extraction failed, skipping: {}", page, e);
                failures.push(PageError::TextExtractionFailed {
                    page,
                    detail: e.to_string(),
                });
            }
        }
    }
    failures.sort_by_key(PageError::page);

    SelectionResult {
        selection: PageSelection::new(qualifying, page_count),
        failures,
    }
}
