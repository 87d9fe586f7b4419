//! Content filter: decides from a page's text whether it gets converted.
//!
//! Extracted PDF text is noisy. The same heading can come out as
//! `"Revisão"`, `"REVISAO"` or `"R e v i s ã o"` depending on the font,
//! ligatures and how the text layer was written, so matching is done on a
//! normalised form rather than on the raw string:
//!
//! 1. canonical decomposition (NFD) with every combining mark dropped,
//!    so `é` becomes `e`;
//! 2. all whitespace removed;
//! 3. lower-cased.
//!
//! Exclusion is tested before inclusion. Documents often carry a boilerplate
//! "change history" block that repeats the inclusion keyword, and that block
//! must never be selected.

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalise `text` for accent-, case- and whitespace-insensitive matching.
///
/// Idempotent: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c) && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Inclusion/exclusion pair applied to each page independently.
///
/// Patterns are normalised once at construction; [`FilterPolicy::include`]
/// and [`FilterPolicy::exclude`] return the normalised forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPolicy {
    include: String,
    exclude: String,
}

impl FilterPolicy {
    /// An exclusion that normalises to `""` disables exclusion; an inclusion
    /// that normalises to `""` selects every page that is not excluded.
    pub fn new(include: impl AsRef<str>, exclude: impl AsRef<str>) -> Self {
        Self {
            include: normalize(include.as_ref()),
            exclude: normalize(exclude.as_ref()),
        }
    }

    /// Policy with an inclusion pattern and no exclusion.
    pub fn include_only(include: impl AsRef<str>) -> Self {
        Self::new(include, "")
    }

    pub fn include(&self) -> &str {
        &self.include
    }

    pub fn exclude(&self) -> &str {
        &self.exclude
    }

    /// `true` when the page should be converted.
    pub fn qualifies(&self, page_text: &str) -> bool {
        let text = normalize(page_text);
        if self.is_excluded(&text) {
            return false;
        }
        text.contains(&self.include)
    }

    fn is_excluded(&self, normalized_text: &str) -> bool {
        !self.exclude.is_empty() && normalized_text.contains(&self.exclude)
    }
}
