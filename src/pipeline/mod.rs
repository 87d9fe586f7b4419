//! Pipeline stages for selective PDF-to-PNG conversion and delivery.
//!
//! Each submodule implements one step and is testable on its own. None of
//! them knows about the run as a whole; [`crate::convert`] wires them up.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ select ──▶ render ──▶ upload
//! (check)   (filter)   (PNG)      (HTTP, retry)
//! ```
//!
//! 1. [`input`]: validate the document and derive the artifact prefix
//! 2. [`filter`]: text normalisation and the include/exclude decision
//! 3. [`select`]: count pages, extract each page's text, apply [`filter`]
//! 4. [`render`]: rasterise all pages or one page, recover page order from
//!    file names
//! 5. [`upload`]: multipart delivery with bounded retries; the only stage
//!    with network I/O

pub mod filter;
pub mod input;
pub mod render;
pub mod select;
pub mod upload;
