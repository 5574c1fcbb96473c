//! Shared utility functions.
//!
//! - `mime`: MIME type guessing and OCR input classification
//! - `text`: editor text statistics

mod mime;
mod text;

pub use mime::{guess_mime_from_filename, is_pdf, is_supported_media_type, PDF_MIME};
pub use text::TextStats;
