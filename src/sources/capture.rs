//! Camera captures.
//!
//! The capture UI lives outside this crate; a capture arrives here as
//! already-encoded image bytes.

use super::{BatchItem, SourceError, SourceListing};
use crate::utils::is_supported_media_type;

/// Media type assumed for captures unless told otherwise.
pub const DEFAULT_CAPTURE_TYPE: &str = "image/jpeg";

/// One encoded camera snapshot.
#[derive(Debug, Clone)]
pub struct Capture {
    bytes: Vec<u8>,
    media_type: String,
}

impl Capture {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            media_type: DEFAULT_CAPTURE_TYPE.to_string(),
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    /// Turn the capture into an inline item numbered `seq`.
    pub fn into_item(self, seq: usize) -> Result<BatchItem, SourceError> {
        if self.bytes.is_empty() {
            return Err(SourceError::Adapter("Capture is empty".to_string()));
        }
        if !is_supported_media_type(&self.media_type) {
            return Err(SourceError::Unsupported {
                name: format!("capture-{}", seq),
                media_type: self.media_type,
            });
        }

        Ok(BatchItem::inline(
            format!("capture-{}", seq),
            format!("capture-{}", seq),
            self.bytes,
            self.media_type,
        ))
    }

    /// Wrap the capture as a one-item batch.
    pub fn into_listing(self, seq: usize) -> Result<SourceListing, SourceError> {
        let mut listing = SourceListing::new("camera capture");
        listing.items.push(self.into_item(seq)?);
        Ok(listing)
    }
}
