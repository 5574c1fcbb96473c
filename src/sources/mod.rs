//! Source adapters that turn user-picked inputs into batch items.
//!
//! Every adapter either returns a complete `SourceListing` or a `SourceError`;
//! a failed adapter never leaves a partial queue behind. Items carry their
//! bytes inline (single files, captures) or a deferred reference that is
//! resolved only when the pipeline reaches the item.

mod capture;
pub mod drive;
mod local;
mod pdf;

pub use capture::{Capture, DEFAULT_CAPTURE_TYPE};
pub use local::{LocalFileResolver, LocalSource};
pub use pdf::{pdftoppm_available, PageResolver};

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from source adapters and deferred byte resolution.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The adapter could not produce a selection (picker dismissed, tool missing).
    #[error("{0}")]
    Adapter(String),

    #[error("No files selected")]
    NoFiles,

    #[error("None of the {selected} selected files are images or PDFs")]
    NoSupportedFiles { selected: usize },

    #[error("Unsupported file type for {name}: {media_type}")]
    Unsupported { name: String, media_type: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Failed to list folder: {0}")]
    Listing(String),

    #[error("Failed to fetch {name}: {message}")]
    Fetch { name: String, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl SourceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Turns a deferred key into document bytes.
///
/// Implementations must be idempotent: resolving the same key twice yields
/// the same bytes (a resumed batch re-resolves the item it failed on).
#[async_trait]
pub trait ByteResolver: Send + Sync {
    async fn resolve(&self, key: &str) -> Result<Vec<u8>, SourceError>;
}

/// Where an item's bytes live.
#[derive(Clone)]
pub enum SourceRef {
    Inline(Arc<[u8]>),
    Deferred {
        key: String,
        resolver: Arc<dyn ByteResolver>,
    },
}

impl fmt::Debug for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(bytes) => write!(f, "Inline({} bytes)", bytes.len()),
            Self::Deferred { key, .. } => f.debug_struct("Deferred").field("key", key).finish(),
        }
    }
}

/// One unit of work for the pipeline.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub id: String,
    /// Display name, shown in separator headers and logs.
    pub name: String,
    pub source: SourceRef,
    /// Always `image/*` or `application/pdf`.
    pub media_type: String,
}

impl BatchItem {
    pub fn inline(
        id: impl Into<String>,
        name: impl Into<String>,
        bytes: Vec<u8>,
        media_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source: SourceRef::Inline(bytes.into()),
            media_type: media_type.into(),
        }
    }

    pub fn deferred(
        id: impl Into<String>,
        name: impl Into<String>,
        key: impl Into<String>,
        resolver: Arc<dyn ByteResolver>,
        media_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source: SourceRef::Deferred {
                key: key.into(),
                resolver,
            },
            media_type: media_type.into(),
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self.source, SourceRef::Deferred { .. })
    }

    /// Get the item's bytes, resolving deferred references.
    pub async fn bytes(&self) -> Result<Vec<u8>, SourceError> {
        match &self.source {
            SourceRef::Inline(bytes) => Ok(bytes.to_vec()),
            SourceRef::Deferred { key, resolver } => resolver.resolve(key).await,
        }
    }
}

/// Result of one adapter invocation.
#[derive(Debug, Clone, Default)]
pub struct SourceListing {
    pub items: Vec<BatchItem>,
    /// Files dropped because they are neither images nor PDFs.
    pub skipped_unsupported: usize,
    /// Drive files dropped because their name marks them as our own output.
    pub skipped_reserved: usize,
    /// Human-readable description of where the items came from.
    pub origin: String,
    /// Lifecycle notes (auth, listing) copied into the batch log on install.
    pub notes: Vec<String>,
}

impl SourceListing {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// One-line summary of what was kept and skipped.
    pub fn summary(&self) -> String {
        let mut summary = format!("{} file(s) queued from {}", self.items.len(), self.origin);
        if self.skipped_unsupported > 0 {
            summary.push_str(&format!(
                ", {} unsupported skipped",
                self.skipped_unsupported
            ));
        }
        if self.skipped_reserved > 0 {
            summary.push_str(&format!(", {} output file(s) skipped", self.skipped_reserved));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResolver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ByteResolver for CountingResolver {
        async fn resolve(&self, key: &str) -> Result<Vec<u8>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(key.as_bytes().to_vec())
        }
    }

    #[tokio::test]
    async fn test_deferred_resolves_on_demand() {
        let resolver = Arc::new(CountingResolver {
            calls: AtomicUsize::new(0),
        });
        let item = BatchItem::deferred("1", "a.png", "abc", resolver.clone(), "image/png");
        assert!(item.is_deferred());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);

        assert_eq!(item.bytes().await.unwrap(), b"abc");
        assert_eq!(item.bytes().await.unwrap(), b"abc");
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_inline_bytes() {
        let item = BatchItem::inline("c", "capture.jpg", vec![1, 2, 3], "image/jpeg");
        assert!(!item.is_deferred());
        assert_eq!(item.bytes().await.unwrap(), vec![1, 2, 3]);
        assert_eq!(format!("{:?}", item.source), "Inline(3 bytes)");
    }

    #[test]
    fn test_listing_summary() {
        let mut listing = SourceListing::new("scans/");
        listing.skipped_unsupported = 2;
        listing.skipped_reserved = 1;
        assert_eq!(
            listing.summary(),
            "0 file(s) queued from scans/, 2 unsupported skipped, 1 output file(s) skipped"
        );
    }
}
