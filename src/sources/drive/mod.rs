//! Google Drive folder source.
//!
//! Collecting a Drive folder is three steps that fail independently:
//! authenticate (`SourceError::Auth`), pick a folder (`SourceError::Adapter`)
//! and list it (`SourceError::Listing`). The listing is filtered to images and
//! PDFs, minus files whose names mark them as exported OCR output. Nothing is
//! downloaded until the pipeline reaches an item.

mod auth;
mod client;
mod picker;

pub use auth::{
    provider_from_settings, AccessToken, DriveSession, RefreshTokenProvider, StaticToken,
    TokenProvider, DRIVE_READONLY_SCOPE,
};
pub use client::{DriveClient, DriveFile};
pub use picker::{extract_folder_id, FixedFolder, FolderPicker, FolderRef};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{BatchItem, ByteResolver, SourceError, SourceListing};
use crate::config::DriveSettings;
use crate::http_client::HttpClient;
use crate::utils::is_supported_media_type;

/// Name prefix of exported text files. Drive files starting with it
/// (any case) are never queued, so re-running a folder skips prior output.
pub const RESERVED_OUTPUT_PREFIX: &str = "ocr";

/// Check whether a file name carries the reserved output prefix.
pub fn is_reserved_name(name: &str) -> bool {
    name.get(..RESERVED_OUTPUT_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(RESERVED_OUTPUT_PREFIX))
}

/// Turn a raw folder listing into queued items.
///
/// The reserved prefix is checked before the type, so an `ocr-output.txt`
/// counts as reserved rather than unsupported.
pub fn filter_listing(
    files: Vec<DriveFile>,
    resolver: Arc<dyn ByteResolver>,
    origin: impl Into<String>,
) -> SourceListing {
    let mut listing = SourceListing::new(origin);

    for file in files {
        if is_reserved_name(&file.name) {
            debug!("Skipping output file {}", file.name);
            listing.skipped_reserved += 1;
        } else if !is_supported_media_type(&file.mime_type) {
            debug!("Skipping unsupported file {} ({})", file.name, file.mime_type);
            listing.skipped_unsupported += 1;
        } else {
            listing.items.push(BatchItem::deferred(
                file.id.clone(),
                file.name,
                file.id,
                resolver.clone(),
                file.mime_type,
            ));
        }
    }

    listing
}

/// Downloads Drive items when the pipeline asks for them. Keys are file ids.
pub struct DriveResolver {
    client: DriveClient,
}

#[async_trait]
impl ByteResolver for DriveResolver {
    async fn resolve(&self, key: &str) -> Result<Vec<u8>, SourceError> {
        self.client.download(key).await
    }
}

/// Drive folder adapter.
pub struct DriveAdapter {
    client: DriveClient,
}

impl DriveAdapter {
    pub fn new(
        settings: &DriveSettings,
        provider: Arc<dyn TokenProvider>,
    ) -> Result<Self, SourceError> {
        let http = Self::http_client(settings)?;
        let session = Arc::new(DriveSession::new(provider));
        Ok(Self {
            client: DriveClient::new(http, settings, session),
        })
    }

    /// Build an adapter with the token provider the settings call for.
    pub fn from_settings(settings: &DriveSettings) -> Result<Self, SourceError> {
        let http = Self::http_client(settings)?;
        let provider = provider_from_settings(settings, http.clone())?;
        let session = Arc::new(DriveSession::new(provider));
        Ok(Self {
            client: DriveClient::new(http, settings, session),
        })
    }

    fn http_client(settings: &DriveSettings) -> Result<HttpClient, SourceError> {
        HttpClient::builder("google-drive", settings.timeout())
            .build()
            .map_err(|e| SourceError::Adapter(format!("Failed to create HTTP client: {}", e)))
    }

    /// Authenticate, ask `picker` for a folder and list it.
    pub async fn collect(&self, picker: &dyn FolderPicker) -> Result<SourceListing, SourceError> {
        self.client.session().authenticate().await?;
        let mut notes = vec!["Authenticated with Google Drive".to_string()];

        let folder = picker.pick().await?;
        notes.push(format!("Selected Drive folder {}", folder));

        let files = self.client.list_children(folder.id()).await?;
        let total = files.len();
        notes.push(format!("Listed {} file(s)", total));

        let resolver: Arc<dyn ByteResolver> = Arc::new(DriveResolver {
            client: self.client.clone(),
        });
        let mut listing = filter_listing(files, resolver, format!("Drive folder {}", folder));

        if total == 0 {
            return Err(SourceError::NoFiles);
        }
        if listing.is_empty() {
            return Err(SourceError::NoSupportedFiles { selected: total });
        }

        info!("{}", listing.summary());
        notes.push(listing.summary());
        listing.notes = notes;
        Ok(listing)
    }
}
