//! Drive v3 REST calls: folder listing and file download.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::auth::DriveSession;
use crate::config::DriveSettings;
use crate::http_client::{HttpClient, HttpResponse};
use crate::sources::SourceError;

/// Information about a file in a Google Drive folder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    /// Google Drive file ID.
    pub id: String,
    /// File name.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
}

impl DriveFile {
    /// Check if this is a folder rather than a file.
    pub fn is_folder(&self) -> bool {
        self.mime_type == "application/vnd.google-apps.folder"
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

/// Authorized Drive API client.
#[derive(Clone)]
pub struct DriveClient {
    http: HttpClient,
    api_base: String,
    session: Arc<DriveSession>,
    page_size: u32,
    max_pages: usize,
}

impl DriveClient {
    pub fn new(http: HttpClient, settings: &DriveSettings, session: Arc<DriveSession>) -> Self {
        Self {
            http,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            session,
            page_size: settings.page_size.max(1),
            max_pages: settings.max_listing_pages.max(1),
        }
    }

    pub fn session(&self) -> &Arc<DriveSession> {
        &self.session
    }

    /// List the immediate children of a folder, following `nextPageToken`.
    ///
    /// Fails with `SourceError::Listing` when the folder needs more than
    /// `max_listing_pages` pages.
    pub async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveFile>, SourceError> {
        info!("Listing Google Drive folder: {}", folder_id);

        let url = format!("{}/drive/v3/files", self.api_base);
        let q = format!("'{}' in parents and trashed=false", folder_id);
        let page_size = self.page_size.to_string();

        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 0..self.max_pages {
            let mut query = vec![
                ("q", q.as_str()),
                ("fields", "nextPageToken,files(id,name,mimeType)"),
                ("pageSize", page_size.as_str()),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let response = self.get_authorized(&url, &query).await.map_err(|e| match e {
                AuthorizedError::Auth(e) => e,
                AuthorizedError::Transport(msg) => SourceError::Listing(msg),
            })?;

            if !response.is_success() {
                let status = response.status;
                let body = response.error_snippet().await;
                return Err(SourceError::Listing(format!("HTTP {}: {}", status, body)));
            }

            let body: FileListResponse = response
                .json()
                .await
                .map_err(|e| SourceError::Listing(format!("invalid listing response: {}", e)))?;

            debug!("Listing page {} returned {} files", page + 1, body.files.len());
            all_files.extend(body.files);

            match body.next_page_token {
                Some(token) => page_token = Some(token),
                None => {
                    info!("Found {} files in folder {}", all_files.len(), folder_id);
                    return Ok(all_files);
                }
            }
        }

        warn!(
            "Folder {} exceeds {} listing pages, refusing partial listing",
            folder_id, self.max_pages
        );
        Err(SourceError::Listing(format!(
            "folder has more than {} pages of {} files; raise drive.max_listing_pages",
            self.max_pages, self.page_size
        )))
    }

    /// Download a file's content (`alt=media`).
    pub async fn download(&self, file_id: &str) -> Result<Vec<u8>, SourceError> {
        let url = format!("{}/drive/v3/files/{}", self.api_base, file_id);
        let fetch_error = |message: String| SourceError::Fetch {
            name: file_id.to_string(),
            message,
        };

        let response = self
            .get_authorized(&url, &[("alt", "media")])
            .await
            .map_err(|e| match e {
                AuthorizedError::Auth(e) => e,
                AuthorizedError::Transport(msg) => fetch_error(msg),
            })?;

        if !response.is_success() {
            let status = response.status;
            let body = response.error_snippet().await;
            return Err(fetch_error(format!("HTTP {}: {}", status, body)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        debug!("Downloaded {} bytes for {}", bytes.len(), file_id);
        Ok(bytes)
    }

    /// GET with the session token, re-acquiring it once on 401.
    async fn get_authorized(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<HttpResponse, AuthorizedError> {
        let token = self.session.token().await.map_err(AuthorizedError::Auth)?;
        let response = self
            .http
            .get(url, query, Some(&token))
            .await
            .map_err(|e| AuthorizedError::Transport(e.to_string()))?;

        if !response.is_unauthorized() {
            return Ok(response);
        }

        debug!("Drive returned 401, re-acquiring token");
        let token = self.session.refresh().await.map_err(AuthorizedError::Auth)?;
        let response = self
            .http
            .get(url, query, Some(&token))
            .await
            .map_err(|e| AuthorizedError::Transport(e.to_string()))?;

        if response.is_unauthorized() {
            return Err(AuthorizedError::Auth(SourceError::Auth(
                "Drive rejected the access token".to_string(),
            )));
        }
        Ok(response)
    }
}

enum AuthorizedError {
    Auth(SourceError),
    Transport(String),
}
