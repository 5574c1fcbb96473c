//! Configuration management for ocrlens using the prefer crate.
//!
//! Config files are discovered by `prefer` (`ocrlens.toml`, `.yaml`, `.json`
//! in the usual per-user locations) and parsed with serde. Secrets and a few
//! device-specific settings come from environment variables, which always
//! win over file values:
//!
//! - `GEMINI_API_KEY` (fallback `API_KEY`), `OCRLENS_MODEL`, `OCRLENS_DELAY_MS`
//! - `GOOGLE_DRIVE_TOKEN`, `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`,
//!   `GOOGLE_REFRESH_TOKEN`
//! - `OCRLENS_OUTPUT_DIR`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {format} config {path}: {message}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },
}

/// How PDF documents are handed to the OCR service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PdfPolicy {
    /// Send the whole PDF as one request.
    #[default]
    Whole,
    /// Rasterize each page with pdftoppm and send pages as separate items.
    ///
    /// Local sources render every PDF while the listing is built, before the
    /// batch starts. Page images stay on disk until their item is processed.
    /// A PDF that pdftoppm cannot render fails the whole listing.
    PerPage,
}

/// Remote OCR service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Base URL of the Generative Language API.
    pub endpoint: String,
    /// Model used for extraction.
    pub model: String,
    /// API key. Prefer `GEMINI_API_KEY` over storing it in a file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Delay applied before every OCR request, in milliseconds.
    pub request_delay_ms: u64,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-flash-lite-latest".to_string(),
            api_key: None,
            timeout_secs: 120,
            request_delay_ms: 200,
            temperature: 0.1,
        }
    }
}

impl OcrSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// Google Drive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveSettings {
    /// Base URL of the Drive REST API.
    pub api_base: String,
    /// OAuth2 token endpoint used for the refresh-token grant.
    pub token_url: String,
    /// Pre-issued bearer token (no refresh).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Files requested per listing page.
    pub page_size: u32,
    /// Listing pages followed before giving up on a folder.
    pub max_listing_pages: usize,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            access_token: None,
            client_id: None,
            client_secret: None,
            refresh_token: None,
            page_size: 200,
            max_listing_pages: 25,
            timeout_secs: 60,
        }
    }
}

impl DriveSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Whether a refresh-token grant can be performed.
    pub fn has_refresh_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some() && self.refresh_token.is_some()
    }
}

/// Local source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub pdf_policy: PdfPolicy,
    /// Resolution used when rasterizing PDF pages.
    pub pdf_dpi: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            pdf_policy: PdfPolicy::Whole,
            pdf_dpi: 300,
        }
    }
}

/// Text export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Directory for exported text files (`~` is expanded).
    pub output_dir: String,
    /// Write the consolidated text automatically when a batch completes.
    pub auto_export: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            output_dir: ".".to_string(),
            auto_export: true,
        }
    }
}

impl ExportSettings {
    /// Output directory with `~` and environment variables expanded.
    pub fn resolved_output_dir(&self) -> PathBuf {
        match shellexpand::full(&self.output_dir) {
            Ok(expanded) => PathBuf::from(expanded.as_ref()),
            Err(_) => PathBuf::from(shellexpand::tilde(&self.output_dir).as_ref()),
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ocr: OcrSettings,
    #[serde(default)]
    pub drive: DriveSettings,
    #[serde(default)]
    pub sources: SourceSettings,
    #[serde(default)]
    pub export: ExportSettings,
    /// Path the config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    ///
    /// A discovered file that fails to parse is reported and ignored.
    pub async fn load() -> Self {
        match prefer::load("ocrlens").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => return config,
                        Err(e) => warn!("Ignoring config file: {}", e),
                    }
                }
            }
            Err(_) => debug!("No config file discovered, using defaults"),
        }
        Self::default().with_env_overrides()
    }

    /// Load from an explicit path, or discover one when `path` is None.
    pub async fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_path(path).await,
            None => Ok(Self::load().await),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config.with_env_overrides())
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |format: &'static str, message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        };

        match ext {
            "toml" => toml::from_str(contents).map_err(|e| parse_error("TOML", e.to_string())),
            "yaml" | "yml" => {
                serde_yaml::from_str(contents).map_err(|e| parse_error("YAML", e.to_string()))
            }
            _ => serde_json::from_str(contents).map_err(|e| parse_error("JSON", e.to_string())),
        }
    }

    /// Apply environment variable overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GEMINI_API_KEY").or_else(|| non_empty("API_KEY")) {
            self.ocr.api_key = Some(key);
        }
        if let Some(model) = non_empty("OCRLENS_MODEL") {
            self.ocr.model = model;
        }
        if let Some(delay) = non_empty("OCRLENS_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.ocr.request_delay_ms = delay;
        }
        if let Some(token) = non_empty("GOOGLE_DRIVE_TOKEN") {
            self.drive.access_token = Some(token);
        }
        if let Some(id) = non_empty("GOOGLE_CLIENT_ID") {
            self.drive.client_id = Some(id);
        }
        if let Some(secret) = non_empty("GOOGLE_CLIENT_SECRET") {
            self.drive.client_secret = Some(secret);
        }
        if let Some(refresh) = non_empty("GOOGLE_REFRESH_TOKEN") {
            self.drive.refresh_token = Some(refresh);
        }
        if let Some(dir) = non_empty("OCRLENS_OUTPUT_DIR") {
            self.export.output_dir = dir;
        }
        self
    }

    /// Copy of this config with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mask = |s: &Option<String>| s.as_ref().map(|_| "********".to_string());
        let mut config = self.clone();
        config.ocr.api_key = mask(&self.ocr.api_key);
        config.drive.access_token = mask(&self.drive.access_token);
        config.drive.client_secret = mask(&self.drive.client_secret);
        config.drive.refresh_token = mask(&self.drive.refresh_token);
        config
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
