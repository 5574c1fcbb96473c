//! Writing consolidated text to disk.
//!
//! Exported files are named `ocr-output-<YYYYMMDD-HHMMSS>.txt`. The `ocr`
//! prefix is the same one the Drive adapter skips, so exports that end up in
//! a synced folder are not fed back into the next batch.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::config::ExportSettings;

/// File name prefix of exported text.
pub const EXPORT_PREFIX: &str = "ocr-output";

/// Errors from exporting text.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Nothing to export")]
    Empty,

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Writes text files into an output directory.
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn from_settings(settings: &ExportSettings) -> Self {
        Self::new(settings.resolved_output_dir())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// File name for an export made at `at`.
    pub fn file_name(at: DateTime<Local>) -> String {
        format!("{}-{}.txt", EXPORT_PREFIX, at.format("%Y%m%d-%H%M%S"))
    }

    /// Write `text` to a new timestamped file and return its path.
    pub async fn export(&self, text: &str) -> Result<PathBuf, ExportError> {
        self.export_at(text, Local::now()).await
    }

    /// Write `text` as if exported at `at`. Never overwrites: a second export
    /// in the same second gets a `-1`, `-2`, ... suffix.
    pub async fn export_at(
        &self,
        text: &str,
        at: DateTime<Local>,
    ) -> Result<PathBuf, ExportError> {
        if text.trim().is_empty() {
            return Err(ExportError::Empty);
        }

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| ExportError::Io {
                path: self.output_dir.clone(),
                source,
            })?;

        let base = Self::file_name(at);
        let stem = base.trim_end_matches(".txt");

        let mut attempt = 0u32;
        loop {
            let name = match attempt {
                0 => base.clone(),
                n => format!("{}-{}.txt", stem, n),
            };
            let path = self.output_dir.join(name);

            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    attempt += 1;
                    continue;
                }
                Err(source) => return Err(ExportError::Io { path, source }),
            };

            let written = async {
                file.write_all(text.as_bytes()).await?;
                file.flush().await
            }
            .await;
            if let Err(source) = written {
                return Err(ExportError::Io { path, source });
            }

            info!(
                "Exported {} characters to {}",
                text.chars().count(),
                path.display()
            );
            return Ok(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::drive::is_reserved_name;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_file_name_format() {
        assert_eq!(Exporter::file_name(at()), "ocr-output-20240309-140507.txt");
    }

    #[test]
    fn test_exports_are_skipped_by_drive_filter() {
        assert!(is_reserved_name(&Exporter::file_name(at())));
    }

    #[tokio::test]
    async fn test_export_writes_utf8() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path().join("out"));
        let path = exporter.export_at("Merhaba dünya\n", at()).await.unwrap();

        assert_eq!(path, dir.path().join("out/ocr-output-20240309-140507.txt"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Merhaba dünya\n");
    }

    #[tokio::test]
    async fn test_export_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path());
        let first = exporter.export_at("one", at()).await.unwrap();
        let second = exporter.export_at("two", at()).await.unwrap();

        assert_ne!(first, second);
        assert!(second.ends_with("ocr-output-20240309-140507-1.txt"));
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "one");
    }

    #[tokio::test]
    async fn test_blank_text_is_not_exported() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path());
        assert!(matches!(
            exporter.export_at(" \n ", at()).await,
            Err(ExportError::Empty)
        ));
    }
}
