//! PDF page rasterization through poppler's `pdftoppm`.
//!
//! Used by the local adapters when `PdfPolicy::PerPage` is configured. Pages
//! are rendered as PNG into a scratch directory that lives as long as the
//! `PageResolver` handing them out.

use std::path::Path;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

use super::{ByteResolver, SourceError};

/// Check whether `pdftoppm` is on PATH.
pub fn pdftoppm_available() -> bool {
    which::which("pdftoppm").is_ok()
}

/// Serves rendered page images out of a scratch directory.
pub struct PageResolver {
    dir: TempDir,
}

impl PageResolver {
    pub(crate) fn new() -> Result<Self, SourceError> {
        let dir = TempDir::with_prefix("ocrlens-pages-")
            .map_err(|e| SourceError::io(std::env::temp_dir(), e))?;
        Ok(Self { dir })
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Render every page of `pdf` and return the page keys in page order.
    ///
    /// Keys are file names inside the scratch directory. `prefix` must be
    /// unique per PDF within this resolver.
    pub(crate) async fn rasterize(
        &self,
        pdf: &Path,
        dpi: u32,
        prefix: &str,
    ) -> Result<Vec<String>, SourceError> {
        if !pdftoppm_available() {
            return Err(SourceError::Adapter(
                "pdftoppm not found (install poppler-utils) or set pdf_policy = \"whole\""
                    .to_string(),
            ));
        }

        let dpi = dpi.to_string();
        let output = Command::new("pdftoppm")
            .args(["-png", "-r", &dpi])
            .arg(pdf)
            .arg(self.path().join(prefix))
            .output()
            .await
            .map_err(|e| SourceError::io(pdf, e))?;

        if !output.status.success() {
            return Err(SourceError::Adapter(format!(
                "pdftoppm failed on {}: {}",
                pdf.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut pages: Vec<(u32, String)> = std::fs::read_dir(self.path())
            .map_err(|e| SourceError::io(self.path(), e))?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().into_string().ok()?;
                page_number(&name, prefix).map(|n| (n, name))
            })
            .collect();
        pages.sort_by_key(|(n, _)| *n);

        if pages.is_empty() {
            return Err(SourceError::Adapter(format!(
                "No pages rendered from {}",
                pdf.display()
            )));
        }

        debug!("Rendered {} pages from {}", pages.len(), pdf.display());
        Ok(pages.into_iter().map(|(_, name)| name).collect())
    }
}

#[async_trait]
impl ByteResolver for PageResolver {
    async fn resolve(&self, key: &str) -> Result<Vec<u8>, SourceError> {
        tokio::fs::read(self.path().join(key))
            .await
            .map_err(|e| SourceError::Fetch {
                name: key.to_string(),
                message: e.to_string(),
            })
    }
}

/// Page number of a pdftoppm output file (`<prefix>-01.png` -> 1).
///
/// pdftoppm zero-pads to the width of the page count, so the digits are
/// parsed rather than matched against a fixed width.
fn page_number(file_name: &str, prefix: &str) -> Option<u32> {
    file_name
        .strip_prefix(prefix)?
        .strip_prefix('-')?
        .strip_suffix(".png")?
        .parse()
        .ok()
}
