//! Local files and folders.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::pdf::PageResolver;
use super::{BatchItem, ByteResolver, SourceError, SourceListing};
use crate::config::{PdfPolicy, SourceSettings};
use crate::utils::{guess_mime_from_filename, is_pdf, is_supported_media_type};

/// Reads deferred local items from disk.
///
/// Keys are indexes into the owned path list, so file names that are not
/// valid UTF-8 still resolve to the exact file.
pub struct LocalFileResolver {
    paths: Vec<PathBuf>,
}

impl LocalFileResolver {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    fn path(&self, key: &str) -> Option<&Path> {
        let index: usize = key.parse().ok()?;
        self.paths.get(index).map(PathBuf::as_path)
    }
}

#[async_trait]
impl ByteResolver for LocalFileResolver {
    async fn resolve(&self, key: &str) -> Result<Vec<u8>, SourceError> {
        let path = self.path(key).ok_or_else(|| SourceError::Fetch {
            name: key.to_string(),
            message: "unknown local item".to_string(),
        })?;
        tokio::fs::read(path).await.map_err(|e| SourceError::Fetch {
            name: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

/// Adapter for files on the local filesystem.
pub struct LocalSource {
    pdf_policy: PdfPolicy,
    pdf_dpi: u32,
}

impl LocalSource {
    pub fn new(settings: &SourceSettings) -> Self {
        Self {
            pdf_policy: settings.pdf_policy,
            pdf_dpi: settings.pdf_dpi,
        }
    }

    /// Read one file for single-item mode. PDFs are always sent whole here.
    pub async fn single_file(&self, path: &Path) -> Result<BatchItem, SourceError> {
        let name = display_name(path);
        let media_type = guess_mime_from_filename(&name);
        if !is_supported_media_type(media_type) {
            return Err(SourceError::Unsupported {
                name,
                media_type: media_type.to_string(),
            });
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| SourceError::io(path, e))?;
        Ok(BatchItem::inline(
            format!("file:{}", name),
            name,
            bytes,
            media_type,
        ))
    }

    /// Walk `dir` recursively and queue every image or PDF, ordered by
    /// relative path.
    pub async fn folder(&self, dir: &Path) -> Result<SourceListing, SourceError> {
        let mut files = walk(dir).await?;
        files.sort_by(|a, b| a.1.cmp(&b.1));
        info!("Found {} files under {}", files.len(), dir.display());

        let mut listing = self.build_listing(dir.display().to_string(), files).await?;
        listing
            .notes
            .insert(0, format!("Scanned folder {}", dir.display()));
        Ok(listing)
    }

    /// Queue an explicit multi-file selection, keeping the given order.
    pub async fn files(&self, paths: &[PathBuf]) -> Result<SourceListing, SourceError> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let meta = tokio::fs::metadata(path)
                .await
                .map_err(|e| SourceError::io(path, e))?;
            if meta.is_file() {
                files.push((path.clone(), display_name(path)));
            }
        }
        self.build_listing(format!("{} selected file(s)", paths.len()), files)
            .await
    }

    async fn build_listing(
        &self,
        origin: String,
        files: Vec<(PathBuf, String)>,
    ) -> Result<SourceListing, SourceError> {
        if files.is_empty() {
            return Err(SourceError::NoFiles);
        }

        let selected = files.len();
        let whole: Vec<PathBuf> = files
            .iter()
            .filter(|(_, rel)| self.sends_whole(guess_mime_from_filename(rel)))
            .map(|(path, _)| path.clone())
            .collect();
        let file_resolver: Arc<dyn ByteResolver> = Arc::new(LocalFileResolver::new(whole));
        let mut next_file = 0usize;
        let mut page_resolver: Option<Arc<PageResolver>> = None;
        let mut listing = SourceListing::new(origin);

        for (index, (path, rel)) in files.into_iter().enumerate() {
            let media_type = guess_mime_from_filename(&rel);
            if !is_supported_media_type(media_type) {
                debug!("Skipping unsupported file {} ({})", rel, media_type);
                listing.skipped_unsupported += 1;
                continue;
            }

            let id = format!("{}:{}", index, rel);

            if self.sends_whole(media_type) {
                listing.items.push(BatchItem::deferred(
                    id,
                    rel,
                    next_file.to_string(),
                    file_resolver.clone(),
                    media_type,
                ));
                next_file += 1;
                continue;
            }

            let resolver = match &page_resolver {
                Some(r) => r.clone(),
                None => {
                    let r = Arc::new(PageResolver::new()?);
                    page_resolver = Some(r.clone());
                    r
                }
            };
            let pages = resolver
                .rasterize(&path, self.pdf_dpi, &format!("doc-{}", index))
                .await?;
            listing
                .notes
                .push(format!("Split {} into {} page(s)", rel, pages.len()));

            let shared: Arc<dyn ByteResolver> = resolver;
            for (page_index, page) in pages.into_iter().enumerate() {
                let page_no = page_index + 1;
                listing.items.push(BatchItem::deferred(
                    format!("{}#page-{}", id, page_no),
                    format!("{} (page {})", rel, page_no),
                    page,
                    shared.clone(),
                    "image/png",
                ));
            }
        }

        if listing.items.is_empty() {
            return Err(SourceError::NoSupportedFiles { selected });
        }

        listing.notes.push(listing.summary());
        Ok(listing)
    }

    /// Supported files that are queued as one item read straight from disk.
    fn sends_whole(&self, media_type: &str) -> bool {
        is_supported_media_type(media_type)
            && !(is_pdf(media_type) && self.pdf_policy == PdfPolicy::PerPage)
    }
}

/// Collect `(path, relative path)` for every regular file under `root`.
/// Symlinked directories are not followed.
async fn walk(root: &Path) -> Result<Vec<(PathBuf, String)>, SourceError> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| SourceError::io(&dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SourceError::io(&dir, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| SourceError::io(&path, e))?;

            let is_file = if file_type.is_dir() {
                pending.push(path);
                continue;
            } else if file_type.is_symlink() {
                tokio::fs::metadata(&path)
                    .await
                    .map(|m| m.is_file())
                    .unwrap_or(false)
            } else {
                file_type.is_file()
            };

            if is_file {
                let rel = relative_name(root, &path);
                files.push((path, rel));
            }
        }
    }

    Ok(files)
}

/// Relative path with `/` separators on every platform.
fn relative_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
