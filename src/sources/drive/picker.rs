//! Folder selection.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use regex::Regex;

use crate::sources::SourceError;

/// Extract folder ID from a Google Drive folder URL.
///
/// Handles formats:
/// - https://drive.google.com/drive/folders/FOLDER_ID
/// - https://drive.google.com/drive/folders/FOLDER_ID?usp=sharing
/// - https://drive.google.com/drive/u/0/folders/FOLDER_ID
pub fn extract_folder_id(url: &str) -> Option<String> {
    let re = Regex::new(r"/folders/([a-zA-Z0-9_-]+)").ok()?;
    re.captures(url).map(|c| c[1].to_string())
}

fn is_drive_id(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// A selected Drive folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRef {
    id: String,
}

impl FolderRef {
    /// Accept a raw folder id or a folder URL.
    pub fn parse(input: &str) -> Result<Self, SourceError> {
        let input = input.trim();
        if is_drive_id(input) {
            return Ok(Self {
                id: input.to_string(),
            });
        }
        extract_folder_id(input)
            .map(|id| Self { id })
            .ok_or_else(|| SourceError::Adapter(format!("Not a Drive folder: {}", input)))
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl FromStr for FolderRef {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FolderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Lets the user choose exactly one folder.
///
/// Returning `SourceError::Adapter` means the user dismissed the picker.
#[async_trait]
pub trait FolderPicker: Send + Sync {
    async fn pick(&self) -> Result<FolderRef, SourceError>;
}

/// A picker that already knows the answer (folder given on the command line).
pub struct FixedFolder(pub FolderRef);

#[async_trait]
impl FolderPicker for FixedFolder {
    async fn pick(&self) -> Result<FolderRef, SourceError> {
        Ok(self.0.clone())
    }
}
