//! Text statistics shown alongside the editor.

use serde::Serialize;

/// Character and paragraph counts for a block of text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TextStats {
    /// Number of Unicode scalar values.
    pub characters: usize,
    /// Number of non-blank lines.
    pub paragraphs: usize,
}

impl TextStats {
    pub fn of(text: &str) -> Self {
        Self {
            characters: text.chars().count(),
            paragraphs: text.lines().filter(|l| !l.trim().is_empty()).count(),
        }
    }
}
