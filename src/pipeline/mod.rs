//! Sequential batch processing.
//!
//! A batch is a fixed queue of `BatchItem`s driven one at a time through an
//! `OcrEngine`. Progress lives in `PipelineState` inside the workflow store:
//! `cursor` is the only resume point, and text from finished items is never
//! rolled back when a later item fails.

mod runner;

pub use runner::BatchPipeline;

use std::path::PathBuf;

use thiserror::Error;

use crate::ocr::OcrError;
use crate::sources::{BatchItem, SourceError};

/// User-facing message for any mid-batch failure.
pub const BATCH_INTERRUPTED: &str = "Batch interrupted";

/// Where a batch is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelinePhase {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

/// Queue and progress of the current batch.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    /// Fixed once the batch has started.
    pub items: Vec<BatchItem>,
    /// Index of the next item to process (0 <= cursor <= items.len()).
    pub cursor: usize,
    pub accumulated_text: String,
    /// Append-only progress log.
    pub log: Vec<String>,
    pub is_running: bool,
    pub phase: PipelinePhase,
}

impl PipelineState {
    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// Items finished so far.
    pub fn processed(&self) -> usize {
        self.cursor.min(self.items.len())
    }

    pub fn is_complete(&self) -> bool {
        !self.items.is_empty() && self.cursor >= self.items.len()
    }

    /// A failed batch with work left can be resumed.
    pub fn can_resume(&self) -> bool {
        !self.is_running && self.phase == PipelinePhase::Failed && !self.is_complete()
    }
}

/// Header placed before every item's text except the first.
pub fn separator_header(name: &str) -> String {
    format!("\n\n--- [{}] ---\n\n", name)
}

/// Append the text of the item at `index` to the accumulator.
///
/// Every item after the first gets a header, even when earlier items
/// produced no text.
pub fn append_result(accumulated: &mut String, index: usize, name: &str, text: &str) {
    if index > 0 {
        accumulated.push_str(&separator_header(name));
    }
    accumulated.push_str(text);
}

/// Why a batch stopped early.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to fetch item {} ({name}): {source}", .index + 1)]
    Fetch {
        index: usize,
        name: String,
        #[source]
        source: SourceError,
    },

    #[error("OCR failed for item {} ({name}): {source}", .index + 1)]
    Ocr {
        index: usize,
        name: String,
        #[source]
        source: OcrError,
    },

    #[error("Nothing to process")]
    Empty,
}

impl PipelineError {
    /// Index of the item that failed, if any.
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Fetch { index, .. } | Self::Ocr { index, .. } => Some(*index),
            Self::Empty => None,
        }
    }

    /// Short name of the failure kind, for logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::Ocr {
                source: OcrError::Service(_),
                ..
            } => "ocr-service",
            Self::Ocr {
                source: OcrError::MalformedResponse(_),
                ..
            } => "ocr-malformed",
            Self::Ocr {
                source: OcrError::NotConfigured(_),
                ..
            } => "ocr-not-configured",
            Self::Empty => "empty",
        }
    }
}

/// Result of asking the pipeline to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Every remaining item was processed.
    Completed {
        processed: usize,
        exported: Option<PathBuf>,
    },
    /// A batch was already running; nothing happened.
    AlreadyRunning,
    /// The workflow was reset while this run was in flight; its results were
    /// discarded.
    Superseded,
}

/// Progress events sent to observers while a batch runs.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Started {
        total: usize,
        resume_from: usize,
    },
    ItemStarted {
        index: usize,
        total: usize,
        name: String,
    },
    ItemCompleted {
        index: usize,
        total: usize,
        name: String,
        characters: usize,
    },
    Failed {
        index: usize,
        name: String,
        kind: &'static str,
        error: String,
    },
    Completed {
        total: usize,
        exported: Option<PathBuf>,
    },
}
