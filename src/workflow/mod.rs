//! Workflow state and the operations the front end triggers.
//!
//! `WorkflowStore` is the single source of truth; `Workflow` wires it to the
//! OCR engine, the batch pipeline and the exporter. Presentation concerns
//! (what is shown where) are not part of the state.

mod store;

pub use store::{Claim, RunClaim, WorkflowStore};

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::export::{ExportError, Exporter};
use crate::ocr::{OcrEngine, OcrResult};
use crate::pipeline::{BatchPipeline, PipelineError, PipelineEvent, PipelineState, StartOutcome};
use crate::sources::{BatchItem, SourceListing};
use crate::utils::TextStats;

/// User-facing message when single-document processing fails.
pub const ANALYSIS_FAILED: &str = "Analysis failed";

/// Which kind of input is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Single,
    Batch,
}

/// What the last source adapter produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSummary {
    pub origin: String,
    pub queued: usize,
    pub skipped_unsupported: usize,
    pub skipped_reserved: usize,
}

impl From<&SourceListing> for ListingSummary {
    fn from(listing: &SourceListing) -> Self {
        Self {
            origin: listing.origin.clone(),
            queued: listing.items.len(),
            skipped_unsupported: listing.skipped_unsupported,
            skipped_reserved: listing.skipped_reserved,
        }
    }
}

/// Snapshot of everything the workflow knows.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    pub mode: Mode,
    /// Document loaded for single-item mode.
    pub document: Option<BatchItem>,
    /// Full result of single-item mode, corrections included.
    pub result: Option<OcrResult>,
    pub pipeline: PipelineState,
    pub listing: Option<ListingSummary>,
    /// User-editable copy of the extracted text.
    pub edited_text: String,
    pub is_loading: bool,
    pub error: Option<String>,
    /// Bumped by every reset and every newly loaded source.
    pub generation: u64,
}

/// Front-end facing operations over one store.
pub struct Workflow {
    store: WorkflowStore,
    engine: Arc<dyn OcrEngine>,
    pipeline: BatchPipeline,
    exporter: Exporter,
}

impl Workflow {
    pub fn new(engine: Arc<dyn OcrEngine>, exporter: Exporter) -> Self {
        Self {
            store: WorkflowStore::new(),
            pipeline: BatchPipeline::new(engine.clone()),
            engine,
            exporter,
        }
    }

    /// Export automatically when a batch completes.
    pub fn with_auto_export(mut self, enabled: bool) -> Self {
        if enabled {
            self.pipeline = self.pipeline.with_auto_export(self.exporter.clone());
        }
        self
    }

    /// Forward pipeline progress events to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.pipeline = self.pipeline.with_events(tx);
        self
    }

    /// Receive every state change, e.g. to render progress.
    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.store.subscribe()
    }

    pub fn snapshot(&self) -> WorkflowState {
        self.store.snapshot()
    }

    /// Load one document for single-item mode.
    pub fn load_single(&self, item: BatchItem) {
        info!("Loaded {} ({})", item.name, item.media_type);
        self.store.install_document(item);
    }

    /// Replace the queue with an adapter's listing.
    pub fn load_batch(&self, listing: SourceListing) {
        info!("{}", listing.summary());
        self.store.install_listing(listing);
    }

    /// Run OCR on the loaded document.
    ///
    /// Nothing happens while a previous call is still in flight.
    pub async fn process_single(&self) -> Result<Option<OcrResult>, PipelineError> {
        let claim = match self.store.claim_single() {
            Claim::Claimed(claim) => claim,
            Claim::AlreadyRunning => return Ok(None),
            Claim::Empty => return Err(PipelineError::Empty),
        };
        let generation = claim.generation;
        let Some(item) = claim.items.into_iter().next() else {
            return Err(PipelineError::Empty);
        };

        let outcome = match item.bytes().await {
            Ok(bytes) => self
                .engine
                .extract(&bytes, &item.media_type)
                .await
                .map_err(|source| PipelineError::Ocr {
                    index: 0,
                    name: item.name.clone(),
                    source,
                }),
            Err(source) => Err(PipelineError::Fetch {
                index: 0,
                name: item.name.clone(),
                source,
            }),
        };

        match outcome {
            Ok(result) => {
                let stored = result.clone();
                let current = self.store.update_if_current(generation, |s| {
                    s.edited_text = stored.corrected_text.clone();
                    s.result = Some(stored);
                    s.is_loading = false;
                });
                if !current {
                    warn!("Discarding result for {}: workflow was reset", item.name);
                    return Ok(None);
                }
                Ok(Some(result))
            }
            Err(error) => {
                warn!("{}: {}", ANALYSIS_FAILED, error);
                self.store.update_if_current(generation, |s| {
                    s.is_loading = false;
                    s.error = Some(ANALYSIS_FAILED.to_string());
                });
                Err(error)
            }
        }
    }

    /// Start the batch, or resume it after a failure.
    pub async fn start_batch(&self) -> Result<StartOutcome, PipelineError> {
        self.pipeline.run(&self.store).await
    }

    /// Overwrite the user-editable text.
    pub fn edit_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.store.update(|s| s.edited_text = text);
    }

    /// Clear everything. In-flight results arriving later are discarded.
    pub fn reset(&self) {
        info!("Workflow reset");
        self.store.reset();
    }

    /// Write the edited text to a new export file.
    pub async fn export(&self) -> Result<PathBuf, ExportError> {
        let text = self.store.read(|s| s.edited_text.clone());
        self.exporter.export(&text).await
    }

    /// Character and paragraph counts of the edited text.
    pub fn stats(&self) -> TextStats {
        self.store.read(|s| TextStats::of(&s.edited_text))
    }
}
