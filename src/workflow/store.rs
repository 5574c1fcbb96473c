//! Observable state container.
//!
//! All writes go through a `watch` channel so observers always see whole
//! snapshots. Writes made on behalf of a run carry the run's generation and
//! are dropped once a reset or a new source has bumped it.

use std::sync::Arc;

use tokio::sync::watch;

use super::{ListingSummary, Mode, WorkflowState};
use crate::pipeline::{PipelinePhase, PipelineState};
use crate::sources::{BatchItem, SourceListing};

/// What a run gets when it claims the store.
#[derive(Debug, Clone)]
pub struct RunClaim {
    pub generation: u64,
    pub items: Vec<BatchItem>,
    pub cursor: usize,
}

/// Outcome of trying to claim the store for a run.
#[derive(Debug)]
pub enum Claim {
    Claimed(RunClaim),
    AlreadyRunning,
    Empty,
}

/// Shared handle to the workflow state.
#[derive(Clone)]
pub struct WorkflowStore {
    tx: Arc<watch::Sender<WorkflowState>>,
}

impl Default for WorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(WorkflowState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Receive a notification after every change.
    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.tx.subscribe()
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> WorkflowState {
        self.tx.borrow().clone()
    }

    /// Read the state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&WorkflowState) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Unconditional write.
    pub(crate) fn update(&self, f: impl FnOnce(&mut WorkflowState)) {
        self.tx.send_modify(f);
    }

    /// Write only if the state still belongs to `generation`.
    pub(crate) fn update_if_current(
        &self,
        generation: u64,
        f: impl FnOnce(&mut WorkflowState),
    ) -> bool {
        self.tx.send_if_modified(|state| {
            if state.generation != generation {
                return false;
            }
            f(state);
            true
        })
    }

    /// Atomically mark the batch as running.
    ///
    /// Succeeds only when there is something left to process and no run is
    /// in flight. The cursor is left where it is, so a failed batch resumes.
    pub(crate) fn claim_batch(&self) -> Claim {
        let mut claim = Claim::Empty;
        self.tx.send_if_modified(|state| {
            let pipeline = &mut state.pipeline;
            if pipeline.is_running {
                claim = Claim::AlreadyRunning;
                return false;
            }
            if pipeline.items.is_empty() || pipeline.cursor >= pipeline.items.len() {
                return false;
            }

            pipeline.is_running = true;
            pipeline.phase = PipelinePhase::Running;
            state.mode = Mode::Batch;
            state.is_loading = true;
            state.error = None;
            claim = Claim::Claimed(RunClaim {
                generation: state.generation,
                items: pipeline.items.clone(),
                cursor: pipeline.cursor,
            });
            true
        });
        claim
    }

    /// Atomically mark the single document as being processed.
    pub(crate) fn claim_single(&self) -> Claim {
        let mut claim = Claim::Empty;
        self.tx.send_if_modified(|state| {
            if state.is_loading {
                claim = Claim::AlreadyRunning;
                return false;
            }
            let Some(document) = state.document.clone() else {
                return false;
            };

            state.is_loading = true;
            state.error = None;
            claim = Claim::Claimed(RunClaim {
                generation: state.generation,
                items: vec![document],
                cursor: 0,
            });
            true
        });
        claim
    }

    /// Replace everything with a single document.
    pub(crate) fn install_document(&self, item: BatchItem) {
        self.tx.send_modify(|state| {
            let generation = state.generation + 1;
            *state = WorkflowState {
                mode: Mode::Single,
                document: Some(item),
                generation,
                ..WorkflowState::default()
            };
        });
    }

    /// Replace everything with a fresh batch queue.
    pub(crate) fn install_listing(&self, listing: SourceListing) {
        self.tx.send_modify(|state| {
            let generation = state.generation + 1;
            let summary = ListingSummary::from(&listing);
            *state = WorkflowState {
                mode: Mode::Batch,
                listing: Some(summary),
                pipeline: PipelineState {
                    items: listing.items,
                    log: listing.notes,
                    ..PipelineState::default()
                },
                generation,
                ..WorkflowState::default()
            };
        });
    }

    /// Clear everything and invalidate in-flight runs.
    pub(crate) fn reset(&self) {
        self.tx.send_modify(|state| {
            let generation = state.generation + 1;
            let mode = state.mode;
            *state = WorkflowState {
                mode,
                generation,
                ..WorkflowState::default()
            };
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(n: usize) -> SourceListing {
        let mut listing = SourceListing::new("test");
        for i in 0..n {
            listing.items.push(BatchItem::inline(
                i.to_string(),
                format!("{}.png", i),
                vec![i as u8],
                "image/png",
            ));
        }
        listing.notes.push("listed".to_string());
        listing
    }

    #[test]
    fn test_claim_is_test_and_set() {
        let store = WorkflowStore::new();
        assert!(matches!(store.claim_batch(), Claim::Empty));

        store.install_listing(listing(2));
        assert!(matches!(store.claim_batch(), Claim::Claimed(_)));
        assert!(matches!(store.claim_batch(), Claim::AlreadyRunning));
        assert!(store.snapshot().pipeline.is_running);
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let store = WorkflowStore::new();
        store.install_listing(listing(1));
        let Claim::Claimed(claim) = store.claim_batch() else {
            panic!("expected claim");
        };

        store.reset();
        let written = store.update_if_current(claim.generation, |s| {
            s.pipeline.accumulated_text.push_str("late")
        });
        assert!(!written);
        let state = store.snapshot();
        assert!(state.pipeline.accumulated_text.is_empty());
        assert!(!state.pipeline.is_running);
        assert!(state.pipeline.items.is_empty());
    }

    #[test]
    fn test_install_listing_copies_notes_into_log() {
        let store = WorkflowStore::new();
        store.install_listing(listing(3));
        let state = store.snapshot();
        assert_eq!(state.mode, Mode::Batch);
        assert_eq!(state.pipeline.total(), 3);
        assert_eq!(state.pipeline.log, vec!["listed".to_string()]);
        assert_eq!(state.listing.unwrap().queued, 3);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let store = WorkflowStore::new();
        let mut rx = store.subscribe();
        store.install_listing(listing(1));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().pipeline.total(), 1);
    }
}
