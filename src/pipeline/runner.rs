//! Batch runner: drives the queued items through the OCR engine in order.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    append_result, PipelineError, PipelineEvent, PipelinePhase, StartOutcome, BATCH_INTERRUPTED,
};
use crate::export::Exporter;
use crate::ocr::OcrEngine;
use crate::workflow::{Claim, RunClaim, WorkflowStore};

/// Drives one batch at a time. Cheap to clone.
#[derive(Clone)]
pub struct BatchPipeline {
    engine: Arc<dyn OcrEngine>,
    events: Option<mpsc::Sender<PipelineEvent>>,
    auto_export: Option<Exporter>,
}

impl BatchPipeline {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self {
            engine,
            events: None,
            auto_export: None,
        }
    }

    /// Send progress events to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Export the consolidated text when a batch completes.
    pub fn with_auto_export(mut self, exporter: Exporter) -> Self {
        self.auto_export = Some(exporter);
        self
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    /// Start or resume the batch held by `store`.
    ///
    /// Starting while a run is in flight is a no-op. On failure the error is
    /// returned and the store keeps every result committed before it.
    pub async fn run(&self, store: &WorkflowStore) -> Result<StartOutcome, PipelineError> {
        let claim = match store.claim_batch() {
            Claim::Claimed(claim) => claim,
            Claim::AlreadyRunning => {
                debug!("Batch already running, ignoring start");
                return Ok(StartOutcome::AlreadyRunning);
            }
            Claim::Empty => return Err(PipelineError::Empty),
        };

        let RunClaim {
            generation,
            items,
            cursor: start,
        } = claim;
        let total = items.len();

        let opening = if start == 0 {
            format!("Processing {} item(s)", total)
        } else {
            format!("Resuming at item {} of {}", start + 1, total)
        };
        match self.engine.model_name() {
            Some(model) => info!("{} with {}", opening, model),
            None => info!("{}", opening),
        }
        if !store.update_if_current(generation, |s| s.pipeline.log.push(opening)) {
            return Ok(StartOutcome::Superseded);
        }
        self.emit(PipelineEvent::Started {
            total,
            resume_from: start,
        })
        .await;

        for (index, item) in items.iter().enumerate().skip(start) {
            if !store.update_if_current(generation, |s| s.pipeline.cursor = index) {
                return Ok(StartOutcome::Superseded);
            }
            self.emit(PipelineEvent::ItemStarted {
                index,
                total,
                name: item.name.clone(),
            })
            .await;

            let bytes = match item.bytes().await {
                Ok(bytes) => bytes,
                Err(source) => {
                    let error = PipelineError::Fetch {
                        index,
                        name: item.name.clone(),
                        source,
                    };
                    return self.fail(store, generation, error).await;
                }
            };

            let result = match self.engine.extract(&bytes, &item.media_type).await {
                Ok(result) => result,
                Err(source) => {
                    let error = PipelineError::Ocr {
                        index,
                        name: item.name.clone(),
                        source,
                    };
                    return self.fail(store, generation, error).await;
                }
            };

            let text = result.corrected_text;
            let characters = text.chars().count();
            let committed = store.update_if_current(generation, |s| {
                let pipeline = &mut s.pipeline;
                append_result(&mut pipeline.accumulated_text, index, &item.name, &text);
                pipeline.log.push(format!(
                    "[{}/{}] {} ({} characters)",
                    index + 1,
                    total,
                    item.name,
                    characters
                ));
                pipeline.cursor = index + 1;
                s.edited_text = pipeline.accumulated_text.clone();
            });
            if !committed {
                warn!("Discarding result for {}: workflow was reset", item.name);
                return Ok(StartOutcome::Superseded);
            }

            debug!("Processed {} ({}/{})", item.name, index + 1, total);
            self.emit(PipelineEvent::ItemCompleted {
                index,
                total,
                name: item.name.clone(),
                characters,
            })
            .await;
        }

        self.complete(store, generation, total, total - start).await
    }

    async fn complete(
        &self,
        store: &WorkflowStore,
        generation: u64,
        total: usize,
        processed: usize,
    ) -> Result<StartOutcome, PipelineError> {
        let text = store.read(|s| s.pipeline.accumulated_text.clone());
        let exported = match &self.auto_export {
            Some(exporter) => self.export(exporter, &text).await,
            None => None,
        };

        let finished = store.update_if_current(generation, |s| {
            let pipeline = &mut s.pipeline;
            pipeline.is_running = false;
            pipeline.phase = PipelinePhase::Completed;
            pipeline
                .log
                .push(format!("Batch complete: {} item(s)", total));
            if let Some(path) = &exported {
                pipeline.log.push(format!("Saved to {}", path.display()));
            }
            s.is_loading = false;
        });
        if !finished {
            return Ok(StartOutcome::Superseded);
        }

        info!("Batch complete: {} item(s)", total);
        self.emit(PipelineEvent::Completed {
            total,
            exported: exported.clone(),
        })
        .await;

        Ok(StartOutcome::Completed {
            processed,
            exported,
        })
    }

    async fn export(&self, exporter: &Exporter, text: &str) -> Option<PathBuf> {
        match exporter.export(text).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Automatic export failed: {}", e);
                None
            }
        }
    }

    async fn fail(
        &self,
        store: &WorkflowStore,
        generation: u64,
        error: PipelineError,
    ) -> Result<StartOutcome, PipelineError> {
        let current = store.update_if_current(generation, |s| {
            s.pipeline.is_running = false;
            s.pipeline.phase = PipelinePhase::Failed;
            s.is_loading = false;
            s.error = Some(BATCH_INTERRUPTED.to_string());
        });
        if !current {
            warn!("Discarding failure after reset: {}", error);
            return Ok(StartOutcome::Superseded);
        }

        warn!("{}: {}", BATCH_INTERRUPTED, error);
        if let PipelineError::Fetch { index, name, .. } | PipelineError::Ocr { index, name, .. } =
            &error
        {
            self.emit(PipelineEvent::Failed {
                index: *index,
                name: name.clone(),
                kind: error.kind(),
                error: error.to_string(),
            })
            .await;
        }
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{OcrError, OcrResult};
    use crate::sources::{BatchItem, ByteResolver, SourceError, SourceListing};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    fn ocr(text: &str) -> OcrResult {
        OcrResult {
            raw_text: text.to_string(),
            corrected_text: text.to_string(),
            corrections: Vec::new(),
            language: "en".to_string(),
            confidence: Some(0.9),
        }
    }

    /// Returns the item bytes as text; fails once for every byte string
    /// listed in `fail_once`.
    struct EchoEngine {
        fail_once: Mutex<HashMap<Vec<u8>, OcrError>>,
        calls: Mutex<Vec<String>>,
    }

    impl EchoEngine {
        fn new() -> Self {
            Self {
                fail_once: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_once(self, bytes: &[u8], error: OcrError) -> Self {
            self.fail_once.lock().unwrap().insert(bytes.to_vec(), error);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OcrEngine for EchoEngine {
        async fn extract(&self, bytes: &[u8], _media_type: &str) -> Result<OcrResult, OcrError> {
            let text = String::from_utf8_lossy(bytes).into_owned();
            self.calls.lock().unwrap().push(text.clone());
            if let Some(error) = self.fail_once.lock().unwrap().remove(bytes) {
                return Err(error);
            }
            Ok(ocr(&text))
        }
    }

    fn store_with(texts: &[&str]) -> WorkflowStore {
        let mut listing = SourceListing::new("test");
        for (i, text) in texts.iter().enumerate() {
            listing.items.push(BatchItem::inline(
                i.to_string(),
                format!("{}.png", (b'a' + i as u8) as char),
                text.as_bytes().to_vec(),
                "image/png",
            ));
        }
        let store = WorkflowStore::new();
        store.install_listing(listing);
        store
    }

    #[tokio::test]
    async fn test_two_items_concatenate_with_header() {
        let store = store_with(&["Hello", "World"]);
        let pipeline = BatchPipeline::new(Arc::new(EchoEngine::new()));

        let outcome = pipeline.run(&store).await.unwrap();
        assert_eq!(
            outcome,
            StartOutcome::Completed {
                processed: 2,
                exported: None
            }
        );

        let state = store.snapshot();
        assert_eq!(
            state.pipeline.accumulated_text,
            "Hello\n\n--- [b.png] ---\n\nWorld"
        );
        assert_eq!(state.edited_text, state.pipeline.accumulated_text);
        assert_eq!(state.pipeline.cursor, 2);
        assert_eq!(state.pipeline.phase, PipelinePhase::Completed);
        assert!(!state.pipeline.is_running);
        assert!(!state.is_loading);
        assert!(state
            .pipeline
            .log
            .last()
            .unwrap()
            .starts_with("Batch complete"));
    }

    #[tokio::test]
    async fn test_blank_first_item_keeps_header_for_second() {
        let store = store_with(&["", "World"]);
        let pipeline = BatchPipeline::new(Arc::new(EchoEngine::new()));

        pipeline.run(&store).await.unwrap();
        assert_eq!(
            store.snapshot().pipeline.accumulated_text,
            "\n\n--- [b.png] ---\n\nWorld"
        );
    }

    #[tokio::test]
    async fn test_failure_preserves_prefix_and_cursor() {
        let store = store_with(&["one", "two", "three", "four"]);
        let engine = EchoEngine::new()
            .failing_once(b"three", OcrError::MalformedResponse("no text".to_string()));
        let pipeline = BatchPipeline::new(Arc::new(engine));

        let err = pipeline.run(&store).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Ocr {
                index: 2,
                source: OcrError::MalformedResponse(_),
                ..
            }
        ));

        let state = store.snapshot();
        assert_eq!(state.pipeline.cursor, 2);
        assert!(!state.pipeline.is_running);
        assert_eq!(state.pipeline.phase, PipelinePhase::Failed);
        assert_eq!(state.error.as_deref(), Some(BATCH_INTERRUPTED));
        assert_eq!(
            state.pipeline.accumulated_text,
            "one\n\n--- [b.png] ---\n\ntwo"
        );
        // Opening line plus one line per success.
        assert_eq!(state.pipeline.log.len(), 1 + 2);
    }

    #[tokio::test]
    async fn test_resume_reprocesses_failed_item_once() {
        let store = store_with(&["one", "two", "three"]);
        let engine = Arc::new(
            EchoEngine::new().failing_once(b"two", OcrError::Service("503".to_string())),
        );
        let pipeline = BatchPipeline::new(engine.clone());

        assert!(pipeline.run(&store).await.is_err());
        assert!(store.snapshot().pipeline.can_resume());

        let outcome = pipeline.run(&store).await.unwrap();
        assert_eq!(
            outcome,
            StartOutcome::Completed {
                processed: 2,
                exported: None
            }
        );
        assert_eq!(engine.calls(), vec!["one", "two", "two", "three"]);

        let state = store.snapshot();
        assert_eq!(
            state.pipeline.accumulated_text,
            "one\n\n--- [b.png] ---\n\ntwo\n\n--- [c.png] ---\n\nthree"
        );
        assert!(state.error.is_none());
        assert!(state.pipeline.log.iter().any(|l| l == "Resuming at item 2 of 3"));
    }

    struct BrokenResolver;

    #[async_trait]
    impl ByteResolver for BrokenResolver {
        async fn resolve(&self, key: &str) -> Result<Vec<u8>, SourceError> {
            Err(SourceError::Fetch {
                name: key.to_string(),
                message: "404".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported_as_fetch() {
        let mut listing = SourceListing::new("test");
        listing
            .items
            .push(BatchItem::inline("0", "a.png", b"ok".to_vec(), "image/png"));
        listing.items.push(BatchItem::deferred(
            "1",
            "b.png",
            "missing",
            Arc::new(BrokenResolver),
            "image/png",
        ));
        let store = WorkflowStore::new();
        store.install_listing(listing);

        let (tx, mut rx) = mpsc::channel(16);
        let pipeline = BatchPipeline::new(Arc::new(EchoEngine::new())).with_events(tx);
        let err = pipeline.run(&store).await.unwrap_err();
        assert!(matches!(err, PipelineError::Fetch { index: 1, .. }));
        assert_eq!(store.snapshot().pipeline.accumulated_text, "ok");

        drop(pipeline);
        let mut failed = None;
        while let Some(event) = rx.recv().await {
            if let PipelineEvent::Failed { index, kind, .. } = event {
                failed = Some((index, kind));
            }
        }
        assert_eq!(failed, Some((1, "fetch")));
    }

    #[tokio::test]
    async fn test_empty_queue_is_an_error() {
        let store = WorkflowStore::new();
        let pipeline = BatchPipeline::new(Arc::new(EchoEngine::new()));
        assert!(matches!(
            pipeline.run(&store).await,
            Err(PipelineError::Empty)
        ));
    }

    /// Blocks every call until released.
    struct GatedEngine {
        entered: Notify,
        release: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OcrEngine for GatedEngine {
        async fn extract(&self, bytes: &[u8], _media_type: &str) -> Result<OcrResult, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(ocr(&String::from_utf8_lossy(bytes)))
        }
    }

    fn gated() -> Arc<GatedEngine> {
        Arc::new(GatedEngine {
            entered: Notify::new(),
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_start_while_running_is_noop() {
        let store = store_with(&["only"]);
        let engine = gated();
        let pipeline = BatchPipeline::new(engine.clone());

        let first = {
            let (pipeline, store) = (pipeline.clone(), store.clone());
            tokio::spawn(async move { pipeline.run(&store).await })
        };
        engine.entered.notified().await;

        let second = pipeline.run(&store).await.unwrap();
        assert_eq!(second, StartOutcome::AlreadyRunning);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);

        engine.release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, StartOutcome::Completed { processed: 1, .. }));
        assert_eq!(store.snapshot().pipeline.accumulated_text, "only");
    }

    #[tokio::test]
    async fn test_reset_discards_in_flight_result() {
        let store = store_with(&["late", "never"]);
        let engine = gated();
        let pipeline = BatchPipeline::new(engine.clone());

        let run = {
            let (pipeline, store) = (pipeline.clone(), store.clone());
            tokio::spawn(async move { pipeline.run(&store).await })
        };
        engine.entered.notified().await;
        store.reset();
        engine.release.notify_one();

        assert_eq!(run.await.unwrap().unwrap(), StartOutcome::Superseded);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);

        let state = store.snapshot();
        assert!(state.pipeline.accumulated_text.is_empty());
        assert!(state.edited_text.is_empty());
        assert!(state.pipeline.items.is_empty());
    }

    #[tokio::test]
    async fn test_auto_export_on_completion() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store_with(&["Hello", "World"]);
        let pipeline = BatchPipeline::new(Arc::new(EchoEngine::new()))
            .with_auto_export(Exporter::new(dir.path()));

        let StartOutcome::Completed {
            exported: Some(path),
            ..
        } = pipeline.run(&store).await.unwrap()
        else {
            panic!("expected an export");
        };
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Hello\n\n--- [b.png] ---\n\nWorld"
        );
        let log = store.snapshot().pipeline.log;
        assert!(log.last().unwrap().starts_with("Saved to "));
    }
}
