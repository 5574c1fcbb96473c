//! ocrlens - document OCR workflow.
//!
//! Sources (local files and folders, camera captures, Google Drive folders)
//! produce a queue of documents. The batch pipeline sends them one at a time
//! to a vision LLM and accumulates the extracted text into one editable
//! document, resuming from the failed item when a batch is interrupted.

pub mod config;
pub mod export;
pub mod http_client;
pub mod ocr;
pub mod pipeline;
pub mod sources;
pub mod utils;
pub mod workflow;

pub use config::Config;
pub use export::{ExportError, Exporter};
pub use ocr::{GeminiClient, OcrEngine, OcrError, OcrResult};
pub use pipeline::{BatchPipeline, PipelineError, PipelineEvent, StartOutcome};
pub use sources::{BatchItem, SourceError, SourceListing};
pub use workflow::{Workflow, WorkflowState, WorkflowStore};
