//! Remote OCR through a vision LLM.
//!
//! `OcrEngine` is the seam the pipeline talks to: raw document bytes and a
//! media type in, a structured `OcrResult` out. `GeminiClient` implements it
//! against Google's Generative Language API with a JSON response schema.
//!
//! Engines never retry. A failed call surfaces as `OcrError` and the caller
//! decides what happens next.

mod gemini;
mod prompt;
mod result;

pub use gemini::GeminiClient;
pub use prompt::{response_schema, OCR_PROMPT};
pub use result::{OcrCorrection, OcrResult};

use async_trait::async_trait;
use thiserror::Error;

/// Errors from OCR engines.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The request failed in transport or the service reported an error.
    #[error("OCR service error: {0}")]
    Service(String),

    /// The call succeeded but returned no parseable structured payload.
    #[error("Malformed OCR response: {0}")]
    MalformedResponse(String),

    /// The engine cannot run (missing API key, bad endpoint).
    #[error("OCR engine not configured: {0}")]
    NotConfigured(String),
}

/// A remote OCR engine. One call corresponds to one document or page.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Extract text from `bytes` of the given media type.
    async fn extract(&self, bytes: &[u8], media_type: &str) -> Result<OcrResult, OcrError>;

    /// Model name for this engine, if applicable.
    fn model_name(&self) -> Option<String> {
        None
    }
}
