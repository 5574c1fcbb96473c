//! Structured OCR results and their validation.

use serde::{Deserialize, Serialize};

use super::OcrError;

/// One correction the model applied while cleaning up the raw extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrCorrection {
    pub original: String,
    pub fixed: String,
    pub reason: String,
}

/// Result of one OCR call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrResult {
    /// Unmodified extraction.
    pub raw_text: String,
    /// Cleaned extraction with paragraph breaks and indentation preserved.
    pub corrected_text: String,
    /// Corrections applied, in order.
    pub corrections: Vec<OcrCorrection>,
    /// Detected primary language.
    pub language: String,
    /// Confidence score (0.0 - 1.0), if the service reported one.
    pub confidence: Option<f32>,
}

/// Wire shape of the structured payload the model returns.
///
/// Required fields mirror the response schema; a missing or null
/// `correctedText` makes the whole payload unparseable.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OcrPayload {
    raw_text: String,
    corrected_text: String,
    corrections: Vec<OcrCorrection>,
    language: String,
    #[serde(default)]
    confidence: Option<f64>,
}

impl OcrResult {
    /// Parse the JSON document produced by the model.
    ///
    /// Tolerates a Markdown code fence around the JSON. Confidence values on a
    /// 0-100 scale are converted to 0-1; anything else out of range is clamped.
    pub fn from_payload(text: &str) -> Result<Self, OcrError> {
        let json = strip_code_fence(text);
        if json.is_empty() {
            return Err(OcrError::MalformedResponse(
                "empty structured payload".to_string(),
            ));
        }

        let payload: OcrPayload = serde_json::from_str(json).map_err(|e| {
            OcrError::MalformedResponse(format!("payload does not match schema: {}", e))
        })?;

        Ok(Self {
            raw_text: payload.raw_text,
            corrected_text: payload.corrected_text,
            corrections: payload.corrections,
            language: payload.language,
            confidence: payload.confidence.and_then(normalize_confidence),
        })
    }
}

fn normalize_confidence(value: f64) -> Option<f32> {
    if !value.is_finite() {
        return None;
    }
    let scaled = if value > 1.0 && value <= 100.0 {
        value / 100.0
    } else {
        value
    };
    Some(scaled.clamp(0.0, 1.0) as f32)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") up to the first newline.
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}
