//! Google Gemini vision OCR client.
//!
//! Sends the document inline (base64) together with the instruction prompt
//! and asks for `application/json` output constrained by the response
//! schema. Requires an API key (`GEMINI_API_KEY`).
//!
//! Pacing: `request_delay_ms` is slept before every request so long batches
//! stay under the free-tier request rate. There is no retry on failure.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::prompt::{response_schema, OCR_PROMPT};
use super::{OcrEngine, OcrError, OcrResult};
use crate::config::OcrSettings;
use crate::http_client::HttpClient;

/// Gemini OCR client using Google's Generative Language API.
pub struct GeminiClient {
    http: HttpClient,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    request_delay: Duration,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Serialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    error: Option<GeminiError>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

impl GeminiClient {
    /// Create a client from OCR settings.
    pub fn from_settings(settings: &OcrSettings) -> Result<Self, OcrError> {
        url::Url::parse(&settings.endpoint).map_err(|e| {
            OcrError::NotConfigured(format!("invalid endpoint {}: {}", settings.endpoint, e))
        })?;

        let http = HttpClient::builder("gemini-ocr", settings.timeout())
            .build()
            .map_err(|e| OcrError::NotConfigured(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            temperature: settings.temperature,
            request_delay: settings.request_delay(),
        })
    }

    /// Set the model (e.g., "gemini-flash-lite-latest", "gemini-2.0-flash").
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Whether an API key is available.
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn request_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }

    fn build_request(&self, bytes: &[u8], media_type: &str) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiPart::Text {
                        text: OCR_PROMPT.to_string(),
                    },
                    GeminiPart::InlineData {
                        inline_data: GeminiInlineData {
                            mime_type: media_type.to_string(),
                            data: base64::engine::general_purpose::STANDARD.encode(bytes),
                        },
                    },
                ],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.temperature,
                response_mime_type: "application/json",
                response_schema: response_schema(),
            },
        }
    }
}

#[async_trait]
impl OcrEngine for GeminiClient {
    async fn extract(&self, bytes: &[u8], media_type: &str) -> Result<OcrResult, OcrError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            OcrError::NotConfigured(
                "GEMINI_API_KEY not set. Get an API key from https://ai.google.dev/".to_string(),
            )
        })?;

        let request = self.build_request(bytes, media_type);

        if self.request_delay > Duration::ZERO {
            debug!("Gemini: waiting {:?} before request", self.request_delay);
            tokio::time::sleep(self.request_delay).await;
        }

        debug!(
            "Gemini: sending {} bytes of {} to {}",
            bytes.len(),
            media_type,
            self.model
        );
        let response = self
            .http
            .post_json(&self.request_url(), &request, &[("x-goog-api-key", api_key)])
            .await
            .map_err(|e| OcrError::Service(format!("HTTP request failed: {}", e)))?;

        if !response.is_success() {
            let status = response.status;
            let retry_hint = response
                .is_rate_limited()
                .then(|| response.headers.get("retry-after").cloned())
                .flatten()
                .map(|secs| format!(" (retry after {}s)", secs))
                .unwrap_or_default();
            let body = response.error_snippet().await;
            return Err(OcrError::Service(format!(
                "Gemini API error ({}): {}{}",
                status, body, retry_hint
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| OcrError::Service(format!("Failed to read response: {}", e)))?;

        parse_generate_response(&body)
    }

    fn model_name(&self) -> Option<String> {
        Some(self.model.clone())
    }
}

/// Turn a `generateContent` response body into an `OcrResult`.
fn parse_generate_response(body: &str) -> Result<OcrResult, OcrError> {
    if body.trim().is_empty() {
        return Err(OcrError::MalformedResponse(
            "Gemini returned an empty body".to_string(),
        ));
    }

    let response: GeminiResponse = serde_json::from_str(body)
        .map_err(|e| OcrError::MalformedResponse(format!("Failed to parse response: {}", e)))?;

    if let Some(error) = response.error {
        return Err(OcrError::Service(format!(
            "Gemini API error: {}",
            error.message
        )));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .map(|r| format!(" (blocked: {})", r))
            .unwrap_or_default();
        return Err(OcrError::MalformedResponse(format!(
            "Gemini returned no candidates{}",
            reason
        )));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate
            .finish_reason
            .map(|r| format!(" (finish reason: {})", r))
            .unwrap_or_default();
        return Err(OcrError::MalformedResponse(format!(
            "Gemini returned no text{}",
            reason
        )));
    }

    OcrResult::from_payload(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(text: &str) -> String {
        serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": text}], "role": "model"},
                "finishReason": "STOP"
            }]
        })
        .to_string()
    }

    #[test]
    fn test_parse_structured_candidate() {
        let payload = r#"{"rawText":"Merhba","correctedText":"Merhaba","corrections":[{"original":"Merhba","fixed":"Merhaba","reason":"missing letter"}],"language":"tr","confidence":0.8}"#;
        let result = parse_generate_response(&wrap(payload)).unwrap();
        assert_eq!(result.corrected_text, "Merhaba");
        assert_eq!(result.language, "tr");
        assert_eq!(result.corrections[0].reason, "missing letter");
    }

    #[test]
    fn test_parse_joins_split_parts() {
        let body = serde_json::json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "{\"rawText\":\"a\",\"correctedText\":"},
                    {"text": "\"b\",\"corrections\":[],\"language\":\"en\"}"}
                ]}
            }]
        })
        .to_string();
        let result = parse_generate_response(&body).unwrap();
        assert_eq!(result.corrected_text, "b");
    }

    #[test]
    fn test_empty_body_is_malformed() {
        assert!(matches!(
            parse_generate_response(""),
            Err(OcrError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_no_candidates_is_malformed() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        match parse_generate_response(body) {
            Err(OcrError::MalformedResponse(msg)) => assert!(msg.contains("SAFETY")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_candidate_without_text_is_malformed() {
        let body = r#"{"candidates":[{"finishReason":"MAX_TOKENS"}]}"#;
        match parse_generate_response(body) {
            Err(OcrError::MalformedResponse(msg)) => assert!(msg.contains("MAX_TOKENS")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_error_body_is_service_error() {
        let body = r#"{"error":{"code":503,"message":"overloaded"}}"#;
        assert!(matches!(
            parse_generate_response(body),
            Err(OcrError::Service(_))
        ));
    }

    #[test]
    fn test_schema_violation_is_malformed() {
        let body = wrap(r#"{"text":"free form"}"#);
        assert!(matches!(
            parse_generate_response(&body),
            Err(OcrError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_request_shape() {
        let client = GeminiClient::from_settings(&OcrSettings::default()).unwrap();
        let request = client.build_request(b"\x89PNG", "image/png");
        let value = serde_json::to_value(&request).unwrap();

        let parts = &value["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], OCR_PROMPT);
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], "iVBORw==");

        let config = &value["generationConfig"];
        assert_eq!(config["responseMimeType"], "application/json");
        assert_eq!(config["responseSchema"]["required"][1], "correctedText");
    }

    #[test]
    fn test_request_url() {
        let client = GeminiClient::from_settings(&OcrSettings::default())
            .unwrap()
            .with_model("gemini-2.0-flash");
        assert_eq!(
            client.request_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_request() {
        let mut settings = OcrSettings::default();
        settings.api_key = None;
        let client = GeminiClient::from_settings(&settings).unwrap();
        assert!(!client.is_available());
        assert!(matches!(
            client.extract(b"data", "image/png").await,
            Err(OcrError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let settings = OcrSettings {
            endpoint: "not a url".to_string(),
            ..OcrSettings::default()
        };
        assert!(matches!(
            GeminiClient::from_settings(&settings),
            Err(OcrError::NotConfigured(_))
        ));
    }
}
