//! GeminiClient against a fake Generative Language endpoint.

mod common;

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use serde_json::{json, Value};

use ocrlens::ocr::OCR_PROMPT;
use ocrlens::{GeminiClient, OcrEngine, OcrError};

#[derive(Clone, Default)]
struct Recorded {
    requests: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
}

async fn generate(
    State(recorded): State<Recorded>,
    Path(target): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let key = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    recorded.requests.lock().unwrap().push((target, key, body));
    Json(common::gemini_reply("Dear Sir,\n\nThank you."))
}

async fn client_for(router: Router) -> GeminiClient {
    let endpoint = common::serve(router).await;
    GeminiClient::from_settings(&common::ocr_settings(&endpoint)).unwrap()
}

#[tokio::test]
async fn test_extract_sends_document_inline() {
    let recorded = Recorded::default();
    let router = Router::new()
        .route("/v1beta/models/:target", post(generate))
        .with_state(recorded.clone());
    let client = client_for(router).await;

    let result = client.extract(b"png-bytes", "image/png").await.unwrap();
    assert_eq!(result.corrected_text, "Dear Sir,\n\nThank you.");
    assert_eq!(result.language, "en");

    let requests = recorded.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let (target, key, body) = &requests[0];
    assert_eq!(target, "gemini-test:generateContent");
    assert_eq!(key.as_deref(), Some("test-key"));

    let parts = &body["contents"][0]["parts"];
    assert_eq!(parts[0]["text"], OCR_PROMPT);
    assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
    assert_eq!(
        parts[1]["inline_data"]["data"],
        base64::engine::general_purpose::STANDARD.encode(b"png-bytes")
    );
    assert_eq!(
        body["generationConfig"]["responseMimeType"],
        "application/json"
    );
    assert!(body["generationConfig"]["responseSchema"].is_object());
}

#[tokio::test]
async fn test_http_error_is_service_error() {
    let router = Router::new().route(
        "/v1beta/models/:target",
        post(|| async {
            (
                StatusCode::TOO_MANY_REQUESTS,
                [("retry-after", "30")],
                "quota exhausted",
            )
        }),
    );
    let client = client_for(router).await;

    match client.extract(b"x", "image/jpeg").await {
        Err(OcrError::Service(message)) => {
            assert!(message.contains("429"), "{}", message);
            assert!(message.contains("quota exhausted"), "{}", message);
            assert!(message.contains("retry after 30s"), "{}", message);
        }
        other => panic!("expected service error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_free_text_reply_is_malformed() {
    let router = Router::new().route(
        "/v1beta/models/:target",
        post(|| async {
            Json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "I can see a letter." }] } }]
            }))
        }),
    );
    let client = client_for(router).await;

    let err = client.extract(b"x", "image/jpeg").await.unwrap_err();
    assert!(matches!(err, OcrError::MalformedResponse(_)), "{:?}", err);
}

#[tokio::test]
async fn test_blocked_prompt_is_malformed() {
    let router = Router::new().route(
        "/v1beta/models/:target",
        post(|| async { Json(json!({ "promptFeedback": { "blockReason": "SAFETY" } })) }),
    );
    let client = client_for(router).await;

    match client.extract(b"x", "application/pdf").await {
        Err(OcrError::MalformedResponse(message)) => assert!(message.contains("SAFETY")),
        other => panic!("expected malformed response, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_key_sends_nothing() {
    let recorded = Recorded::default();
    let router = Router::new()
        .route("/v1beta/models/:target", post(generate))
        .with_state(recorded.clone());
    let endpoint = common::serve(router).await;

    let mut settings = common::ocr_settings(&endpoint);
    settings.api_key = None;
    let client = GeminiClient::from_settings(&settings).unwrap();
    assert!(!client.is_available());

    let err = client.extract(b"x", "image/png").await.unwrap_err();
    assert!(matches!(err, OcrError::NotConfigured(_)));
    assert!(recorded.requests.lock().unwrap().is_empty());
}
