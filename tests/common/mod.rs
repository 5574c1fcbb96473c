//! Shared helpers: in-process fake Gemini and Drive endpoints.

#![allow(dead_code)]

use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use ocrlens::config::{DriveSettings, OcrSettings};

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A `generateContent` response carrying a well-formed OCR payload.
pub fn gemini_reply(text: &str) -> Value {
    let payload = json!({
        "rawText": text,
        "correctedText": text,
        "corrections": [],
        "language": "en",
        "confidence": 0.9,
    });
    json!({
        "candidates": [{
            "content": { "parts": [{ "text": payload.to_string() }] },
            "finishReason": "STOP",
        }]
    })
}

pub fn ocr_settings(endpoint: &str) -> OcrSettings {
    OcrSettings {
        endpoint: endpoint.to_string(),
        model: "gemini-test".to_string(),
        api_key: Some("test-key".to_string()),
        request_delay_ms: 0,
        timeout_secs: 10,
        ..Default::default()
    }
}

pub fn drive_settings(api_base: &str) -> DriveSettings {
    DriveSettings {
        api_base: api_base.to_string(),
        token_url: format!("{}/token", api_base),
        page_size: 2,
        timeout_secs: 10,
        ..Default::default()
    }
}
