//! Instruction prompt and response schema sent with every OCR request.

use serde_json::{json, Value};

/// Instruction sent alongside the document.
pub const OCR_PROMPT: &str = "Extract all text from this document with high accuracy. \
Preserve the original layout, paragraph breaks and indentation. \
Correct OCR errors while preserving meaning, and list every correction you made. \
Return strictly JSON matching the response schema.";

/// Response schema requested from the model (OpenAPI subset used by Gemini).
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "rawText": {
                "type": "STRING",
                "description": "Initial raw extraction."
            },
            "correctedText": {
                "type": "STRING",
                "description": "Corrected text with preserved structure."
            },
            "corrections": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "original": { "type": "STRING" },
                        "fixed": { "type": "STRING" },
                        "reason": { "type": "STRING" }
                    },
                    "required": ["original", "fixed", "reason"]
                }
            },
            "language": { "type": "STRING" },
            "confidence": { "type": "NUMBER" }
        },
        "required": ["rawText", "correctedText", "corrections", "language"]
    })
}
