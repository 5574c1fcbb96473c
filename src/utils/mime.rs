//! MIME type guessing and OCR input classification.

/// MIME type reported for PDF documents.
pub const PDF_MIME: &str = "application/pdf";

/// Guess MIME type from a filename's extension.
pub fn guess_mime_from_filename(name: &str) -> &'static str {
    let ext = match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    };

    match ext.as_str() {
        "pdf" => PDF_MIME,
        "jpg" | "jpeg" | "jfif" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Check if a MIME type can be sent to the OCR service (`image/*` or PDF).
///
/// Parameters such as `; charset=...` are ignored and the comparison is
/// case-insensitive.
pub fn is_supported_media_type(mime_type: &str) -> bool {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    essence == PDF_MIME || (essence.starts_with("image/") && essence.len() > "image/".len())
}

/// Check if a MIME type is a PDF.
pub fn is_pdf(mime_type: &str) -> bool {
    mime_type
        .split(';')
        .next()
        .is_some_and(|m| m.trim().eq_ignore_ascii_case(PDF_MIME))
}
