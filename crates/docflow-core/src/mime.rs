//! MIME type detection for uploaded documents.
//!
//! Declared types from upload clients are unreliable; magic bytes win,
//! falling back to extension-based detection, then to the claimed type.

/// Detect the content type of uploaded bytes.
///
/// Order of trust: magic bytes, file extension, claimed type. A claimed
/// binary type whose magic bytes do not match is downgraded to
/// `application/octet-stream`.
pub fn detect_content_type(filename: &str, data: &[u8], claimed: &str) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }

    // Text formats carry no magic bytes.
    if let Some(ext) = filename.rsplit('.').next() {
        if let Some(mime) = mime_from_extension(ext) {
            return mime.to_string();
        }
    }

    if claimed_is_binary(claimed) {
        return "application/octet-stream".to_string();
    }

    claimed.to_string()
}

/// Returns true for document types the processing pipeline accepts.
pub fn is_processable(mime: &str) -> bool {
    matches!(
        mime,
        "application/pdf"
            | "image/png"
            | "image/jpeg"
            | "image/tiff"
            | "image/webp"
            | "text/plain"
            | "text/html"
    )
}

fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "txt" => Some("text/plain"),
        "md" => Some("text/markdown"),
        "html" | "htm" => Some("text/html"),
        "csv" => Some("text/csv"),
        "json" => Some("application/json"),
        "xml" => Some("application/xml"),
        _ => None,
    }
}

fn claimed_is_binary(claimed: &str) -> bool {
    claimed.starts_with("image/")
        || claimed.starts_with("audio/")
        || claimed.starts_with("video/")
        || matches!(
            claimed,
            "application/pdf" | "application/zip" | "application/octet-stream"
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_magic_bytes_win_over_claim() {
        let data = b"%PDF-1.7 rest of document";
        let detected = detect_content_type("upload.bin", data, "text/plain");
        assert_eq!(detected, "application/pdf");
    }

    #[test]
    fn test_png_magic_bytes() {
        let data = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00];
        let detected = detect_content_type("photo", &data, "application/octet-stream");
        assert_eq!(detected, "image/png");
    }

    #[test]
    fn test_text_falls_back_to_extension() {
        let detected = detect_content_type("notes.txt", b"plain words", "");
        assert_eq!(detected, "text/plain");
    }

    #[test]
    fn test_claimed_binary_without_magic_downgrades() {
        let detected = detect_content_type("blob", b"not actually a pdf", "application/pdf");
        assert_eq!(detected, "application/octet-stream");
    }

    #[test]
    fn test_text_claim_passes_through() {
        let detected = detect_content_type("data", b"a,b,c", "text/csv");
        assert_eq!(detected, "text/csv");
    }

    #[test]
    fn test_is_processable() {
        assert!(is_processable("application/pdf"));
        assert!(is_processable("image/png"));
        assert!(!is_processable("application/zip"));
    }
}
