/// How a document's content reaches the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Sent as-is to a multimodal model call.
    Image(&'static str),
    /// Text layer extracted first.
    Pdf,
    PlainText,
}

const IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/heic",
    "image/heif",
];

/// Lowercase, strip parameters and fold common aliases.
pub fn normalize_media_type(raw: &str) -> String {
    let base = raw.split(';').next().unwrap_or_default().trim().to_lowercase();
    match base.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "application/x-pdf" => "application/pdf".to_string(),
        _ => base,
    }
}

/// Guess the media type from magic bytes.
pub fn sniff(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0x25, 0x50, 0x44, 0x46, ..] => Some("application/pdf"),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        _ => None,
    }
}

/// Decide the ingestion branch, or `None` for anything we cannot ingest.
pub fn classify(media_type: &str, bytes: &[u8]) -> Option<DocumentKind> {
    let normalized = normalize_media_type(media_type);
    let resolved = if normalized == "application/octet-stream" || normalized.is_empty() {
        sniff(bytes)?
    } else {
        normalized.as_str()
    };

    if let Some(image) = IMAGE_TYPES.iter().find(|t| **t == resolved) {
        return Some(DocumentKind::Image(image));
    }
    match resolved {
        "application/pdf" => Some(DocumentKind::Pdf),
        "text/plain" => Some(DocumentKind::PlainText),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_parameters_and_aliases() {
        assert_eq!(normalize_media_type("Image/JPG"), "image/jpeg");
        assert_eq!(normalize_media_type("text/plain; charset=utf-8"), "text/plain");
    }

    #[test]
    fn octet_stream_is_sniffed() {
        assert_eq!(
            classify("application/octet-stream", b"%PDF-1.7\n..."),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(
            classify("application/octet-stream", &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A]),
            Some(DocumentKind::Image("image/png"))
        );
        assert_eq!(
            classify("application/octet-stream", b"RIFF\x10\x00\x00\x00WEBPVP8 "),
            Some(DocumentKind::Image("image/webp"))
        );
        assert_eq!(classify("application/octet-stream", &[0x4D, 0x5A, 0x90]), None);
    }

    #[test]
    fn declared_types_are_trusted() {
        assert_eq!(classify("image/heic", &[0x00]), Some(DocumentKind::Image("image/heic")));
        assert_eq!(classify("application/zip", b"%PDF"), None);
        assert_eq!(classify("image/gif", b"GIF89a"), None);
    }
}
