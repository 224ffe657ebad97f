//! Media-type routing from an uploaded document to a model-ready payload.

pub mod media;
pub mod pdf;

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::AnalysisError;
use crate::llm::ContentPart;
use media::DocumentKind;
pub use media::{classify, normalize_media_type};
pub use pdf::{ExtractionError, PdfiumTextExtractor, TextExtractor};

/// Retrieval query used when the document content is only visible to the model.
pub const IMAGE_RETRIEVAL_QUERY: &str = "medical lab report analysis blood test interpretation";

/// Upper bound on the text used as a knowledge-retrieval query.
const MAX_QUERY_CHARS: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Truncation {
    pub original_chars: usize,
    pub kept_chars: usize,
}

/// What the prompt assembler receives for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptionPayload {
    Image {
        mime_type: String,
        data_base64: String,
    },
    Text {
        text: String,
        truncation: Option<Truncation>,
    },
}

impl TranscriptionPayload {
    pub fn retrieval_query(&self) -> String {
        match self {
            TranscriptionPayload::Image { .. } => IMAGE_RETRIEVAL_QUERY.to_string(),
            TranscriptionPayload::Text { text, .. } => text.chars().take(MAX_QUERY_CHARS).collect(),
        }
    }

    /// Content part carrying the document itself.
    pub fn document_part(&self) -> ContentPart {
        match self {
            TranscriptionPayload::Image {
                mime_type,
                data_base64,
            } => ContentPart::Image {
                mime_type: mime_type.clone(),
                data_base64: data_base64.clone(),
            },
            TranscriptionPayload::Text { text, .. } => ContentPart::Text {
                text: format!("LAB REPORT TEXT:\n{text}"),
            },
        }
    }
}

/// Picks the transcription strategy for a document and rejects what cannot be analysed
/// before any model call is made.
pub struct IngestionRouter {
    extractor: Arc<dyn TextExtractor>,
    max_chars: usize,
}

impl IngestionRouter {
    pub fn new(extractor: Arc<dyn TextExtractor>, max_chars: usize) -> Self {
        Self {
            extractor,
            max_chars,
        }
    }

    pub async fn ingest(
        &self,
        bytes: &[u8],
        media_type: &str,
    ) -> Result<TranscriptionPayload, AnalysisError> {
        if bytes.is_empty() {
            return Err(AnalysisError::UnreadableDocument(
                "uploaded document is empty".to_string(),
            ));
        }

        let kind = classify(media_type, bytes)
            .ok_or_else(|| AnalysisError::UnsupportedMedia(normalize_media_type(media_type)))?;

        match kind {
            DocumentKind::Image(mime_type) => {
                info!(mime_type, bytes = bytes.len(), "Routing image to multimodal call");
                Ok(TranscriptionPayload::Image {
                    mime_type: mime_type.to_string(),
                    data_base64: STANDARD.encode(bytes),
                })
            }
            DocumentKind::Pdf => {
                let extractor = self.extractor.clone();
                let owned = bytes.to_vec();
                let text = tokio::task::spawn_blocking(move || extractor.extract_text(&owned))
                    .await
                    .map_err(|e| AnalysisError::Internal(format!("text extraction task failed: {e}")))??;
                self.text_payload(text)
            }
            DocumentKind::PlainText => self.text_payload(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    fn text_payload(&self, text: String) -> Result<TranscriptionPayload, AnalysisError> {
        if text.trim().is_empty() {
            warn!("Text-bearing document has no extractable text");
            return Err(AnalysisError::UnreadableDocument(
                "no text layer found; the document is likely a scan".to_string(),
            ));
        }

        let (text, truncation) = truncate_chars(text, self.max_chars);
        match truncation {
            Some(t) => warn!(
                original_chars = t.original_chars,
                kept_chars = t.kept_chars,
                "Extracted text truncated"
            ),
            None => info!(chars = text.chars().count(), "Extracted document text"),
        }

        Ok(TranscriptionPayload::Text { text, truncation })
    }
}

/// Cut `text` to at most `max_chars` characters, never splitting a code point.
pub fn truncate_chars(text: String, max_chars: usize) -> (String, Option<Truncation>) {
    let original_chars = text.chars().count();
    if original_chars <= max_chars {
        return (text, None);
    }

    let kept: String = text.chars().take(max_chars).collect();
    (
        kept,
        Some(Truncation {
            original_chars,
            kept_chars: max_chars,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedText {
        text: &'static str,
        calls: AtomicUsize,
    }

    impl TextExtractor for FixedText {
        fn extract_text(&self, _bytes: &[u8]) -> Result<String, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.to_string())
        }
    }

    fn router(text: &'static str, max_chars: usize) -> (IngestionRouter, Arc<FixedText>) {
        let extractor = Arc::new(FixedText {
            text,
            calls: AtomicUsize::new(0),
        });
        (IngestionRouter::new(extractor.clone(), max_chars), extractor)
    }

    #[tokio::test]
    async fn images_pass_through_as_base64() {
        let (router, extractor) = router("", 100);
        let payload = router.ingest(&[0xFF, 0xD8, 0xFF, 0xE0], "image/jpg").await.unwrap();

        assert_eq!(
            payload,
            TranscriptionPayload::Image {
                mime_type: "image/jpeg".into(),
                data_base64: STANDARD.encode([0xFF, 0xD8, 0xFF, 0xE0]),
            }
        );
        assert_eq!(payload.retrieval_query(), IMAGE_RETRIEVAL_QUERY);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pdf_text_is_extracted() {
        let (router, extractor) = router("HbA1c 10.5 %", 100);
        let payload = router.ingest(b"%PDF-1.4", "application/pdf").await.unwrap();

        assert_eq!(
            payload,
            TranscriptionPayload::Text {
                text: "HbA1c 10.5 %".into(),
                truncation: None
            }
        );
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn scanned_pdf_is_unreadable() {
        let (router, _) = router(" \n\t ", 100);
        let err = router.ingest(b"%PDF-1.4", "application/pdf").await.unwrap_err();
        assert!(matches!(err, AnalysisError::UnreadableDocument(_)));
        assert!(err.user_message().contains("image"));
    }

    #[tokio::test]
    async fn unsupported_media_fails_fast() {
        let (router, extractor) = router("text", 100);
        let err = router.ingest(b"PK\x03\x04", "application/zip").await.unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedMedia(ref m) if m == "application/zip"));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_upload_is_unreadable() {
        let (router, _) = router("text", 100);
        let err = router.ingest(&[], "image/png").await.unwrap_err();
        assert_eq!(err.kind(), "unreadable_document");
    }

    #[tokio::test]
    async fn long_text_is_truncated_and_recorded() {
        let (router, _) = router("", 5);
        let payload = router
            .ingest("ééééééé glucose".as_bytes(), "text/plain; charset=utf-8")
            .await
            .unwrap();

        match payload {
            TranscriptionPayload::Text { text, truncation } => {
                assert_eq!(text, "ééééé");
                assert_eq!(
                    truncation,
                    Some(Truncation {
                        original_chars: 15,
                        kept_chars: 5
                    })
                );
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn extraction_errors_map_to_pipeline_errors() {
        let err: AnalysisError = ExtractionError::Encrypted.into();
        assert_eq!(err.kind(), "unreadable_document");
        let err: AnalysisError = ExtractionError::LibraryUnavailable("missing".into()).into();
        assert_eq!(err.kind(), "internal");
    }
}
