use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on how much raw model text is carried inside a parse error.
pub const PREVIEW_CHARS: usize = 200;

/// Startup-time configuration failures. These abort the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingCredential(&'static str),

    #[error("no model candidates configured")]
    NoCandidates,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Failure of a single call against a single model identifier.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ModelCallError {
    #[error("quota or rate limit exceeded: {0}")]
    Quota(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("model not found or unsupported: {0}")]
    NotFound(String),

    #[error("request rejected as malformed: {0}")]
    MalformedRequest(String),

    #[error("model call timed out after {0}s")]
    Timeout(u64),

    #[error("model unreachable: {0}")]
    Unreachable(String),
}

impl ModelCallError {
    pub fn kind(&self) -> ModelUnavailableKind {
        match self {
            ModelCallError::Quota(_) => ModelUnavailableKind::Quota,
            ModelCallError::Permission(_) => ModelUnavailableKind::Permission,
            ModelCallError::NotFound(_) => ModelUnavailableKind::NotFound,
            ModelCallError::MalformedRequest(_) => ModelUnavailableKind::MalformedRequest,
            ModelCallError::Timeout(_) | ModelCallError::Unreachable(_) => {
                ModelUnavailableKind::Unreachable
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelUnavailableKind {
    Quota,
    Permission,
    NotFound,
    MalformedRequest,
    Unreachable,
}

/// Errors returned from the analysis pipeline boundary.
///
/// Serializable so a failing stage can hand the typed error back through the flow context.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum AnalysisError {
    #[error("unsupported media type: {0}")]
    UnsupportedMedia(String),

    #[error("document has no machine-readable text: {0}")]
    UnreadableDocument(String),

    #[error("all model candidates exhausted ({kind:?}): {last_error}")]
    ModelUnavailable {
        kind: ModelUnavailableKind,
        last_error: ModelCallError,
    },

    #[error("could not recover structured output from model response: {reason} (preview: {preview:?})")]
    ResponseParse { reason: String, preview: String },

    #[error("internal pipeline error: {0}")]
    Internal(String),
}

impl AnalysisError {
    pub fn unavailable(last_error: ModelCallError) -> Self {
        AnalysisError::ModelUnavailable {
            kind: last_error.kind(),
            last_error,
        }
    }

    pub fn response_parse(reason: impl Into<String>, raw: &str) -> Self {
        AnalysisError::ResponseParse {
            reason: reason.into(),
            preview: preview(raw),
        }
    }

    /// Stable machine-readable tag for logs and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::UnsupportedMedia(_) => "unsupported_media",
            AnalysisError::UnreadableDocument(_) => "unreadable_document",
            AnalysisError::ModelUnavailable { kind, .. } => match kind {
                ModelUnavailableKind::Quota => "model_quota",
                ModelUnavailableKind::Permission => "model_permission",
                ModelUnavailableKind::NotFound => "model_not_found",
                ModelUnavailableKind::MalformedRequest => "model_malformed_request",
                ModelUnavailableKind::Unreachable => "model_unreachable",
            },
            AnalysisError::ResponseParse { .. } => "response_parse",
            AnalysisError::Internal(_) => "internal",
        }
    }

    /// Message safe to show an end user. Never contains raw model text.
    pub fn user_message(&self) -> &'static str {
        match self {
            AnalysisError::UnsupportedMedia(_) => {
                "This file type is not supported. Please upload a JPEG, PNG, WEBP or HEIC image, or a PDF."
            }
            AnalysisError::UnreadableDocument(_) => {
                "The document content is not machine-readable. Please resubmit it as an image (photo or screenshot)."
            }
            AnalysisError::ModelUnavailable { kind, .. } => match kind {
                ModelUnavailableKind::Quota | ModelUnavailableKind::Permission => {
                    "The analysis service is temporarily unavailable. Please try again later."
                }
                _ => "Analysis failed, please retry.",
            },
            AnalysisError::ResponseParse { .. } | AnalysisError::Internal(_) => {
                "Analysis failed, please retry."
            }
        }
    }
}

/// Char-safe bounded preview of untrusted text.
pub fn preview(raw: &str) -> String {
    let mut out: String = raw.chars().take(PREVIEW_CHARS).collect();
    if raw.chars().count() > PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_is_bounded() {
        let raw = "x".repeat(5_000);
        let err = AnalysisError::response_parse("bad json", &raw);
        match err {
            AnalysisError::ResponseParse { preview, .. } => {
                assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn user_messages_hide_model_text() {
        let err = AnalysisError::response_parse("bad json", "SECRET MODEL OUTPUT");
        assert!(!err.user_message().contains("SECRET"));
        assert_eq!(err.kind(), "response_parse");
    }

    #[test]
    fn quota_maps_to_retry_later() {
        let err = AnalysisError::unavailable(ModelCallError::Quota("429".into()));
        assert_eq!(err.kind(), "model_quota");
        assert!(err.user_message().contains("try again later"));
    }

    #[test]
    fn survives_a_json_round_trip() {
        let err = AnalysisError::unavailable(ModelCallError::Permission("403".into()));
        let back: AnalysisError =
            serde_json::from_value(serde_json::to_value(&err).unwrap()).unwrap();
        assert_eq!(back.kind(), "model_permission");
    }

    #[test]
    fn timeouts_are_unreachable() {
        assert_eq!(
            ModelCallError::Timeout(30).kind(),
            ModelUnavailableKind::Unreachable
        );
    }
}
