use serde_json::{Map, Value};
use tracing::debug;

use crate::error::AnalysisError;

type Object = Map<String, Value>;
type Strategy = fn(&str) -> Option<Object>;

/// Tried in order; the first strategy yielding a JSON object wins.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("fenced_block", from_fenced_block),
    ("raw", from_raw),
    ("brace_span", from_brace_span),
];

/// Recover the JSON object embedded in free-form model output.
pub fn extract_object(raw: &str) -> Result<Object, AnalysisError> {
    if raw.trim().is_empty() {
        return Err(AnalysisError::response_parse("empty model response", raw));
    }

    for (name, strategy) in STRATEGIES {
        if let Some(object) = strategy(raw) {
            debug!(strategy = *name, keys = object.len(), "Recovered JSON object from model output");
            return Ok(object);
        }
    }

    Err(AnalysisError::response_parse(
        "no JSON object could be recovered",
        raw,
    ))
}

fn from_fenced_block(raw: &str) -> Option<Object> {
    let interior = fenced_interior(raw)?;
    parse_object(interior).or_else(|| from_brace_span(interior))
}

fn from_raw(raw: &str) -> Option<Object> {
    parse_object(raw)
}

/// First `{` through last `}`.
fn from_brace_span(raw: &str) -> Option<Object> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_object(&raw[start..=end])
}

fn parse_object(candidate: &str) -> Option<Object> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// Interior of the first triple-backtick block, skipping an optional language tag.
/// An unterminated fence runs to the end of the text.
fn fenced_interior(raw: &str) -> Option<&str> {
    let open = raw.find("```")?;
    let mut rest = &raw[open + 3..];

    if let Some(newline) = rest.find('\n') {
        let tag = rest[..newline].trim();
        if tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            rest = &rest[newline + 1..];
        }
    }

    let body = match rest.find("```") {
        Some(close) => &rest[..close],
        None => rest,
    };
    Some(body.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_block_ignores_surrounding_prose() {
        let raw = "Here is the result:\n```json\n{\"tests\":[]}\n```\nThanks {not json}";
        let object = extract_object(raw).unwrap();
        assert_eq!(object.get("tests"), Some(&Value::Array(vec![])));
        assert_eq!(object.len(), 1);
    }

    #[test]
    fn untagged_fence_and_unterminated_fence() {
        assert!(extract_object("```\n{\"a\":1}\n```").is_ok());
        assert!(extract_object("```JSON\n{\"a\":1}").is_ok());
    }

    #[test]
    fn plain_json_parses_directly() {
        let object = extract_object("  {\"confidence\": 0.8}\n").unwrap();
        assert_eq!(object["confidence"], 0.8);
    }

    #[test]
    fn brace_span_recovers_wrapped_object() {
        let object = extract_object("Sure! {\"narrativeSummary\": \"ok\"} Hope this helps.").unwrap();
        assert_eq!(object["narrativeSummary"], "ok");
    }

    #[test]
    fn fenced_block_with_prose_inside() {
        let raw = "```json\nResult follows\n{\"tests\": []}\n```";
        assert!(extract_object(raw).is_ok());
    }

    #[test]
    fn failures_carry_bounded_preview() {
        let raw = format!("I cannot help with that. {}", "x".repeat(1_000));
        match extract_object(&raw).unwrap_err() {
            AnalysisError::ResponseParse { preview, .. } => {
                assert!(preview.starts_with("I cannot help"));
                assert!(preview.chars().count() <= crate::error::PREVIEW_CHARS + 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn arrays_and_truncated_objects_fail() {
        assert!(extract_object("[1, 2, 3]").is_err());
        assert!(extract_object("{\"tests\": [").is_err());
        assert!(extract_object("").is_err());
    }
}
