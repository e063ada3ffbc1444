//! Decoding of raw vision-model completions into JSON.
//!
//! Models routinely wrap JSON in markdown fences and emit trailing commas.
//! Both repairs are applied before parsing; anything still unparseable is a
//! bad-upstream-response error carrying a truncated excerpt for diagnosis.

use crate::error::ExtractError;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```(?:json)?\s*(.*?)\s*```").unwrap());

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").unwrap());

/// A decoded model response: loosely-typed rows plus the claimed confidence.
/// Rows stay as raw JSON values until the validator coerces them.
#[derive(Debug)]
pub struct Decoded {
    pub transactions: Vec<Value>,
    pub confidence: Option<Value>,
}

/// Decode a raw completion into the expected `{transactions, confidence}`
/// object, tolerating fences and trailing commas.
pub fn decode_model_response(raw: &str) -> Result<Decoded, ExtractError> {
    let stripped = strip_fences(raw);
    let repaired = repair_trailing_commas(&stripped);

    let parsed: Value = serde_json::from_str(&repaired).map_err(|e| {
        debug!("Vision response parse failed after repair: {}", e);
        ExtractError::BadUpstreamResponse {
            message: e.to_string(),
            excerpt: excerpt(&repaired, 200),
        }
    })?;

    let transactions = match parsed.get("transactions") {
        Some(Value::Array(rows)) => rows.clone(),
        _ => Vec::new(),
    };
    let confidence = parsed.get("confidence").cloned();

    Ok(Decoded {
        transactions,
        confidence,
    })
}

/// Extract the body of the first fenced code block, if any. When an opening
/// fence has no matching close, fence-only lines are dropped instead.
pub fn strip_fences(raw: &str) -> String {
    if let Some(caps) = FENCED_BLOCK.captures(raw) {
        return caps[1].trim().to_string();
    }

    let trimmed = raw.trim();
    if trimmed.starts_with("```") {
        return trimmed
            .lines()
            .filter(|line| !line.trim().starts_with("```"))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();
    }

    trimmed.to_string()
}

/// Remove a comma sitting directly before a closing brace or bracket.
pub fn repair_trailing_commas(json: &str) -> String {
    TRAILING_COMMA.replace_all(json, "$1").into_owned()
}

/// Char-boundary-safe prefix for diagnostics.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &str = r#"{"transactions":[{"amount":1.0}],"confidence":0.9}"#;

    #[test]
    fn test_fenced_and_unfenced_decode_identically() {
        let fenced = format!("```json\n{}\n```", PLAIN);
        let a = decode_model_response(PLAIN).unwrap();
        let b = decode_model_response(&fenced).unwrap();
        assert_eq!(a.transactions, b.transactions);
        assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn test_fence_without_language_tag() {
        let fenced = format!("```\n{}\n```", PLAIN);
        let decoded = decode_model_response(&fenced).unwrap();
        assert_eq!(decoded.transactions.len(), 1);
    }

    #[test]
    fn test_unclosed_fence_strips_marker_lines() {
        let raw = format!("```json\n{}", PLAIN);
        let decoded = decode_model_response(&raw).unwrap();
        assert_eq!(decoded.transactions.len(), 1);
    }

    #[test]
    fn test_trailing_comma_repair() {
        let raw = r#"{"transactions":[{"amount":1.0,}],"confidence":0.9,}"#;
        let decoded = decode_model_response(raw).unwrap();
        assert_eq!(decoded.transactions.len(), 1);
        assert_eq!(decoded.transactions[0]["amount"], 1.0);
        assert_eq!(decoded.confidence, Some(serde_json::json!(0.9)));
    }

    #[test]
    fn test_commentary_around_fence_is_dropped() {
        let raw = format!("Here is the data:\n```json\n{}\n```\nLet me know!", PLAIN);
        let decoded = decode_model_response(&raw).unwrap();
        assert_eq!(decoded.transactions.len(), 1);
    }

    #[test]
    fn test_residual_garbage_surfaces_excerpt() {
        let err = decode_model_response("I could not read the statement, sorry.").unwrap_err();
        match err {
            ExtractError::BadUpstreamResponse { excerpt, .. } => {
                assert!(excerpt.contains("could not read"));
            }
            other => panic!("expected BadUpstreamResponse, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_transactions_key_is_empty_not_error() {
        let decoded = decode_model_response(r#"{"confidence":0.5}"#).unwrap();
        assert!(decoded.transactions.is_empty());
    }
}
