//! Record decoding: one JSONL line to a record with normalised text.

use serde_json::{Map, Value};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Field names checked, in order, for the text payload.
pub const TEXT_FIELDS: [&str; 5] = ["content", "text", "body", "message", "doc"];

/// What to do when none of [`TEXT_FIELDS`] holds a non-empty string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldFallback {
    /// Use the first string-valued field in document order.
    #[default]
    FirstString,
    /// Treat the record as having no text.
    Strict,
}

/// A line that could not be turned into a record. Always recoverable: the
/// caller skips the line.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("blank line")]
    Blank,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("no text field")]
    NoText,
}

/// One decoded line.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub fields: Map<String, Value>,
    /// NFC-normalised text payload.
    pub text: String,
}

impl Record {
    /// The record's own id, when it carries a usable one.
    ///
    /// Strings are used as-is; numbers are rendered as their JSON text.
    #[must_use]
    pub fn explicit_id(&self) -> Option<String> {
        match self.fields.get("id")? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Parse `line` and extract its text.
///
/// # Errors
///
/// Returns [`DecodeError`] for blank lines, malformed JSON, non-object
/// values, and objects without any usable text.
pub fn decode(line: &str, fallback: FieldFallback) -> Result<Record, DecodeError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::Blank);
    }
    let fields = match serde_json::from_str::<Value>(trimmed)? {
        Value::Object(map) => map,
        other => return Err(DecodeError::NotAnObject(kind_name(&other))),
    };
    let raw = extract_text(&fields, fallback).ok_or(DecodeError::NoText)?;
    let text = normalize(raw);
    Ok(Record { fields, text })
}

/// Pick the text payload out of a record's fields.
#[must_use]
pub fn extract_text(fields: &Map<String, Value>, fallback: FieldFallback) -> Option<&str> {
    let named = TEXT_FIELDS
        .iter()
        .filter_map(|name| fields.get(*name).and_then(Value::as_str))
        .find(|s| !s.is_empty());
    if named.is_some() || fallback == FieldFallback::Strict {
        return named;
    }
    fields.values().find_map(Value::as_str)
}

/// Canonical composition (NFC).
#[must_use]
pub fn normalize(text: &str) -> String {
    text.nfc().collect()
}

const fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let rec = decode(r#"{"text":"second","content":"first"}"#, FieldFallback::Strict).unwrap();
        assert_eq!(rec.text, "first");
    }

    #[test]
    fn test_empty_priority_field_skipped() {
        let rec = decode(r#"{"content":"","body":"b"}"#, FieldFallback::Strict).unwrap();
        assert_eq!(rec.text, "b");
    }

    #[test]
    fn test_fallback_uses_document_order() {
        let line = r#"{"url":"http://x","title":"t"}"#;
        let rec = decode(line, FieldFallback::FirstString).unwrap();
        assert_eq!(rec.text, "http://x");
        assert!(matches!(
            decode(line, FieldFallback::Strict),
            Err(DecodeError::NoText)
        ));
    }

    #[test]
    fn test_nfc_normalisation() {
        // "ガ" as KA + combining voiced mark composes to one scalar.
        let rec = decode("{\"content\":\"\u{30AB}\u{3099}\"}", FieldFallback::Strict).unwrap();
        assert_eq!(rec.text, "\u{30AC}");
        assert_eq!(rec.text.chars().count(), 1);
    }

    #[test]
    fn test_bad_lines() {
        assert!(matches!(decode("   ", FieldFallback::Strict), Err(DecodeError::Blank)));
        assert!(matches!(decode("{\"content\":", FieldFallback::Strict), Err(DecodeError::Json(_))));
        assert!(matches!(decode("[1,2]", FieldFallback::Strict), Err(DecodeError::NotAnObject(_))));
    }

    #[test]
    fn test_explicit_id() {
        let rec = decode(r#"{"id":17,"content":"x"}"#, FieldFallback::Strict).unwrap();
        assert_eq!(rec.explicit_id().as_deref(), Some("17"));
        let rec = decode(r#"{"id":"","content":"x"}"#, FieldFallback::Strict).unwrap();
        assert_eq!(rec.explicit_id(), None);
    }
}
