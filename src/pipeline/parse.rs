//! Model reply parsing and the placeholder fallback.
//!
//! The model is asked for a bare JSON array of objects. When the reply is
//! anything else the pipeline does not fail: it emits exactly one
//! [`fallback_row`] and marks the result as degraded. Transport errors are
//! hard failures; parse errors are soft ones.

use crate::schema::Schema;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Confidence attached to the fallback row.
pub const FALLBACK_CONFIDENCE: f64 = 0.75;

/// A raw row as returned by the model: field name → JSON value.
pub type RawRow = Map<String, Value>;

/// Why a reply could not be used as a row set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// The provider returned no textual content.
    EmptyReply,
    /// The reply is not valid JSON.
    InvalidJson(String),
    /// Valid JSON, but not an array.
    NotAnArray,
    /// An array element at this index is not an object.
    NonObjectRow(usize),
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseFailure::EmptyReply => write!(f, "model returned no content"),
            ParseFailure::InvalidJson(e) => write!(f, "reply is not valid JSON: {e}"),
            ParseFailure::NotAnArray => write!(f, "reply is not a JSON array"),
            ParseFailure::NonObjectRow(i) => write!(f, "array element {i} is not an object"),
        }
    }
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```$").unwrap());

/// Remove one outer Markdown code fence (```` ```json ... ``` ````), if any.
pub fn strip_code_fences(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps.get(1).map_or(trimmed, |m| m.as_str()),
        None => trimmed,
    }
}

/// Parse a model reply into raw rows.
///
/// The reply must be a JSON array whose elements are all objects. An empty
/// array is a valid (empty) row set.
pub fn parse_rows(reply: Option<&str>, strip_fences: bool) -> Result<Vec<RawRow>, ParseFailure> {
    let reply = reply.ok_or(ParseFailure::EmptyReply)?;
    let body = if strip_fences {
        strip_code_fences(reply)
    } else {
        reply
    };

    let value: Value =
        serde_json::from_str(body).map_err(|e| ParseFailure::InvalidJson(e.to_string()))?;

    let Value::Array(items) = value else {
        return Err(ParseFailure::NotAnArray);
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(map),
            _ => Err(ParseFailure::NonObjectRow(i)),
        })
        .collect()
}

/// The single placeholder row used when the reply cannot be parsed:
/// every field is `"Sample {name}"` and confidence is 0.75.
pub fn fallback_row(schema: &Schema) -> RawRow {
    let mut row: RawRow = schema
        .fields()
        .iter()
        .map(|f| (f.name.clone(), Value::String(format!("Sample {}", f.name))))
        .collect();
    row.insert("confidence".to_string(), Value::from(FALLBACK_CONFIDENCE));
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, SchemaField};
    use serde_json::json;

    #[test]
    fn parses_array_of_objects() {
        let rows = parse_rows(Some(r#"[{"A": 1, "confidence": 0.9}, {"A": "x"}]"#), true).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["A"], json!(1));
        assert_eq!(rows[1]["A"], json!("x"));
    }

    #[test]
    fn empty_array_is_ok() {
        assert_eq!(parse_rows(Some("[]"), true).unwrap().len(), 0);
    }

    #[test]
    fn not_json() {
        assert!(matches!(
            parse_rows(Some("not json"), true),
            Err(ParseFailure::InvalidJson(_))
        ));
    }

    #[test]
    fn object_is_not_array() {
        assert_eq!(
            parse_rows(Some(r#"{"A": 1}"#), true),
            Err(ParseFailure::NotAnArray)
        );
    }

    #[test]
    fn scalar_elements_rejected() {
        assert_eq!(
            parse_rows(Some(r#"[{"A": 1}, 2]"#), true),
            Err(ParseFailure::NonObjectRow(1))
        );
    }

    #[test]
    fn missing_content() {
        assert_eq!(parse_rows(None, true), Err(ParseFailure::EmptyReply));
    }

    #[test]
    fn fenced_reply() {
        let reply = "```json\n[{\"A\": \"v\"}]\n```";
        assert_eq!(parse_rows(Some(reply), true).unwrap().len(), 1);
        assert!(parse_rows(Some(reply), false).is_err());
    }

    #[test]
    fn strip_fences_variants() {
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("  ```json\n[1]\n```  "), "[1]");
        assert_eq!(strip_code_fences("[1]"), "[1]");
        assert_eq!(strip_code_fences("text ```json\n[1]\n```"), "text ```json\n[1]\n```");
    }

    #[test]
    fn fallback_row_shape() {
        let schema = Schema::new(vec![
            SchemaField::new("Invoice Number", FieldType::Text, ""),
            SchemaField::new("Total", FieldType::Number, ""),
        ]);
        let row = fallback_row(&schema);
        assert_eq!(row["Invoice Number"], json!("Sample Invoice Number"));
        assert_eq!(row["Total"], json!("Sample Total"));
        assert_eq!(row["confidence"], json!(0.75));
        assert_eq!(row.len(), 3);
    }
}
