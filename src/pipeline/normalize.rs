//! Result normalisation: raw model rows → [`ExtractedRow`]s.
//!
//! Values pass through untouched. No coercion against the declared
//! [`crate::schema::FieldType`] happens here. The one guarantee is that
//! every row carries a confidence:
//!
//! | `confidence` in the raw row | result |
//! |-----------------------------|--------|
//! | number                      | clamped to `[0, 1]` |
//! | numeric string (`"0.8"`)    | parsed, clamped |
//! | absent / `null` / other     | `1.0` |

use crate::output::ExtractedRow;
use crate::pipeline::parse::RawRow;
use serde_json::Value;
use tracing::warn;

/// Confidence assumed when the model reports none.
pub const DEFAULT_CONFIDENCE: f64 = 1.0;

/// Normalise every raw row, preserving order.
pub fn normalize_rows(raw: Vec<RawRow>) -> Vec<ExtractedRow> {
    raw.into_iter().map(normalize_row).collect()
}

/// Lift `confidence` out of the value map. The other keys keep the order
/// the model produced them in.
pub fn normalize_row(raw: RawRow) -> ExtractedRow {
    let confidence = raw
        .get("confidence")
        .and_then(confidence_of)
        .unwrap_or(DEFAULT_CONFIDENCE);
    let values = raw
        .into_iter()
        .filter(|(key, _)| key != "confidence")
        .collect();
    ExtractedRow { values, confidence }
}

fn confidence_of(value: &Value) -> Option<f64> {
    let c = match value {
        Value::Null => return None,
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let Some(c) = c.filter(|c| c.is_finite()) else {
        warn!("Ignoring non-numeric confidence {}, using {}", value, DEFAULT_CONFIDENCE);
        return None;
    };
    let clamped = c.clamp(0.0, 1.0);
    if clamped != c {
        warn!("Clamped out-of-range confidence {} → {}", c, clamped);
    }
    Some(clamped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(v: Value) -> RawRow {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn keeps_reported_confidence() {
        let row = normalize_row(raw(json!({"A": "x", "confidence": 0.42})));
        assert_eq!(row.confidence, 0.42);
        assert!(!row.values.contains_key("confidence"));
        assert_eq!(row.values["A"], json!("x"));
    }

    #[test]
    fn defaults_missing_confidence() {
        let row = normalize_row(raw(json!({"A": 1})));
        assert_eq!(row.confidence, 1.0);
    }

    #[test]
    fn null_and_garbage_default() {
        assert_eq!(normalize_row(raw(json!({"confidence": null}))).confidence, 1.0);
        assert_eq!(normalize_row(raw(json!({"confidence": "high"}))).confidence, 1.0);
        assert_eq!(normalize_row(raw(json!({"confidence": [0.3]}))).confidence, 1.0);
    }

    #[test]
    fn numeric_string_parsed() {
        assert_eq!(normalize_row(raw(json!({"confidence": " 0.8 "}))).confidence, 0.8);
    }

    #[test]
    fn out_of_range_clamped() {
        assert_eq!(normalize_row(raw(json!({"confidence": 95}))).confidence, 1.0);
        assert_eq!(normalize_row(raw(json!({"confidence": -0.5}))).confidence, 0.0);
    }

    #[test]
    fn values_are_not_coerced() {
        let row = normalize_row(raw(json!({
            "Total": "1,250.00",
            "Paid": "yes",
            "Date": null,
            "Extra": {"nested": true}
        })));
        assert_eq!(row.values["Total"], json!("1,250.00"));
        assert_eq!(row.values["Paid"], json!("yes"));
        assert_eq!(row.values["Date"], Value::Null);
        assert_eq!(row.values["Extra"], json!({"nested": true}));
    }

    #[test]
    fn key_order_preserved() {
        let row = normalize_row(raw(json!({"Zeta": 1, "confidence": 0.5, "Alpha": 2, "Mid": 3})));
        let keys: Vec<_> = row.values.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Zeta", "Alpha", "Mid"]);
        let wire = serde_json::to_string(&row).unwrap();
        assert!(wire.starts_with(r#"{"Zeta":1,"Alpha":2,"Mid":3"#), "got: {wire}");
    }

    #[test]
    fn order_preserved() {
        let rows = normalize_rows(vec![raw(json!({"n": 1})), raw(json!({"n": 2})), raw(json!({"n": 3}))]);
        let ns: Vec<_> = rows.iter().map(|r| r.values["n"].clone()).collect();
        assert_eq!(ns, vec![json!(1), json!(2), json!(3)]);
    }
}
