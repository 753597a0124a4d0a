//! Prompts for schema-driven tabular extraction.
//!
//! Every prompt lives here so unit tests can inspect the exact wording
//! without a model in the loop. Callers can override the system message via
//! [`crate::config::ExtractionConfig::system_prompt`]; the user message is
//! always produced by [`compose_prompt`].

use crate::schema::Schema;

/// Default system message sent ahead of every extraction request.
pub const SYSTEM_PROMPT: &str = "You are a data extraction specialist. Extract structured data \
according to the provided schema and return only valid JSON.";

/// Render the schema block: one `name (type): description` line per field,
/// in schema order.
pub fn schema_description(schema: &Schema) -> String {
    schema
        .fields()
        .iter()
        .map(|f| f.prompt_line())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the user message for one extraction.
///
/// The source text is embedded verbatim: no truncation, no escaping.
pub fn compose_prompt(schema: &Schema, text: &str) -> String {
    format!(
        r#"
Extract structured data from the following text according to this schema:

Schema:
{schema}

Text:
{text}

Extract all instances of data that match this schema. Return the data as a JSON array where each object contains the schema fields as keys. For each extracted row, also include a "confidence" field (0-1) indicating how confident you are about the extraction.

If certain fields are not found in the text, use null for those values. Focus on extracting as much relevant data as possible.

Return only valid JSON array format.
"#,
        schema = schema_description(schema),
        text = text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, SchemaField};

    fn schema() -> Schema {
        Schema::new(vec![
            SchemaField::new("Invoice Number", FieldType::Text, "Unique invoice id"),
            SchemaField::new("Total Amount", FieldType::Number, "Grand total"),
            SchemaField::new("Paid", FieldType::Boolean, ""),
        ])
    }

    #[test]
    fn one_line_per_field_in_order() {
        let prompt = compose_prompt(&schema(), "body");
        let a = prompt.find("Invoice Number (text): Unique invoice id").unwrap();
        let b = prompt.find("Total Amount (number): Grand total").unwrap();
        let c = prompt.find("Paid (boolean): ").unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn source_text_is_verbatim() {
        let text = "Line \"one\"; {braces} \\ back\n\n  indented\t tab ```json";
        let prompt = compose_prompt(&schema(), text);
        assert!(prompt.contains(text));
    }

    #[test]
    fn asks_for_json_array_confidence_and_null() {
        let prompt = compose_prompt(&schema(), "x");
        assert!(prompt.contains("JSON array"));
        assert!(prompt.contains("\"confidence\" field (0-1)"));
        assert!(prompt.contains("use null"));
    }

    #[test]
    fn deterministic() {
        assert_eq!(compose_prompt(&schema(), "abc"), compose_prompt(&schema(), "abc"));
    }

    #[test]
    fn long_text_is_not_truncated() {
        let text = "row;".repeat(50_000);
        assert!(compose_prompt(&schema(), &text).contains(&text));
    }
}
