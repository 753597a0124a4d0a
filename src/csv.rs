//! CSV export of extracted rows.
//!
//! Format:
//! - header line = field names in schema order
//! - `;` field delimiter, `\n` record terminator, UTF-8
//! - a cell is quoted only when it contains `;`, `"`, CR or LF; inner `"`
//!   are doubled
//!
//! Cell rendering:
//!
//! | value            | cell |
//! |------------------|------|
//! | missing / `null` | empty |
//! | string           | as is |
//! | number / boolean | JSON text (`1250.5`, `true`) |
//! | array / object   | compact JSON |
//!
//! A schema with a single column whose value is empty yields `""` on that
//! line: the csv writer quotes a record that would otherwise be blank.

use crate::error::ExtractError;
use crate::output::ExtractedRow;
use crate::schema::Schema;
use ::csv::{QuoteStyle, Terminator, WriterBuilder};
use serde_json::Value;
use std::borrow::Cow;
use std::io::Write;

/// Suggested file name for a download.
pub const CSV_FILE_NAME: &str = "extracted_data.csv";

/// Field delimiter.
pub const DELIMITER: u8 = b';';

/// Write `rows` as CSV, columns ordered by `schema`.
///
/// Row keys that are not schema fields are ignored.
pub fn write_csv<W: Write>(
    schema: &Schema,
    rows: &[ExtractedRow],
    writer: W,
) -> Result<(), ExtractError> {
    let mut wtr = WriterBuilder::new()
        .delimiter(DELIMITER)
        .terminator(Terminator::Any(b'\n'))
        .quote_style(QuoteStyle::Necessary)
        .from_writer(writer);

    wtr.write_record(schema.column_names()).map_err(csv_error)?;
    for row in rows {
        let record: Vec<Cow<'_, str>> = schema
            .column_names()
            .map(|name| render_cell(row.values.get(name)))
            .collect();
        wtr.write_record(record.iter().map(|c| c.as_ref()))
            .map_err(csv_error)?;
    }
    wtr.flush()
        .map_err(|e| ExtractError::Internal(format!("CSV write failed: {e}")))?;
    Ok(())
}

/// [`write_csv`] into a `String`.
pub fn to_csv_string(schema: &Schema, rows: &[ExtractedRow]) -> Result<String, ExtractError> {
    let mut buf = Vec::new();
    write_csv(schema, rows, &mut buf)?;
    String::from_utf8(buf).map_err(|e| ExtractError::Internal(format!("CSV is not UTF-8: {e}")))
}

/// Text of one cell, before quoting.
pub fn render_cell(value: Option<&Value>) -> Cow<'_, str> {
    match value {
        None | Some(Value::Null) => Cow::Borrowed(""),
        Some(Value::String(s)) => Cow::Borrowed(s.as_str()),
        Some(Value::Bool(b)) => Cow::Owned(b.to_string()),
        Some(Value::Number(n)) => Cow::Owned(n.to_string()),
        Some(other) => Cow::Owned(other.to_string()),
    }
}

fn csv_error(e: ::csv::Error) -> ExtractError {
    ExtractError::Internal(format!("CSV write failed: {e}"))
}
