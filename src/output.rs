//! Output types produced by an extraction run.

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One detected record: field name → value, plus a confidence in `[0, 1]`.
///
/// Values are kept as the model produced them. A field declared `number`
/// may carry a string; missing fields are simply absent or `null`.
/// Serialised flat: `{"<field>": value, ..., "confidence": 0.9}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRow {
    #[serde(flatten)]
    pub values: Map<String, Value>,
    pub confidence: f64,
}

impl ExtractedRow {
    /// Value for a column, if present and not `null`.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field).filter(|v| !v.is_null())
    }
}

/// Timing and size figures for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Characters of text extracted from the PDF.
    pub text_chars: usize,
    /// Characters of the composed user prompt.
    pub prompt_chars: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub text_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Successful pipeline output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub rows: Vec<ExtractedRow>,
    /// True when the model reply could not be parsed and `rows` holds the
    /// single placeholder row.
    pub degraded: bool,
    pub stats: ExtractionStats,
}

/// Terminal, caller-facing result of one run.
///
/// Either `success` with rows, or a failure with an error message and no
/// rows; never a partially filled mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub success: bool,
    pub rows: Vec<ExtractedRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub degraded: bool,
}

impl ExtractionResult {
    pub fn failed(error: &ExtractError) -> Self {
        Self {
            success: false,
            rows: Vec::new(),
            error: Some(error.to_string()),
            degraded: false,
        }
    }
}

impl From<ExtractionOutput> for ExtractionResult {
    fn from(output: ExtractionOutput) -> Self {
        Self {
            success: true,
            rows: output.rows,
            error: None,
            degraded: output.degraded,
        }
    }
}

impl From<Result<ExtractionOutput, ExtractError>> for ExtractionResult {
    fn from(result: Result<ExtractionOutput, ExtractError>) -> Self {
        match result {
            Ok(output) => output.into(),
            Err(e) => Self::failed(&e),
        }
    }
}
