//! # edgequake-pdf2csv
//!
//! Extract tabular data from PDF documents with a language model, driven by
//! a user-defined schema, and export it as semicolon-delimited CSV.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Schema + PDF
//!  │
//!  ├─ 1. Validate  schema non-empty, unique names, payload present
//!  ├─ 2. Text      PDF bytes → plain text (lopdf, spawn_blocking)
//!  ├─ 3. Prompt    schema description + document text
//!  ├─ 4. Model     one chat-completion call (gpt-4o-mini by default)
//!  ├─ 5. Parse     JSON array of row objects, or one placeholder row
//!  └─ 6. Normalize every row gets a confidence in [0, 1]
//! ```
//!
//! The rows can then be written as CSV ([`csv::write_csv`]) or served over
//! HTTP ([`server`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2csv::{ExtractionConfig, Extractor, FieldType, Schema, SchemaField};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads OPENAI_API_KEY / OPENAI_BASE_URL / PDF2CSV_MODEL
//!     let extractor = Extractor::from_config(ExtractionConfig::from_env())?;
//!     let schema = Schema::new(vec![
//!         SchemaField::new("Company", FieldType::Text, "Vendor name"),
//!         SchemaField::new("Total", FieldType::Number, "Invoice total"),
//!     ]);
//!     let pdf = std::fs::read("invoice.pdf")?;
//!     let output = extractor.extract(&pdf, &schema).await?;
//!     print!("{}", edgequake_pdf2csv::csv::to_csv_string(&schema, &output.rows)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2csv` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2csv = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod csv;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{ErrorKind, ExtractError};
pub use extract::{Extractor, ExtractorBuilder};
pub use output::{ExtractedRow, ExtractionOutput, ExtractionResult, ExtractionStats};
pub use pipeline::llm::{ChatRequest, Completion, ModelBackend, OpenAiChatBackend, ProviderBackend};
pub use pipeline::text::{LopdfTextExtractor, PlaceholderTextExtractor, TextExtractor};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, PipelineStage, ProgressCallback};
pub use schema::{FieldType, Schema, SchemaField};
