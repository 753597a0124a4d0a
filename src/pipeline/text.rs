//! Text extraction: raw PDF bytes → plain text.
//!
//! The pipeline only depends on the [`TextExtractor`] capability, so a
//! different parser (OCR service, pdfium, …) can be plugged in through
//! [`crate::extract::ExtractorBuilder::text_extractor`] without touching the
//! other stages.
//!
//! Two implementations ship with the crate:
//!
//! * [`LopdfTextExtractor`]: real extraction with the pure-Rust `lopdf`
//!   parser. Parsing is CPU-bound and runs inside `spawn_blocking`.
//! * [`PlaceholderTextExtractor`]: returns a fixed sample text for any
//!   input. Useful for demos and for exercising the model side on its own.

use crate::error::ExtractError;
use async_trait::async_trait;
use lopdf::Document;
use tracing::{debug, warn};

/// Text returned by [`PlaceholderTextExtractor`].
pub const PLACEHOLDER_TEXT: &str = "Sample PDF content for demonstration. This would contain the \
actual extracted text from the PDF document including tables, forms, and structured data.";

/// Given PDF bytes, produce plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Extract the document text. Fails with
    /// [`ExtractError::TextExtraction`] when the bytes cannot be read.
    async fn extract(&self, pdf: &[u8]) -> Result<String, ExtractError>;
}

/// Fixed-output extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderTextExtractor;

#[async_trait]
impl TextExtractor for PlaceholderTextExtractor {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    async fn extract(&self, pdf: &[u8]) -> Result<String, ExtractError> {
        debug!("Placeholder extractor ignoring {} input bytes", pdf.len());
        Ok(PLACEHOLDER_TEXT.to_string())
    }
}

/// Pure-Rust PDF text extraction backed by `lopdf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfTextExtractor;

#[async_trait]
impl TextExtractor for LopdfTextExtractor {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    async fn extract(&self, pdf: &[u8]) -> Result<String, ExtractError> {
        let bytes = pdf.to_vec();
        tokio::task::spawn_blocking(move || extract_text_blocking(&bytes))
            .await
            .map_err(|e| ExtractError::Internal(format!("Text extraction task panicked: {e}")))?
    }
}

/// Blocking implementation: load the document and concatenate page text.
///
/// Pages whose content stream cannot be decoded are skipped with a warning;
/// a document that cannot be loaded at all is an error.
fn extract_text_blocking(bytes: &[u8]) -> Result<String, ExtractError> {
    let doc = Document::load_mem(bytes).map_err(|e| ExtractError::TextExtraction {
        detail: e.to_string(),
    })?;

    let pages = doc.get_pages();
    debug!("PDF loaded: {} pages", pages.len());

    let mut text = String::new();
    for page_num in pages.keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(content) => {
                text.push_str(&content);
                if !content.ends_with('\n') {
                    text.push('\n');
                }
            }
            Err(e) => warn!("Skipping page {}: {}", page_num, e),
        }
    }

    Ok(text)
}
