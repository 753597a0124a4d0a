//! Error types for the edgequake-pdf2csv library.
//!
//! Every fatal failure of an extraction run is an [`ExtractError`]. The
//! variants group into the five kinds reported by [`ExtractError::kind`]:
//!
//! * **Validation**: the request itself is unusable (no PDF, no schema,
//!   duplicate column names). Maps to HTTP 400.
//! * **Text extraction**: the PDF payload could not be decoded or read.
//! * **Configuration**: no model credential / provider is available.
//! * **Transport**: the model endpoint failed at the network or HTTP layer,
//!   including timeouts.
//! * **Internal**: cancellation, I/O on output files, runtime problems.
//!
//! A model response that is not a JSON array is deliberately **not** an
//! error: the client degrades to a single placeholder row and flags the
//! result as `degraded` (see [`crate::pipeline::parse`]).

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Fixed message returned to HTTP callers when the payload or schema is absent.
pub const MISSING_INPUT_MESSAGE: &str = "Missing PDF data or schema";

/// Fixed message returned to HTTP callers for every non-validation failure.
pub const PROCESSING_FAILED_MESSAGE: &str = "Failed to process PDF";

/// All fatal errors returned by the edgequake-pdf2csv library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// The PDF payload or the schema is absent or empty.
    #[error("Missing PDF data or schema")]
    MissingInput,

    /// The schema is present but unusable.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// The request body could not be decoded.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ── Input errors (CLI loader) ─────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read, but they are not a PDF.
    #[error("Input is not a valid PDF: '{source_name}'\nFirst bytes: {magic:?}")]
    NotAPdf { source_name: String, magic: [u8; 4] },

    // ── Text extraction errors ────────────────────────────────────────────
    /// The PDF payload could not be decoded into text.
    #[error("Failed to extract text from PDF: {detail}")]
    TextExtraction { detail: String },

    // ── Configuration errors ──────────────────────────────────────────────
    /// No credential for the default OpenAI backend.
    #[error("OpenAI API key not configured")]
    ApiKeyMissing,

    /// A named provider could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Transport errors ──────────────────────────────────────────────────
    /// The model endpoint failed. `status` is the upstream HTTP status when
    /// one was received.
    #[error("{}", transport_message(.status, .message))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// The model call exceeded the configured timeout.
    #[error("LLM call timed out after {secs}s")]
    Timeout { secs: u64 },

    // ── Internal errors ───────────────────────────────────────────────────
    /// The caller cancelled the run before it finished.
    #[error("Extraction cancelled")]
    Cancelled,

    /// Could not create or write the output CSV file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn transport_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("LLM API request failed with status {code}: {message}"),
        None => format!("LLM API request failed: {message}"),
    }
}

/// Coarse classification of an [`ExtractError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Extraction,
    Configuration,
    Transport,
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable code, e.g. `"transport_error"`.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Extraction => "extraction_error",
            ErrorKind::Configuration => "configuration_error",
            ErrorKind::Transport => "transport_error",
            ErrorKind::Internal => "internal_error",
        }
    }
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::MissingInput
            | ExtractError::InvalidSchema(_)
            | ExtractError::InvalidRequest(_) => ErrorKind::Validation,
            ExtractError::FileNotFound { .. }
            | ExtractError::PermissionDenied { .. }
            | ExtractError::DownloadFailed { .. }
            | ExtractError::DownloadTimeout { .. }
            | ExtractError::NotAPdf { .. }
            | ExtractError::TextExtraction { .. } => ErrorKind::Extraction,
            ExtractError::ApiKeyMissing
            | ExtractError::ProviderNotConfigured { .. }
            | ExtractError::InvalidConfig(_) => ErrorKind::Configuration,
            ExtractError::Transport { .. } | ExtractError::Timeout { .. } => ErrorKind::Transport,
            ExtractError::Cancelled
            | ExtractError::OutputWriteFailed { .. }
            | ExtractError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status an API surface should answer with.
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            _ => 500,
        }
    }

    /// Short message safe to show to end users.
    ///
    /// Validation messages are returned as-is; everything else collapses to
    /// [`PROCESSING_FAILED_MESSAGE`].
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Validation => self.to_string(),
            _ => PROCESSING_FAILED_MESSAGE.to_string(),
        }
    }

    /// Upstream HTTP status for transport failures.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            ExtractError::Transport { status, .. } => *status,
            _ => None,
        }
    }
}
