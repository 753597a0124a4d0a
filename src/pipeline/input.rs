//! Input resolution: turn a request payload, a local path or a URL into
//! raw PDF bytes.
//!
//! The HTTP surface receives PDFs as base64 strings; the CLI receives a path
//! or an HTTP(S) URL. Both end up as an owned `Vec<u8>` handed to the
//! [`crate::pipeline::text::TextExtractor`].

use crate::error::ExtractError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::PathBuf;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Decode a base64 PDF payload.
///
/// Accepts bare base64 as well as a `data:application/pdf;base64,...` URL,
/// which is what browsers produce from `FileReader.readAsDataURL`. ASCII
/// whitespace (line-wrapped base64) is ignored.
pub fn decode_pdf_base64(payload: &str) -> Result<Vec<u8>, ExtractError> {
    let body = match payload.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => payload,
    };
    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ExtractError::TextExtraction {
            detail: format!("PDF payload is not valid base64: {e}"),
        })?;
    debug!("Decoded PDF payload → {} bytes", bytes.len());
    Ok(bytes)
}

/// Load PDF bytes from a local path or an HTTP(S) URL.
///
/// The `%PDF` magic is checked so callers get a meaningful error instead of
/// an opaque parser failure later on.
pub async fn load_pdf(input: &str, timeout_secs: u64) -> Result<Vec<u8>, ExtractError> {
    let bytes = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };
    check_magic(input, &bytes)?;
    Ok(bytes)
}

/// Reject byte buffers that do not start with `%PDF`, empty and truncated
/// files included. Missing magic bytes are reported as zeros.
pub fn check_magic(source_name: &str, bytes: &[u8]) -> Result<(), ExtractError> {
    if !bytes.starts_with(b"%PDF") {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(ExtractError::NotAPdf {
            source_name: source_name.to_string(),
            magic,
        });
    }
    Ok(())
}

async fn read_local(path_str: &str) -> Result<Vec<u8>, ExtractError> {
    let path = PathBuf::from(path_str);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(ExtractError::PermissionDenied { path })
        }
        Err(_) => Err(ExtractError::FileNotFound { path }),
    }
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, ExtractError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}
