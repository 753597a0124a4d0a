//! Pipeline stages for PDF-to-CSV extraction.
//!
//! Each submodule implements one transformation step and is testable on
//! its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ text ──▶ llm ──▶ parse ──▶ normalize
//! (bytes)   (lopdf)  (chat)  (JSON)    (confidence)
//! ```
//!
//! 1. [`input`]: decode base64 payloads, load local files or URLs, check
//!    the `%PDF` magic
//! 2. [`text`]: turn PDF bytes into plain text; runs in `spawn_blocking`
//!    because lopdf parsing is CPU-bound
//! 3. [`llm`]: one chat-completion call per run; the only stage with
//!    network I/O
//! 4. [`parse`]: read the reply as a JSON array of row objects, or
//!    produce the placeholder row
//! 5. [`normalize`]: guarantee a confidence on every row

pub mod input;
pub mod llm;
pub mod normalize;
pub mod parse;
pub mod text;
