//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use edgequake_pdf2csv::{
    ChatRequest, Completion, ExtractError, FieldType, ModelBackend, Schema, SchemaField,
};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route crate logs to the test harness. Filter with `RUST_LOG`; warnings
/// show by default.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Model stub returning a fixed reply and recording every request.
pub struct StubBackend {
    reply: Result<Option<String>, u16>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl StubBackend {
    pub fn replying(reply: &str) -> Self {
        Self::with(Ok(Some(reply.to_string())))
    }

    /// Reply with no message content.
    pub fn empty() -> Self {
        Self::with(Ok(None))
    }

    /// Fail every call with an upstream HTTP status.
    pub fn failing(status: u16) -> Self {
        Self::with(Err(status))
    }

    fn with(reply: Result<Option<String>, u16>) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ModelBackend for StubBackend {
    fn name(&self) -> String {
        "stub".to_string()
    }

    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        match &self.reply {
            Ok(content) => Ok(Completion {
                content: content.clone(),
                input_tokens: 120,
                output_tokens: 40,
            }),
            Err(status) => Err(ExtractError::Transport {
                status: Some(*status),
                message: "stubbed upstream failure".to_string(),
            }),
        }
    }
}

/// Three-column invoice schema.
pub fn invoice_schema() -> Schema {
    Schema::new(vec![
        SchemaField::new("Company", FieldType::Text, "Vendor name"),
        SchemaField::new("Total", FieldType::Number, "Invoice total"),
        SchemaField::new("Date", FieldType::Date, "Issue date"),
    ])
}

/// Single-page PDF showing each line of `lines`.
pub fn text_pdf(lines: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 12.into()]),
        Operation::new("TL", vec![14.into()]),
        Operation::new("Td", vec![72.into(), 760.into()]),
    ];
    for line in lines {
        operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}
