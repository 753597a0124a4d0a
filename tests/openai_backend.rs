//! `OpenAiChatBackend` against a local stub of the chat-completions API.

mod common;

use actix_web::{dev::ServerHandle, web, App, HttpRequest, HttpResponse, HttpServer};
use common::{init_tracing, invoice_schema};
use edgequake_pdf2csv::prompts::SYSTEM_PROMPT;
use edgequake_pdf2csv::{
    ChatRequest, ExtractError, ExtractionConfig, Extractor, ModelBackend, OpenAiChatBackend,
    PlaceholderTextExtractor,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Seen = web::Data<Mutex<Vec<(Option<String>, Value)>>>;

async fn ok(req: HttpRequest, body: web::Json<Value>, seen: Seen) -> HttpResponse {
    let auth = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    seen.lock().unwrap().push((auth, body.into_inner()));
    HttpResponse::Ok().json(json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": "[{\"Company\": \"Acme\", \"Total\": 10, \"Date\": \"2024-01-31\", \"confidence\": 0.8}]"
            }
        }],
        "usage": {"prompt_tokens": 321, "completion_tokens": 45, "total_tokens": 366}
    }))
}

async fn empty() -> HttpResponse {
    HttpResponse::Ok().json(json!({"choices": [{"message": {"role": "assistant", "content": null}}]}))
}

async fn denied() -> HttpResponse {
    HttpResponse::Unauthorized().json(json!({"error": {"message": "Incorrect API key provided"}}))
}

async fn garbage() -> HttpResponse {
    HttpResponse::Ok().content_type("text/html").body("<html>gateway</html>")
}

async fn slow() -> HttpResponse {
    tokio::time::sleep(Duration::from_secs(5)).await;
    HttpResponse::Ok().json(json!({"choices": []}))
}

/// Start the stub on an ephemeral port.
fn start_stub(seen: Seen) -> (SocketAddr, ServerHandle) {
    init_tracing();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(seen.clone())
            .route("/ok/chat/completions", web::post().to(ok))
            .route("/empty/chat/completions", web::post().to(empty))
            .route("/denied/chat/completions", web::post().to(denied))
            .route("/garbage/chat/completions", web::post().to(garbage))
            .route("/slow/chat/completions", web::post().to(slow))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();
    let addr = server.addrs()[0];
    let running = server.run();
    let handle = running.handle();
    actix_web::rt::spawn(running);
    (addr, handle)
}

fn config(addr: SocketAddr, prefix: &str) -> ExtractionConfig {
    ExtractionConfig::builder()
        .api_key("test-key")
        .base_url(format!("http://{addr}/{prefix}/"))
        .api_timeout_secs(1)
        .build()
        .unwrap()
}

fn request() -> ChatRequest {
    ChatRequest {
        system: SYSTEM_PROMPT.to_string(),
        prompt: "Extract".to_string(),
        temperature: 0.1,
        max_tokens: 2000,
    }
}

#[actix_web::test]
async fn pipeline_over_http_stub() {
    let seen: Seen = web::Data::new(Mutex::new(Vec::new()));
    let (addr, handle) = start_stub(seen.clone());

    let extractor = Extractor::builder()
        .config(config(addr, "ok"))
        .text_extractor(Arc::new(PlaceholderTextExtractor))
        .build()
        .unwrap();
    assert_eq!(extractor.backend_name().as_deref(), Some("openai:gpt-4o-mini"));

    let output = extractor.extract(b"%PDF-1.4", &invoice_schema()).await.unwrap();
    assert!(!output.degraded);
    assert_eq!(output.rows.len(), 1);
    assert_eq!(output.rows[0].values["Company"], json!("Acme"));
    assert_eq!(output.rows[0].confidence, 0.8);
    assert_eq!(output.stats.input_tokens, 321);
    assert_eq!(output.stats.output_tokens, 45);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (auth, body) = &seen[0];
    assert_eq!(auth.as_deref(), Some("Bearer test-key"));
    assert_eq!(body["model"], json!("gpt-4o-mini"));
    assert_eq!(body["max_tokens"], json!(2000));
    assert!((body["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    assert_eq!(body["messages"][0]["role"], json!("system"));
    assert_eq!(body["messages"][0]["content"], json!(SYSTEM_PROMPT));
    assert_eq!(body["messages"][1]["role"], json!("user"));
    assert!(body["messages"][1]["content"]
        .as_str()
        .unwrap()
        .contains("Company (text): Vendor name"));

    handle.stop(false).await;
}

#[actix_web::test]
async fn non_success_status_is_transport_error() {
    let (addr, handle) = start_stub(web::Data::new(Mutex::new(Vec::new())));
    let backend = OpenAiChatBackend::new(&config(addr, "denied")).unwrap();

    let err = backend.complete(&request()).await.unwrap_err();
    assert_eq!(err.upstream_status(), Some(401));
    assert!(err.to_string().contains("Incorrect API key"), "got: {err}");

    handle.stop(false).await;
}

#[actix_web::test]
async fn undecodable_body_is_transport_error() {
    let (addr, handle) = start_stub(web::Data::new(Mutex::new(Vec::new())));
    let backend = OpenAiChatBackend::new(&config(addr, "garbage")).unwrap();

    let err = backend.complete(&request()).await.unwrap_err();
    assert!(matches!(err, ExtractError::Transport { status: Some(200), .. }));

    handle.stop(false).await;
}

#[actix_web::test]
async fn null_content_degrades() {
    let (addr, handle) = start_stub(web::Data::new(Mutex::new(Vec::new())));
    let extractor = Extractor::builder()
        .config(config(addr, "empty"))
        .text_extractor(Arc::new(PlaceholderTextExtractor))
        .build()
        .unwrap();

    let output = extractor.extract(b"%PDF", &invoice_schema()).await.unwrap();
    assert!(output.degraded);
    assert_eq!(output.rows[0].values["Company"], json!("Sample Company"));

    handle.stop(false).await;
}

#[actix_web::test]
async fn slow_endpoint_times_out() {
    let (addr, handle) = start_stub(web::Data::new(Mutex::new(Vec::new())));
    let backend = OpenAiChatBackend::new(&config(addr, "slow")).unwrap();

    let err = backend.complete(&request()).await.unwrap_err();
    assert!(matches!(err, ExtractError::Timeout { secs: 1 }), "got: {err}");

    handle.stop(false).await;
}

#[test]
fn missing_key_is_rejected_up_front() {
    let config = ExtractionConfig::from_lookup(|_| None);
    assert!(matches!(
        OpenAiChatBackend::new(&config),
        Err(ExtractError::ApiKeyMissing)
    ));
}
