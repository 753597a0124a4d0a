//! HTTP surface: `POST /extract`.
//!
//! Request body:
//!
//! ```json
//! { "pdfBase64": "<base64 or data: URL>",
//!   "schema": [ { "id": "field_1", "name": "Company", "type": "text",
//!                 "description": "Vendor name" } ] }
//! ```
//!
//! | outcome            | status | body |
//! |--------------------|--------|------|
//! | rows extracted     | 200 | `{"success": true, "data": [...], "degraded": false}` |
//! | payload or schema missing | 400 | `{"error": "Missing PDF data or schema", "code": "validation_error"}` |
//! | other bad request  | 400 | `{"error": "<reason>", "code": "validation_error"}` |
//! | anything else      | 500 | `{"error": "Failed to process PDF", "code": "<kind>"}` |
//!
//! Every response carries permissive CORS headers; `OPTIONS /extract`
//! answers `200 ok`.

use crate::error::ExtractError;
use crate::extract::Extractor;
use crate::output::ExtractedRow;
use crate::schema::{Schema, SchemaField};
use actix_web::{
    get,
    http::StatusCode,
    middleware::{DefaultHeaders, Logger},
    post, route, web, App, HttpResponse, HttpServer, Responder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Default request body limit: base64 PDFs are large.
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

/// Shared state: one extractor for all requests.
pub struct ServerState {
    extractor: Arc<Extractor>,
}

impl ServerState {
    pub fn new(extractor: Arc<Extractor>) -> Self {
        Self { extractor }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractRequest {
    #[serde(default)]
    pdf_base64: Option<String>,
    #[serde(default)]
    schema: Option<Vec<SchemaField>>,
}

#[derive(Serialize)]
struct ExtractResponse<'a> {
    success: bool,
    data: &'a [ExtractedRow],
    degraded: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    configured: bool,
}

/// Parse the raw body. Absent or empty members are reported as
/// [`ExtractError::MissingInput`]; malformed JSON as
/// [`ExtractError::InvalidRequest`].
fn parse_request(body: &[u8]) -> Result<(String, Schema), ExtractError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ExtractError::MissingInput);
    }
    let req: ExtractRequest = serde_json::from_slice(body)
        .map_err(|e| ExtractError::InvalidRequest(format!("invalid request body: {e}")))?;

    match (req.pdf_base64, req.schema) {
        (Some(pdf), Some(fields)) if !pdf.trim().is_empty() && !fields.is_empty() => {
            Ok((pdf, Schema::new(fields)))
        }
        _ => Err(ExtractError::MissingInput),
    }
}

fn error_response(e: &ExtractError) -> HttpResponse {
    let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!("Extraction request failed: {}", e);
    } else {
        warn!("Rejected extraction request: {}", e);
    }
    HttpResponse::build(status).json(ErrorResponse {
        error: e.public_message(),
        code: e.kind().code(),
    })
}

#[post("/extract")]
async fn extract(data: web::Data<ServerState>, body: web::Bytes) -> impl Responder {
    let (pdf_base64, schema) = match parse_request(&body) {
        Ok(parsed) => parsed,
        Err(e) => return error_response(&e),
    };
    info!(
        "Extraction request: {} fields, {} payload bytes",
        schema.len(),
        pdf_base64.len()
    );

    match data.extractor.extract_base64(&pdf_base64, &schema).await {
        Ok(output) => HttpResponse::Ok().json(ExtractResponse {
            success: true,
            data: &output.rows,
            degraded: output.degraded,
        }),
        Err(e) => error_response(&e),
    }
}

#[route("/extract", method = "OPTIONS")]
async fn preflight() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain").body("ok")
}

#[get("/health")]
async fn health(data: web::Data<ServerState>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        configured: data.extractor.is_configured(),
    })
}

/// CORS headers added to every response.
pub fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", ALLOW_ORIGIN))
        .add(("Access-Control-Allow-Headers", ALLOW_HEADERS))
}

/// Register the routes. State must be provided as `web::Data<ServerState>`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(extract).service(preflight).service(health);
}

/// Bind and run the server until it is stopped.
pub async fn run_server(
    host: &str,
    port: u16,
    extractor: Arc<Extractor>,
    max_body_bytes: usize,
) -> std::io::Result<()> {
    if let Some(e) = extractor.configuration_error() {
        warn!("Extractor not configured, every request will fail: {}", e);
    }
    let state = web::Data::new(ServerState::new(extractor));

    let server = HttpServer::new(move || {
        App::new()
            .wrap(cors_headers())
            .wrap(Logger::default())
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(max_body_bytes))
            .configure(configure)
    })
    .bind((host, port))?;

    for addr in server.addrs() {
        info!("Listening on http://{}", addr);
    }
    server.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_missing_members() {
        for body in [
            "",
            "{}",
            r#"{"pdfBase64": "JVBERi0="}"#,
            r#"{"schema": [{"name": "A"}]}"#,
            r#"{"pdfBase64": "", "schema": [{"name": "A"}]}"#,
            r#"{"pdfBase64": "JVBERi0=", "schema": []}"#,
            r#"{"pdfBase64": null, "schema": null}"#,
        ] {
            let err = parse_request(body.as_bytes()).unwrap_err();
            assert!(matches!(err, ExtractError::MissingInput), "body: {body}");
        }
    }

    #[test]
    fn parse_rejects_malformed_json() {
        let err = parse_request(b"{not json").unwrap_err();
        assert!(matches!(err, ExtractError::InvalidRequest(_)));
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn parse_assigns_ids() {
        let (pdf, schema) =
            parse_request(br#"{"pdfBase64": "JVBERi0=", "schema": [{"name": "A", "type": "number"}]}"#)
                .unwrap();
        assert_eq!(pdf, "JVBERi0=");
        assert_eq!(schema.fields()[0].id, "field_1");
    }
}
