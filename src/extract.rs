//! Pipeline entry points.
//!
//! An [`Extractor`] is built once (at process start for the HTTP server)
//! and reused for every request. Each run is independent: no state is
//! shared between calls apart from the immutable configuration.
//!
//! ```text
//! validate ──▶ text ──▶ prompt ──▶ model ──▶ normalize
//! (schema,     (bytes    (pure)     (one      (confidence
//!  payload,     → text)              call)     default)
//!  credential)
//! ```

use crate::config::ExtractionConfig;
use crate::csv::to_csv_string;
use crate::error::{ErrorKind, ExtractError};
use crate::output::{ExtractionOutput, ExtractionStats};
use crate::pipeline::llm::{resolve_backend, ExtractionClient, ModelBackend};
use crate::pipeline::text::{LopdfTextExtractor, TextExtractor};
use crate::pipeline::{input, normalize};
use crate::progress::{ProgressCallback, StageTracker};
use crate::prompts::compose_prompt;
use crate::schema::Schema;
use std::borrow::Cow;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where the PDF bytes of one run come from.
enum PdfSource<'a> {
    Bytes(&'a [u8]),
    Base64(&'a str),
}

impl PdfSource<'_> {
    fn is_empty(&self) -> bool {
        match self {
            PdfSource::Bytes(b) => b.is_empty(),
            PdfSource::Base64(s) => s.trim().is_empty(),
        }
    }
}

/// Model side of the extractor: a ready client, or the configuration error
/// that prevented building one.
enum ClientSlot {
    Ready(ExtractionClient),
    Unconfigured(ExtractError),
}

/// Runs the extraction pipeline.
pub struct Extractor {
    text_extractor: Arc<dyn TextExtractor>,
    client: ClientSlot,
    progress: Option<ProgressCallback>,
}

/// Builder for [`Extractor`].
pub struct ExtractorBuilder {
    config: ExtractionConfig,
    text_extractor: Option<Arc<dyn TextExtractor>>,
    progress: Option<ProgressCallback>,
}

impl ExtractorBuilder {
    pub fn config(mut self, config: ExtractionConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default [`LopdfTextExtractor`].
    pub fn text_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.text_extractor = Some(extractor);
        self
    }

    /// Use an explicit model backend instead of resolving one from config.
    pub fn backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.progress = Some(cb);
        self
    }

    /// Resolve the model backend and assemble the extractor.
    ///
    /// A missing credential does not fail the build; every run then fails
    /// with that configuration error before touching the network. Use
    /// [`Extractor::configuration_error`] for start-up diagnostics.
    pub fn build(self) -> Result<Extractor, ExtractError> {
        let client = match resolve_backend(&self.config) {
            Ok(backend) => ClientSlot::Ready(ExtractionClient::new(backend, &self.config)),
            Err(e) if e.kind() == ErrorKind::Configuration => ClientSlot::Unconfigured(e),
            Err(e) => return Err(e),
        };
        Ok(Extractor {
            text_extractor: self
                .text_extractor
                .unwrap_or_else(|| Arc::new(LopdfTextExtractor)),
            client,
            progress: self.progress,
        })
    }
}

impl Extractor {
    pub fn builder() -> ExtractorBuilder {
        ExtractorBuilder {
            config: ExtractionConfig::default(),
            text_extractor: None,
            progress: None,
        }
    }

    /// Extractor with the default text extractor and the backend resolved
    /// from `config`.
    pub fn from_config(config: ExtractionConfig) -> Result<Self, ExtractError> {
        Self::builder().config(config).build()
    }

    /// True when a model backend is available.
    pub fn is_configured(&self) -> bool {
        matches!(self.client, ClientSlot::Ready(_))
    }

    /// The configuration problem every run will report, if any.
    pub fn configuration_error(&self) -> Option<&ExtractError> {
        match &self.client {
            ClientSlot::Ready(_) => None,
            ClientSlot::Unconfigured(e) => Some(e),
        }
    }

    /// Backend identifier for logs, e.g. `"openai:gpt-4o-mini"`.
    pub fn backend_name(&self) -> Option<String> {
        match &self.client {
            ClientSlot::Ready(c) => Some(c.backend_name()),
            ClientSlot::Unconfigured(_) => None,
        }
    }

    pub fn text_extractor_name(&self) -> &'static str {
        self.text_extractor.name()
    }

    /// Extract rows from raw PDF bytes.
    ///
    /// # Errors
    /// - [`ExtractError::MissingInput`] / [`ExtractError::InvalidSchema`]
    ///   for an empty payload or an unusable schema (no network call)
    /// - a configuration error when no backend is available (no network call)
    /// - [`ExtractError::TextExtraction`] when the PDF cannot be read
    /// - [`ExtractError::Transport`] / [`ExtractError::Timeout`] when the
    ///   model call fails
    ///
    /// An unparseable model reply is not an error: the output then holds
    /// one placeholder row and `degraded` is set.
    pub async fn extract(
        &self,
        pdf: &[u8],
        schema: &Schema,
    ) -> Result<ExtractionOutput, ExtractError> {
        self.run(PdfSource::Bytes(pdf), schema).await
    }

    /// Extract rows from a base64 (or `data:` URL) PDF payload.
    pub async fn extract_base64(
        &self,
        pdf_base64: &str,
        schema: &Schema,
    ) -> Result<ExtractionOutput, ExtractError> {
        self.run(PdfSource::Base64(pdf_base64), schema).await
    }

    /// [`extract`](Self::extract), abandoned as soon as `cancel` resolves.
    ///
    /// Cancelling drops the in-flight model call. The caller gets either a
    /// complete output or [`ExtractError::Cancelled`], never partial rows.
    pub async fn extract_cancellable<F>(
        &self,
        pdf: &[u8],
        schema: &Schema,
        cancel: F,
    ) -> Result<ExtractionOutput, ExtractError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                info!("Extraction cancelled by caller");
                Err(ExtractError::Cancelled)
            }
            result = self.extract(pdf, schema) => result,
        }
    }

    /// Load a PDF from a local path or HTTP(S) URL, then extract.
    pub async fn extract_file(
        &self,
        input_str: impl AsRef<str>,
        schema: &Schema,
        download_timeout_secs: u64,
    ) -> Result<ExtractionOutput, ExtractError> {
        // Validate before any download.
        schema.validate()?;
        let bytes = input::load_pdf(input_str.as_ref(), download_timeout_secs).await?;
        self.extract(&bytes, schema).await
    }

    /// Extract and write the rows as CSV to `output_path`.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    pub async fn extract_to_csv_file(
        &self,
        input_str: impl AsRef<str>,
        schema: &Schema,
        output_path: impl AsRef<Path>,
        download_timeout_secs: u64,
    ) -> Result<ExtractionOutput, ExtractError> {
        let output = self
            .extract_file(input_str, schema, download_timeout_secs)
            .await?;
        let csv = to_csv_string(schema, &output.rows)?;
        let path = output_path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ExtractError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
        }

        let tmp_path = path.with_extension("csv.tmp");
        let written = match tokio::fs::write(&tmp_path, csv.as_bytes()).await {
            Ok(()) => tokio::fs::rename(&tmp_path, path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
                debug!("Could not remove {}: {}", tmp_path.display(), cleanup);
            }
            return Err(ExtractError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            });
        }

        Ok(output)
    }

    /// Synchronous wrapper around [`extract`](Self::extract).
    ///
    /// Creates a temporary tokio runtime internally; do not call from
    /// inside an async context.
    pub fn extract_sync(
        &self,
        pdf: &[u8],
        schema: &Schema,
    ) -> Result<ExtractionOutput, ExtractError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.extract(pdf, schema))
    }

    async fn run(
        &self,
        source: PdfSource<'_>,
        schema: &Schema,
    ) -> Result<ExtractionOutput, ExtractError> {
        let total_start = Instant::now();
        let mut tracker = StageTracker::start(self.progress.as_ref());

        let result = self.run_stages(source, schema, &mut tracker, total_start).await;
        match &result {
            Ok(output) => {
                info!(
                    "Extraction complete: {} rows{} in {}ms",
                    output.rows.len(),
                    if output.degraded { " (placeholder)" } else { "" },
                    output.stats.total_duration_ms
                );
                tracker.succeed(output.rows.len(), output.degraded);
            }
            Err(e) => {
                warn!("Extraction failed at stage {}: {}", tracker.stage(), e);
                tracker.fail(e);
            }
        }
        result
    }

    async fn run_stages(
        &self,
        source: PdfSource<'_>,
        schema: &Schema,
        tracker: &mut StageTracker<'_>,
        total_start: Instant,
    ) -> Result<ExtractionOutput, ExtractError> {
        // ── Pending: validation and configuration ────────────────────────
        if source.is_empty() {
            return Err(ExtractError::MissingInput);
        }
        schema.validate()?;
        let client = match &self.client {
            ClientSlot::Ready(client) => client,
            ClientSlot::Unconfigured(e) => return Err(replay_config_error(e)),
        };
        info!(
            "Starting extraction: {} fields via {}",
            schema.len(),
            client.backend_name()
        );

        // ── TextExtracted: bytes → text ──────────────────────────────────
        tracker.advance();
        let text_start = Instant::now();
        let bytes: Cow<'_, [u8]> = match source {
            PdfSource::Bytes(b) => Cow::Borrowed(b),
            PdfSource::Base64(s) => Cow::Owned(input::decode_pdf_base64(s)?),
        };
        let text = self.text_extractor.extract(&bytes).await?;
        let text_duration_ms = text_start.elapsed().as_millis() as u64;
        debug!(
            "{} extractor produced {} chars in {}ms",
            self.text_extractor.name(),
            text.chars().count(),
            text_duration_ms
        );

        // ── ModelInvoked: prompt → model → raw rows ──────────────────────
        tracker.advance();
        let prompt = compose_prompt(schema, &text);
        let llm_start = Instant::now();
        let raw = client.extract_rows(schema, &prompt).await?;
        let llm_duration_ms = llm_start.elapsed().as_millis() as u64;
        if let Some(ref failure) = raw.fallback {
            tracker.fallback(&failure.to_string());
        }

        // ── Normalized ───────────────────────────────────────────────────
        tracker.advance();
        let degraded = raw.is_degraded();
        let rows = normalize::normalize_rows(raw.rows);

        Ok(ExtractionOutput {
            rows,
            degraded,
            stats: ExtractionStats {
                text_chars: text.chars().count(),
                prompt_chars: prompt.chars().count(),
                input_tokens: raw.input_tokens,
                output_tokens: raw.output_tokens,
                text_duration_ms,
                llm_duration_ms,
                total_duration_ms: total_start.elapsed().as_millis() as u64,
            },
        })
    }
}

/// Re-create the stored configuration error for one run.
fn replay_config_error(e: &ExtractError) -> ExtractError {
    match e {
        ExtractError::ProviderNotConfigured { provider, hint } => {
            ExtractError::ProviderNotConfigured {
                provider: provider.clone(),
                hint: hint.clone(),
            }
        }
        ExtractError::InvalidConfig(msg) => ExtractError::InvalidConfig(msg.clone()),
        _ => ExtractError::ApiKeyMissing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::{ChatRequest, Completion};
    use crate::pipeline::text::PlaceholderTextExtractor;
    use crate::schema::{FieldType, SchemaField};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Counting {
        reply: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelBackend for Counting {
        fn name(&self) -> String {
            "counting".into()
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<Completion, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Completion::text(self.reply))
        }
    }

    fn schema() -> Schema {
        Schema::new(vec![SchemaField::new("Vendor", FieldType::Text, "")])
    }

    fn extractor(reply: &'static str) -> (Extractor, Arc<Counting>) {
        let backend = Arc::new(Counting {
            reply,
            calls: AtomicUsize::new(0),
        });
        let extractor = Extractor::builder()
            .backend(backend.clone())
            .text_extractor(Arc::new(PlaceholderTextExtractor))
            .build()
            .unwrap();
        (extractor, backend)
    }

    #[tokio::test]
    async fn happy_path() {
        let (ex, backend) = extractor(r#"[{"Vendor": "Acme", "confidence": 0.9}]"#);
        let out = ex.extract(b"%PDF-1.4", &schema()).await.unwrap();
        assert!(!out.degraded);
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].confidence, 0.9);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(out.stats.prompt_chars > out.stats.text_chars);
    }

    #[tokio::test]
    async fn empty_payload_never_calls_model() {
        let (ex, backend) = extractor("[]");
        let err = ex.extract(b"", &schema()).await.unwrap_err();
        assert!(matches!(err, ExtractError::MissingInput));
        let err = ex.extract_base64("  ", &schema()).await.unwrap_err();
        assert!(matches!(err, ExtractError::MissingInput));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unconfigured_extractor_reports_each_run() {
        let ex = Extractor::builder()
            .text_extractor(Arc::new(PlaceholderTextExtractor))
            .build()
            .unwrap();
        assert!(!ex.is_configured());
        assert!(ex.backend_name().is_none());
        for _ in 0..2 {
            let err = ex.extract(b"%PDF", &schema()).await.unwrap_err();
            assert!(matches!(err, ExtractError::ApiKeyMissing));
        }
    }

    #[tokio::test]
    async fn cancellation_returns_cancelled() {
        let (ex, _backend) = extractor("[]");
        let err = ex
            .extract_cancellable(b"%PDF", &schema(), std::future::ready(()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Cancelled));
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// Never answers; records when its call starts and when it is dropped.
    #[derive(Default)]
    struct Hanging {
        started: Arc<AtomicBool>,
        dropped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ModelBackend for Hanging {
        fn name(&self) -> String {
            "hanging".into()
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<Completion, ExtractError> {
            let _guard = SetOnDrop(self.dropped.clone());
            self.started.store(true, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn cancellation_drops_in_flight_model_call() {
        let backend = Arc::new(Hanging::default());
        let started = backend.started.clone();
        let dropped = backend.dropped.clone();
        let ex = Extractor::builder()
            .backend(backend)
            .text_extractor(Arc::new(PlaceholderTextExtractor))
            .build()
            .unwrap();

        let t0 = Instant::now();
        let err = ex
            .extract_cancellable(
                b"%PDF",
                &schema(),
                tokio::time::sleep(std::time::Duration::from_millis(100)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::Cancelled));
        assert!(started.load(Ordering::SeqCst), "model call never started");
        assert!(dropped.load(Ordering::SeqCst), "model call still alive");
        assert!(t0.elapsed() < std::time::Duration::from_secs(5));
    }

    #[tokio::test]
    async fn bad_base64_fails_in_text_stage() {
        let (ex, backend) = extractor("[]");
        let err = ex.extract_base64("@@@", &schema()).await.unwrap_err();
        assert!(matches!(err, ExtractError::TextExtraction { .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn sync_wrapper() {
        let (ex, _backend) = extractor("not json");
        let out = ex.extract_sync(b"%PDF", &schema()).unwrap();
        assert!(out.degraded);
        assert_eq!(out.rows[0].values["Vendor"], "Sample Vendor");
    }
}
