//! Extraction client: send the composed prompt to a chat model and turn the
//! reply into raw rows.
//!
//! The network side sits behind the [`ModelBackend`] trait:
//!
//! * [`OpenAiChatBackend`]: direct `reqwest` client for the OpenAI
//!   chat-completions API (or any compatible endpoint). It reports the
//!   upstream HTTP status on failure.
//! * [`ProviderBackend`]: adapter over an `edgequake_llm` provider, which
//!   opens up Anthropic, Gemini, Ollama and the other edgequake-llm backends.
//!
//! [`ExtractionClient`] adds the bounded request settings, the timeout, and
//! the parse-or-fallback policy. No retries: a failed call is reported once.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::pipeline::parse::{fallback_row, parse_rows, ParseFailure, RawRow};
use crate::prompts::SYSTEM_PROMPT;
use crate::schema::Schema;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One chat request: a system message, a user message, and the sampling
/// bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// The textual reply of a chat model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// `None` when the provider returned no message content.
    pub content: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

/// A chat-completion endpoint.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Short identifier used in logs, e.g. `"openai:gpt-4o-mini"`.
    fn name(&self) -> String;

    /// Run one completion. Network and HTTP failures are
    /// [`ExtractError::Transport`] or [`ExtractError::Timeout`].
    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ExtractError>;
}

// ── OpenAI backend ───────────────────────────────────────────────────────

/// Client for `POST {base_url}/chat/completions`.
pub struct OpenAiChatBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl fmt::Debug for OpenAiChatBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiChatBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 2],
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl OpenAiChatBackend {
    /// Build the backend. Fails with [`ExtractError::ApiKeyMissing`] when
    /// no key is configured.
    pub fn new(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ExtractError::ApiKeyMissing)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| ExtractError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            timeout_secs: config.api_timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ModelBackend for OpenAiChatBackend {
    fn name(&self) -> String {
        format!("openai:{}", self.model)
    }

    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ExtractError> {
        let body = ChatCompletionBody {
            model: &self.model,
            messages: [
                WireMessage {
                    role: "system",
                    content: &request.system,
                },
                WireMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExtractError::Timeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    ExtractError::Transport {
                        status: e.status().map(|s| s.as_u16()),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ExtractError::Transport {
            status: Some(status.as_u16()),
            message: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(ExtractError::Transport {
                status: Some(status.as_u16()),
                message: truncate(&text, 200),
            });
        }

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&text).map_err(|e| ExtractError::Transport {
                status: Some(status.as_u16()),
                message: format!("malformed response body: {e}"),
            })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content);
        let (input_tokens, output_tokens) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(Completion {
            content,
            input_tokens,
            output_tokens,
        })
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}\u{2026}")
    }
}

// ── edgequake-llm adapter ────────────────────────────────────────────────

/// Any `edgequake_llm` provider as a [`ModelBackend`].
///
/// Provider errors carry no HTTP status, so they surface as
/// [`ExtractError::Transport`] with `status: None`.
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }

    /// Create a provider by name through [`ProviderFactory`]. The provider
    /// reads its own credential (`ANTHROPIC_API_KEY`, …) when created.
    pub fn from_name(provider_name: &str, model: &str) -> Result<Self, ExtractError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            ExtractError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, format!("{provider_name}:{model}")))
    }
}

#[async_trait]
impl ModelBackend for ProviderBackend {
    fn name(&self) -> String {
        self.label.clone()
    }

    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ExtractError> {
        let messages = vec![
            ChatMessage::system(request.system.as_str()),
            ChatMessage::user(request.prompt.as_str()),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ExtractError::Transport {
                status: None,
                message: format!("{e}"),
            })?;

        Ok(Completion {
            content: Some(response.content),
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}

/// Pick a backend, from most-specific to least-specific:
///
/// 1. a pre-built backend in the config,
/// 2. a named edgequake-llm provider,
/// 3. the OpenAI backend with the configured API key.
///
/// With none of these available the result is
/// [`ExtractError::ApiKeyMissing`].
pub fn resolve_backend(config: &ExtractionConfig) -> Result<Arc<dyn ModelBackend>, ExtractError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }
    if let Some(ref name) = config.provider_name {
        return Ok(Arc::new(ProviderBackend::from_name(name, &config.model)?));
    }
    Ok(Arc::new(OpenAiChatBackend::new(config)?))
}

// ── Extraction client ────────────────────────────────────────────────────

/// Rows obtained from one model call.
#[derive(Debug, Clone)]
pub struct RawRows {
    pub rows: Vec<RawRow>,
    /// Set when the reply was unusable and `rows` is the fallback row.
    pub fallback: Option<ParseFailure>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl RawRows {
    pub fn is_degraded(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Bounded model calls plus the parse-or-fallback policy.
#[derive(Clone)]
pub struct ExtractionClient {
    backend: Arc<dyn ModelBackend>,
    system_prompt: String,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
    strip_code_fences: bool,
}

impl fmt::Debug for ExtractionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionClient")
            .field("backend", &self.backend.name())
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ExtractionClient {
    /// Client over an explicit backend; request bounds come from `config`.
    pub fn new(backend: Arc<dyn ModelBackend>, config: &ExtractionConfig) -> Self {
        Self {
            backend,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| SYSTEM_PROMPT.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.api_timeout_secs),
            strip_code_fences: config.strip_code_fences,
        }
    }

    /// Client over the backend [`resolve_backend`] picks for `config`.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let backend = resolve_backend(config)?;
        Ok(Self::new(backend, config))
    }

    pub fn backend_name(&self) -> String {
        self.backend.name()
    }

    fn request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            system: self.system_prompt.clone(),
            prompt: prompt.to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Call the model once and return its rows.
    ///
    /// Transport failures and timeouts are errors. A reply that is not a
    /// JSON array of objects yields the schema's fallback row instead.
    pub async fn extract_rows(&self, schema: &Schema, prompt: &str) -> Result<RawRows, ExtractError> {
        let request = self.request(prompt);
        let start = Instant::now();

        let completion = tokio::time::timeout(self.timeout, self.backend.complete(&request))
            .await
            .map_err(|_| ExtractError::Timeout {
                secs: self.timeout.as_secs(),
            })??;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.backend.name(),
            completion.input_tokens,
            completion.output_tokens,
            start.elapsed()
        );

        let (rows, fallback) =
            match parse_rows(completion.content.as_deref(), self.strip_code_fences) {
                Ok(rows) => (rows, None),
                Err(failure) => {
                    warn!(
                        "Model reply unusable ({}); returning placeholder row",
                        failure
                    );
                    (vec![fallback_row(schema)], Some(failure))
                }
            };

        Ok(RawRows {
            rows,
            fallback,
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
        })
    }
}
