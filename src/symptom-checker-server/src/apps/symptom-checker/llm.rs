// Copyright (c), Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

// LLM invocation: one provider backend plus an ordered walk over candidate models.

use crate::config::{AppConfig, Provider};
use crate::CheckerError;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

const TEMPERATURE: f64 = 0.3;
const MAX_OUTPUT_TOKENS: u32 = 2000;
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_ERROR_CHARS: usize = 500;

lazy_static::lazy_static! {
    /// Last-resort match for providers that report a missing model only in prose.
    static ref UNSUPPORTED_MODEL: Regex =
        Regex::new(r"(?i)not\s+found|not\s+supported|ListModels").expect("valid regex");
}

// ============================================
// Provider Backend
// ============================================

/// Failure of a single model attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// The model does not exist or cannot serve this call; the next candidate may.
    #[error("model {model} unavailable: {message}")]
    ModelUnavailable { model: String, message: String },
    /// Anything else. No further candidates are tried.
    #[error("{0}")]
    Provider(String),
}

/// A text-generation backend addressed by model name.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    fn provider(&self) -> Provider;

    /// Generate text for `prompt` with `model`. Empty text is a valid answer.
    async fn generate(&self, api_key: &str, model: &str, prompt: &str)
        -> Result<String, ModelError>;
}

/// HTTP backend speaking the Gemini, OpenAI or Anthropic wire format.
pub struct HttpModelClient {
    client: reqwest::Client,
    provider: Provider,
    base_url: String,
}

impl HttpModelClient {
    pub fn new(
        provider: Provider,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CheckerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CheckerError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            provider,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, CheckerError> {
        Self::new(config.provider, config.base_url.clone(), config.request_timeout)
    }

    fn build_request(&self, api_key: &str, model: &str, prompt: &str) -> reqwest::RequestBuilder {
        match self.provider {
            Provider::Google => self
                .client
                .post(format!(
                    "{}/v1beta/models/{}:generateContent",
                    self.base_url, model
                ))
                .header("x-goog-api-key", api_key)
                .json(&json!({
                    "contents": [
                        { "role": "user", "parts": [ { "text": prompt } ] }
                    ],
                    "generationConfig": {
                        "temperature": TEMPERATURE,
                        "maxOutputTokens": MAX_OUTPUT_TOKENS
                    }
                })),
            Provider::OpenAi => self
                .client
                .post(format!("{}/v1/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {api_key}"))
                .json(&json!({
                    "model": model,
                    "messages": [
                        { "role": "user", "content": prompt }
                    ],
                    "max_tokens": MAX_OUTPUT_TOKENS,
                    "temperature": TEMPERATURE
                })),
            Provider::Anthropic => self
                .client
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&json!({
                    "model": model,
                    "max_tokens": MAX_OUTPUT_TOKENS,
                    "temperature": TEMPERATURE,
                    "messages": [
                        { "role": "user", "content": prompt }
                    ]
                })),
        }
    }
}

#[async_trait]
impl GenerativeModel for HttpModelClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn generate(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str,
    ) -> Result<String, ModelError> {
        let response = self
            .build_request(api_key, model, prompt)
            .send()
            .await
            .map_err(|e| ModelError::Provider(format!("{} request failed: {e}", self.provider)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ModelError::Provider(format!("Failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(classify_failure(self.provider, status.as_u16(), &body, model));
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| ModelError::Provider(format!("Failed to parse provider envelope: {e}")))?;
        Ok(extract_text(self.provider, &value))
    }
}

/// Pull the generated text out of a provider's response envelope. Missing text reads as empty.
pub fn extract_text(provider: Provider, envelope: &Value) -> String {
    let joined = |parts: Option<&Vec<Value>>| {
        parts
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    };

    match provider {
        Provider::Google => joined(
            envelope["candidates"]
                .get(0)
                .and_then(|c| c.get("content"))
                .and_then(|c| c.get("parts"))
                .and_then(Value::as_array),
        ),
        Provider::OpenAi => envelope["choices"]
            .get(0)
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Provider::Anthropic => joined(envelope["content"].as_array()),
    }
}

/// Decide whether a failed call means "try the next model" or "give up".
///
/// Structured signals come first: HTTP 404 and each provider's not-found error code. Matching
/// on the message text is only used for 400 responses.
pub fn classify_failure(provider: Provider, status: u16, body: &str, model: &str) -> ModelError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));
    let field = |name: &str| error.and_then(|e| e.get(name)).and_then(Value::as_str);

    let message: String = field("message")
        .unwrap_or(body.trim())
        .chars()
        .take(MAX_ERROR_CHARS)
        .collect();

    let structured_not_found = status == 404
        || field("status") == Some("NOT_FOUND")
        || field("code") == Some("model_not_found")
        || field("type") == Some("not_found_error");
    let textual_not_found = status == 400 && UNSUPPORTED_MODEL.is_match(&message);

    if structured_not_found || textual_not_found {
        ModelError::ModelUnavailable {
            model: model.to_string(),
            message,
        }
    } else {
        ModelError::Provider(format!("{provider} returned HTTP {status}: {message}"))
    }
}

// ============================================
// Model Invoker
// ============================================

/// Tries candidate models in order until one answers with non-empty text.
pub struct ModelInvoker<'a> {
    backend: &'a dyn GenerativeModel,
    candidates: &'a [String],
}

impl<'a> ModelInvoker<'a> {
    pub fn new(backend: &'a dyn GenerativeModel, candidates: &'a [String]) -> Self {
        Self {
            backend,
            candidates,
        }
    }

    pub async fn invoke(&self, api_key: Option<&str>, prompt: &str) -> Result<String, CheckerError> {
        let provider = self.backend.provider();
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                CheckerError::Configuration(format!(
                    "Missing {} for the {provider} provider",
                    provider.key_var()
                ))
            })?;

        let mut saw_empty = false;
        let mut last_unavailable: Option<ModelError> = None;

        for model in self.candidates {
            match self.backend.generate(api_key, model, prompt).await {
                Ok(text) if !text.trim().is_empty() => {
                    info!("Model {} answered ({} chars)", model, text.len());
                    return Ok(text);
                }
                Ok(_) => {
                    warn!("Model {} returned empty text, trying next candidate", model);
                    saw_empty = true;
                }
                Err(err @ ModelError::ModelUnavailable { .. }) => {
                    warn!("{}, trying next candidate", err);
                    last_unavailable = Some(err);
                }
                Err(ModelError::Provider(message)) => {
                    return Err(CheckerError::Upstream(message));
                }
            }
        }

        match (saw_empty, last_unavailable) {
            (true, _) => Err(CheckerError::UpstreamEmptyResponse),
            (false, Some(err)) => Err(CheckerError::Upstream(err.to_string())),
            (false, None) => Err(CheckerError::Configuration(
                "No candidate models configured".to_string(),
            )),
        }
    }
}
