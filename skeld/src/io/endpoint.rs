//! Decision endpoint abstraction.
//!
//! The [`DecisionEndpoint`] trait decouples model-backed agents from the
//! transport (an OpenAI-compatible chat-completions API). Tests use scripted
//! endpoints that replay canned replies without touching the network.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::io::config::EndpointConfig;

/// Environment override for the endpoint URL.
pub const BASE_URL_ENV: &str = "OPENAI_API_BASE_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// One failed exchange with the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Request(String),
    #[error("malformed response body: {0}")]
    Malformed(String),
    #[error("response has no choices")]
    NoChoices,
    #[error("response content is empty")]
    EmptyContent,
}

impl TransportError {
    /// Authorization and not-found failures never succeed on retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Status { status, .. } if matches!(status, 401 | 403 | 404))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Abstraction over decision endpoints.
pub trait DecisionEndpoint: Send + Sync {
    /// Send one conversation and return the reply text.
    fn complete<'a>(
        &'a self,
        model: &'a str,
        messages: &'a [ChatMessage],
    ) -> BoxFuture<'a, Result<String, TransportError>>;
}

/// Chat-completions client (OpenRouter by default).
pub struct ChatCompletionsEndpoint {
    client: reqwest::Client,
    url: String,
    api_key: String,
    temperature: f64,
    top_p: f64,
    max_tokens: Option<u32>,
}

impl ChatCompletionsEndpoint {
    /// Build a client from config, reading the key from the configured
    /// environment variable.
    pub fn from_config(config: &EndpointConfig) -> Result<Self> {
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!("missing API key: set {}", config.api_key_env),
        };
        let url = std::env::var(BASE_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| config.url.clone());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            url,
            api_key,
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
        })
    }

    fn payload(&self, model: &str, messages: &[ChatMessage]) -> Value {
        let mut payload = json!({
            "model": model,
            "messages": messages,
            "temperature": self.temperature,
            "top_p": self.top_p,
            "frequency_penalty": 0,
            "presence_penalty": 0,
        });
        if let Some(max_tokens) = self.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        payload
    }

    #[instrument(skip_all, fields(model = model, messages = messages.len()))]
    async fn send(&self, model: &str, messages: &[ChatMessage]) -> Result<String, TransportError> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.payload(model, messages))
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;
        debug!(status = status.as_u16(), bytes = body.len(), "endpoint replied");
        if status != StatusCode::OK {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }
        extract_content(&body)
    }
}

impl DecisionEndpoint for ChatCompletionsEndpoint {
    fn complete<'a>(
        &'a self,
        model: &'a str,
        messages: &'a [ChatMessage],
    ) -> BoxFuture<'a, Result<String, TransportError>> {
        Box::pin(self.send(model, messages))
    }
}

/// Pull `choices[0].message.content` out of a chat-completions body.
pub fn extract_content(body: &str) -> Result<String, TransportError> {
    let value: Value =
        serde_json::from_str(body).map_err(|err| TransportError::Malformed(err.to_string()))?;
    let first = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or(TransportError::NoChoices)?;
    let content = first
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if content.trim().is_empty() {
        return Err(TransportError::EmptyContent);
    }
    Ok(content.to_string())
}
