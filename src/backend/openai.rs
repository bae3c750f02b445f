//! Backend for OpenAI-compatible chat completion APIs.
//!
//! Works with OpenAI, Azure-style proxies, vLLM, llama.cpp server, LM Studio,
//! and Ollama's `/v1/` endpoint. Requests always go to
//! `{base}/v1/chat/completions` without streaming; a diagram is only useful
//! once it is complete.

use super::{Backend, LlmRequest, LlmResponse};
use crate::error::Result;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Backend for any OpenAI-compatible API.
///
/// # Example
///
/// ```
/// use umlbot::backend::OpenAiBackend;
///
/// let local = OpenAiBackend::new();
/// let hosted = OpenAiBackend::new().with_api_key("sk-...");
/// assert!(hosted.has_api_key());
/// ```
#[derive(Clone, Default)]
pub struct OpenAiBackend {
    api_key: Option<String>,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("api_key", &self.api_key.as_deref().map(redact))
            .finish()
    }
}

/// Keep a short prefix of a secret for identification.
pub(crate) fn redact(secret: &str) -> String {
    match secret.get(..6) {
        Some(prefix) if secret.len() > 6 => format!("{}***", prefix),
        _ => "***".to_string(),
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    stream: bool,
}

impl<'a> ChatRequest<'a> {
    fn from_request(request: &'a LlmRequest) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });
        Self {
            model: &request.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<serde_json::Value>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletion {
    /// Text of the first choice. A reply without choices is an error.
    fn into_text(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| PipelineError::Llm("LLM response contained no choices".to_string()))
    }
}

impl OpenAiBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send the key as `Authorization: Bearer {key}`. An empty key is ignored.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = (!key.trim().is_empty()).then_some(key);
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn build_http_request(&self, client: &Client, url: &str, body: &ChatRequest<'_>) -> reqwest::RequestBuilder {
        let req = client.post(url).json(body);
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

/// Strip known provider path suffixes from a base URL.
/// e.g. `"https://api.openai.com/v1"` -> `"https://api.openai.com"`
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    ["/v1/chat/completions", "/v1/chat", "/v1"]
        .iter()
        .find_map(|suffix| trimmed.strip_suffix(suffix))
        .unwrap_or(trimmed)
        .to_string()
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        let url = format!("{}/v1/chat/completions", normalize_base_url(base_url));
        let body = ChatRequest::from_request(request);

        let resp = self
            .build_http_request(client, &url, &body)
            .send()
            .await
            .map_err(|e| {
                PipelineError::Other(format!("Failed to connect to LLM at {}: {}", url, e))
            })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::HttpError { status, body: text });
        }

        let completion: ChatCompletion = resp.json().await?;
        debug!(
            model = completion.model.as_deref().unwrap_or(request.model.as_str()),
            usage = ?completion.usage,
            "chat completion received"
        );
        let metadata = completion.usage.clone();
        Ok(LlmResponse {
            text: completion.into_text()?,
            status,
            metadata,
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
