//! Backend trait and normalized request/response types.
//!
//! The [`Backend`] trait abstracts over LLM providers, translating between
//! normalized [`LlmRequest`]/[`LlmResponse`] types and provider-specific
//! HTTP APIs. [`BackendLlm`](crate::llm::BackendLlm) adapts a backend to the
//! pipeline's [`LlmInterface`](crate::llm::LlmInterface).
//!
//! ```text
//! DiagramGenerator ──► LlmInterface ──► BackendLlm ──► Backend::complete()
//!                                                          │
//!                                               ┌──────────┴──────────┐
//!                                         OpenAiBackend          MockBackend
//!                                     /v1/chat/completions     scripted replies
//! ```

pub mod mock;
pub mod openai;

pub use mock::MockBackend;
pub use openai::OpenAiBackend;

use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;

/// A normalized LLM request, provider-agnostic.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Model identifier (e.g. `"gpt-4o-mini"`).
    pub model: String,

    /// Optional system instructions sent ahead of the prompt.
    pub system_prompt: Option<String>,

    /// The user prompt text.
    pub prompt: String,

    /// Sampling temperature.
    pub temperature: f64,

    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: None,
            prompt: prompt.into(),
            temperature: 0.2,
            max_tokens: 2048,
        }
    }
}

/// A normalized LLM response.
#[derive(Debug)]
pub struct LlmResponse {
    /// The generated text content.
    pub text: String,

    /// HTTP status code (for diagnostics/logging).
    pub status: u16,

    /// Provider-specific metadata (token counts, model info).
    pub metadata: Option<serde_json::Value>,
}

/// Abstraction over LLM providers.
///
/// This trait is object-safe and designed to be used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute a non-streaming LLM call.
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}
