//! LLM invocation behind one contract.
//!
//! [`LlmInterface`] is the capability the generator depends on. Two
//! implementations ship with the crate:
//!
//! - [`LlmAdapter`] wraps a plain blocking callable. `invoke` calls it on the
//!   current thread; `invoke_async` moves it to tokio's blocking pool so a
//!   slow model never stalls the async scheduler, and bounds the wait with a
//!   timeout.
//! - [`BackendLlm`] drives an HTTP [`Backend`] with a bounded timeout.
//!
//! Both convert every backend failure into [`PipelineError::Llm`] carrying the
//! original message.

use crate::backend::{Backend, LlmRequest, OpenAiBackend};
use crate::config::DiagramConfig;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Blocking model callable: prompt in, completion out.
pub type LlmCallable = Arc<dyn Fn(&str) -> anyhow::Result<String> + Send + Sync>;

/// The invocation capability used by [`DiagramGenerator`](crate::DiagramGenerator).
#[async_trait]
pub trait LlmInterface: Send + Sync {
    /// Send `prompt` to the model and return its raw text reply.
    async fn invoke_async(&self, prompt: &str) -> Result<String>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &str;
}

/// Adapts a blocking callable to [`LlmInterface`].
///
/// # Example
///
/// ```
/// use umlbot::llm::LlmAdapter;
///
/// let adapter = LlmAdapter::from_fn(|prompt| Ok(format!("echo: {}", prompt)));
/// assert_eq!(adapter.invoke("hi").unwrap(), "echo: hi");
/// ```
#[derive(Clone)]
pub struct LlmAdapter {
    callable: LlmCallable,
    timeout: Duration,
}

impl std::fmt::Debug for LlmAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmAdapter")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(60);

impl LlmAdapter {
    /// Build from an optional callable. `None` is a configuration error.
    pub fn new(callable: Option<LlmCallable>) -> Result<Self> {
        let callable = callable.ok_or_else(|| {
            PipelineError::InvalidConfig("an LLM callable must be supplied".to_string())
        })?;
        Ok(Self {
            callable,
            timeout: DEFAULT_LLM_TIMEOUT,
        })
    }

    /// Build from a closure.
    pub fn from_fn(f: impl Fn(&str) -> anyhow::Result<String> + Send + Sync + 'static) -> Self {
        Self {
            callable: Arc::new(f),
            timeout: DEFAULT_LLM_TIMEOUT,
        }
    }

    /// Bound each `invoke_async` call. A callable still running when the
    /// bound expires is abandoned on the blocking pool.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Invoke on the calling thread.
    pub fn invoke(&self, prompt: &str) -> Result<String> {
        (self.callable)(prompt).map_err(|e| PipelineError::Llm(e.to_string()))
    }
}

#[async_trait]
impl LlmInterface for LlmAdapter {
    async fn invoke_async(&self, prompt: &str) -> Result<String> {
        let callable = self.callable.clone();
        let prompt = prompt.to_string();
        let worker = tokio::task::spawn_blocking(move || callable(&prompt));
        match tokio::time::timeout(self.timeout, worker).await {
            Ok(joined) => joined
                .map_err(|e| PipelineError::Llm(format!("LLM worker failed: {}", e)))?
                .map_err(|e| PipelineError::Llm(e.to_string())),
            Err(_) => Err(PipelineError::Llm(format!(
                "LLM call timed out after {:?}",
                self.timeout
            ))),
        }
    }

    fn name(&self) -> &str {
        "callable"
    }
}

/// Drives an HTTP [`Backend`] as an [`LlmInterface`].
pub struct BackendLlm {
    backend: Arc<dyn Backend>,
    client: Client,
    base_url: String,
    model: String,
    system_prompt: Option<String>,
    temperature: f64,
    max_tokens: u32,
    timeout: Duration,
}

impl std::fmt::Debug for BackendLlm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendLlm")
            .field("backend", &self.backend.name())
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl BackendLlm {
    pub fn new(backend: Arc<dyn Backend>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            backend,
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            system_prompt: None,
            temperature: 0.2,
            max_tokens: 2048,
            timeout: DEFAULT_LLM_TIMEOUT,
        }
    }

    /// OpenAI-compatible backend configured from `config`.
    ///
    /// Fails with [`PipelineError::InvalidConfig`] when no API base is set.
    pub fn from_config(config: &DiagramConfig) -> Result<Self> {
        if config.api_base.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "LLM API base URL is not set".to_string(),
            ));
        }
        let backend = OpenAiBackend::new().with_api_key(config.api_key.clone());
        let mut llm = Self::new(Arc::new(backend), config.api_base.clone(), config.model.clone());
        llm.temperature = config.temperature;
        llm.max_tokens = config.max_tokens;
        llm.timeout = config.llm_timeout();
        llm.system_prompt = config.system_prompt.clone();
        Ok(llm)
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_request(&self, prompt: &str) -> LlmRequest {
        LlmRequest {
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            prompt: prompt.to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl LlmInterface for BackendLlm {
    async fn invoke_async(&self, prompt: &str) -> Result<String> {
        let request = self.build_request(prompt);
        let call = self.backend.complete(&self.client, &self.base_url, &request);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(response)) => {
                debug!(
                    backend = self.backend.name(),
                    status = response.status,
                    metadata = ?response.metadata,
                    "LLM call completed"
                );
                Ok(response.text)
            }
            Ok(Err(e)) => Err(PipelineError::Llm(e.to_string())),
            Err(_) => Err(PipelineError::Llm(format!(
                "LLM call timed out after {:?}",
                self.timeout
            ))),
        }
    }

    fn name(&self) -> &str {
        self.backend.name()
    }
}
