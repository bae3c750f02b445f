//! Mock backend for testing without a live LLM.
//!
//! [`MockBackend`] replays a script of replies and failures in order,
//! allowing deterministic tests of the retry and fallback paths.
//!
//! # Example
//!
//! ```
//! use umlbot::backend::MockBackend;
//!
//! let mock = MockBackend::new(vec![
//!     Err("rate limited".to_string()),
//!     Ok("@startuml\nclass Foo\n@enduml".to_string()),
//! ]);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;

use super::{Backend, LlmRequest, LlmResponse};
use crate::error::Result;
use crate::PipelineError;

/// A test backend that plays back scripted outcomes in order.
///
/// Cycles back to the beginning when the script is exhausted. An `Err`
/// entry is returned as [`PipelineError::Other`], the way a transport
/// failure would surface.
#[derive(Debug)]
pub struct MockBackend {
    script: Vec<std::result::Result<String, String>>,
    index: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockBackend {
    /// Create a mock backend with the given script.
    pub fn new(script: Vec<std::result::Result<String, String>>) -> Self {
        assert!(!script.is_empty(), "MockBackend requires at least one entry");
        Self {
            script,
            index: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A mock that always returns the same reply.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![Ok(response.into())])
    }

    /// A mock that always fails with the same message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::new(vec![Err(message.into())])
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn next_outcome(&self) -> std::result::Result<String, String> {
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.script.len();
        self.script[idx].clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn complete(
        &self,
        _client: &Client,
        _base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.clone());
        }
        let text = self.next_outcome().map_err(PipelineError::Other)?;
        Ok(LlmResponse {
            text,
            status: 200,
            metadata: None,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> LlmRequest {
        LlmRequest::new("test", "draw")
    }

    #[tokio::test]
    async fn test_mock_fixed_response() {
        let mock = MockBackend::fixed("Hello!");
        let resp = mock.complete(&Client::new(), "http://unused", &request()).await.unwrap();
        assert_eq!(resp.text, "Hello!");
        assert_eq!(resp.status, 200);
        assert_eq!(mock.prompts(), vec!["draw".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_scripted_failure_then_success() {
        let mock = MockBackend::new(vec![Err("boom".into()), Ok("second".into())]);
        let client = Client::new();
        let r1 = mock.complete(&client, "http://unused", &request()).await;
        let r2 = mock.complete(&client, "http://unused", &request()).await.unwrap();
        let r3 = mock.complete(&client, "http://unused", &request()).await;
        assert!(matches!(r1, Err(PipelineError::Other(ref m)) if m == "boom"));
        assert_eq!(r2.text, "second");
        assert!(r3.is_err()); // cycles
        assert_eq!(mock.calls(), 3);
    }
}
