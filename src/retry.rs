//! Bounded retry state for a single generation.
//!
//! [`RetryPolicy`] counts failed attempts and keeps every error in order so
//! the final diagnostic can describe the whole history. One policy belongs to
//! one generation; it is reset at the start of each and never shared.
//!
//! The pause between attempts goes through an injectable [`Sleeper`] so tests
//! can retry without wall-clock cost.

use crate::error::PipelineError;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

/// Async delay function used between attempts.
pub type Sleeper = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

/// Sleeper backed by `tokio::time::sleep`.
pub fn tokio_sleeper() -> Sleeper {
    Arc::new(|delay| Box::pin(tokio::time::sleep(delay)))
}

/// Sleeper that returns immediately.
pub fn no_sleep() -> Sleeper {
    Arc::new(|_| Box::pin(async {}))
}

/// Retry bookkeeping: attempts made and errors recorded so far.
///
/// # Example
///
/// ```
/// use umlbot::retry::RetryPolicy;
/// use umlbot::PipelineError;
///
/// let mut policy = RetryPolicy::new(2);
/// policy.record_error(PipelineError::Llm("timeout".into()));
/// assert!(policy.should_retry());
/// policy.record_error(PipelineError::Llm("timeout again".into()));
/// assert!(!policy.should_retry());
/// assert_eq!(policy.error_context(), "LLMError: timeout; LLMError: timeout again");
/// ```
#[derive(Debug)]
pub struct RetryPolicy {
    /// Maximum number of attempts before giving up.
    pub max_retries: u32,
    /// Pause between a failed attempt and the next one. Zero means immediate.
    pub backoff: Duration,
    attempts: u32,
    errors: Vec<PipelineError>,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Duration::ZERO,
            attempts: 0,
            errors: Vec::new(),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Record a failed attempt.
    pub fn record_error(&mut self, error: PipelineError) {
        self.attempts += 1;
        self.errors.push(error);
    }

    /// True while fewer than `max_retries` attempts have failed.
    pub fn should_retry(&self) -> bool {
        self.attempts < self.max_retries
    }

    /// Clear attempts and errors. Call at the start of a new operation only.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.errors.clear();
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn errors(&self) -> &[PipelineError] {
        &self.errors
    }

    /// Message of the most recent error, or empty.
    pub fn last_error(&self) -> String {
        self.errors.last().map(|e| e.to_string()).unwrap_or_default()
    }

    /// One line: `"{kind}: {message}"` per error, joined by `"; "`.
    pub fn error_context(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.kind(), e))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// `(attempt_number, message)` pairs, 1-indexed.
    pub fn error_context_list(&self) -> Vec<(u32, String)> {
        self.errors
            .iter()
            .enumerate()
            .map(|(i, e)| (i as u32 + 1, e.to_string()))
            .collect()
    }

    /// Wait out the backoff before the next attempt.
    pub async fn pause(&self, sleeper: &Sleeper) {
        if !self.backoff.is_zero() {
            sleeper(self.backoff).await;
        }
    }

    /// Convert the recorded history into a terminal error.
    pub fn exhausted(&self) -> PipelineError {
        PipelineError::RetryExceeded {
            attempts: self.attempts,
            context: self.error_context(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
