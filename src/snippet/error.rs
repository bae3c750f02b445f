//! Error types for snippet extraction.

use crate::error::PipelineError;

/// Errors returned by snippet extraction.
#[derive(Debug, thiserror::Error)]
pub enum SnippetError {
    /// The model response was empty or whitespace-only.
    #[error("empty LLM response")]
    EmptyResponse,

    /// No candidate contained both diagram markers.
    #[error("No valid PlantUML block found in response: {text}")]
    NoValidBlock {
        /// A truncated copy of the response (max 200 chars).
        text: String,
    },
}

impl From<SnippetError> for PipelineError {
    fn from(err: SnippetError) -> Self {
        PipelineError::Extraction(err.to_string())
    }
}

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
