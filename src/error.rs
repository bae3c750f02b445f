use thiserror::Error;

/// Errors produced by the generation pipeline and its components.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Prompt template could not be loaded, validated, or rendered.
    #[error("Template error: {0}")]
    Template(String),

    /// The LLM backend failed. Carries the backend's original message.
    #[error("{0}")]
    Llm(String),

    /// Every allowed attempt failed.
    #[error("Failed after {attempts} attempts: {context}")]
    RetryExceeded {
        /// Number of attempts made.
        attempts: u32,
        /// Semicolon-joined `"{kind}: {message}"` summary of every attempt.
        context: String,
    },

    /// No valid diagram block was found in model output.
    #[error("{0}")]
    Extraction(String),

    /// The rendering service did not return a usable image.
    #[error("{0}")]
    Render(String),

    /// The rendering service answered with something other than a PNG.
    #[error("Unexpected content-type '{0}'.")]
    UnexpectedContentType(String),

    /// HTTP error with status code and response body.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 429, 500, 503).
        status: u16,
        /// Response body text.
        body: String,
    },

    /// No API key was configured.
    #[error("Missing LLM credentials")]
    MissingCredentials,

    /// Invalid configuration detected at build time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An inbound request was missing required fields.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The generation was cancelled via the cancellation flag.
    #[error("Generation was cancelled")]
    Cancelled,

    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Stable name of the error kind, used in retry diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Template(_) => "TemplateError",
            PipelineError::Llm(_) => "LLMError",
            PipelineError::RetryExceeded { .. } => "RetryExceededError",
            PipelineError::Extraction(_) => "ExtractionError",
            PipelineError::Render(_)
            | PipelineError::UnexpectedContentType(_)
            | PipelineError::HttpError { .. } => "RenderError",
            PipelineError::MissingCredentials => "MissingCredentials",
            PipelineError::InvalidConfig(_) => "ConfigError",
            PipelineError::InvalidRequest(_) => "InvalidRequest",
            PipelineError::Cancelled => "Cancelled",
            PipelineError::Request(_) => "RequestError",
            PipelineError::Json(_) => "JsonError",
            PipelineError::Io(_) => "IoError",
            PipelineError::Other(_) => "Error",
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
