//! Explicit configuration for the generation pipeline.
//!
//! [`DiagramConfig`] is built once at process start (usually with
//! [`DiagramConfig::from_env`]), wrapped in an `Arc`, and passed to the
//! generator. Tests construct it directly.

use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PLANTUML_TEMPLATE: &str = "http://localhost:8080/png/{encoded}";
const DOCKER_PLANTUML_HOST: &str = "http://plantuml:8080";

pub const SUCCESS_MESSAGE: &str = "Diagram generated successfully using LLM.";
pub const MISSING_CREDENTIALS_MESSAGE: &str = "LLM API key or base URL not found. Please ensure \
UMLBOT_LLM_API_KEY and UMLBOT_LLM_API_BASE are set.";
pub const FALLBACK_TEMPLATE: &str = "@startuml\n' {diagram_type} diagram\n' {description}\n@enduml";

/// Pipeline configuration. Read-only once constructed.
///
/// # Example
///
/// ```
/// use umlbot::DiagramConfig;
///
/// let config = DiagramConfig {
///     api_key: "sk-test".into(),
///     max_retries: 2,
///     ..DiagramConfig::default()
/// };
/// assert!(config.has_credentials());
/// ```
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DiagramConfig {
    /// Credential for the LLM provider. Empty means "not configured".
    pub api_key: String,
    /// Base URL of the OpenAI-compatible endpoint.
    pub api_base: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Prompt template file. `None` uses the built-in template.
    pub template_path: Option<PathBuf>,
    /// Render URL template; `{encoded}` is replaced by the diagram token,
    /// otherwise the token is appended as a path segment.
    pub plantuml_url_template: String,
    /// Attempts allowed per generation.
    pub max_retries: u32,
    /// Pause between attempts. Zero or negative means immediate.
    pub backoff_ms: i64,
    pub llm_timeout_secs: u64,
    pub render_timeout_secs: u64,
    pub success_message: String,
    pub missing_credentials_message: String,
    /// Stub returned when every attempt fails. Takes `{diagram_type}` and `{description}`.
    pub fallback_template: String,
}

impl std::fmt::Debug for DiagramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagramConfig")
            .field("api_key", &crate::backend::openai::redact(&self.api_key))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("template_path", &self.template_path)
            .field("plantuml_url_template", &self.plantuml_url_template)
            .field("max_retries", &self.max_retries)
            .field("backoff_ms", &self.backoff_ms)
            .finish_non_exhaustive()
    }
}

impl Default for DiagramConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: String::new(),
            model: "gpt-4o-mini".to_string(),
            system_prompt: None,
            temperature: 0.2,
            max_tokens: 2048,
            template_path: None,
            plantuml_url_template: DEFAULT_PLANTUML_TEMPLATE.to_string(),
            max_retries: 3,
            backoff_ms: 0,
            llm_timeout_secs: 60,
            render_timeout_secs: 10,
            success_message: SUCCESS_MESSAGE.to_string(),
            missing_credentials_message: MISSING_CREDENTIALS_MESSAGE.to_string(),
            fallback_template: FALLBACK_TEMPLATE.to_string(),
        }
    }
}

impl DiagramConfig {
    /// Read `UMLBOT_*` environment variables over the defaults.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `UMLBOT_LLM_API_KEY` | `api_key` |
    /// | `UMLBOT_LLM_API_BASE` | `api_base` |
    /// | `UMLBOT_LLM_MODEL` | `model` |
    /// | `UMLBOT_PLANTUML_SERVER_URL_TEMPLATE` | `plantuml_url_template` |
    /// | `UMLBOT_PROMPT_TEMPLATE` | `template_path` |
    /// | `UMLBOT_MAX_RETRIES` | `max_retries` |
    /// | `UMLBOT_BACKOFF_MS` | `backoff_ms` |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), Path::new("/.dockerenv").exists())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit lookup, for tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>, in_container: bool) -> Result<Self> {
        let mut config = Self::default();
        if in_container {
            config.plantuml_url_template = format!("{}/png/{{encoded}}", DOCKER_PLANTUML_HOST);
        }

        if let Some(v) = lookup("UMLBOT_LLM_API_KEY") {
            config.api_key = v;
        }
        if let Some(v) = lookup("UMLBOT_LLM_API_BASE") {
            config.api_base = v;
        }
        if let Some(v) = lookup("UMLBOT_LLM_MODEL") {
            config.model = v;
        }
        if let Some(v) = lookup("UMLBOT_PLANTUML_SERVER_URL_TEMPLATE") {
            config.plantuml_url_template = v;
        }
        if let Some(v) = lookup("UMLBOT_PROMPT_TEMPLATE") {
            config.template_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("UMLBOT_MAX_RETRIES") {
            config.max_retries = v.trim().parse().map_err(|e| {
                PipelineError::InvalidConfig(format!("UMLBOT_MAX_RETRIES: {}", e))
            })?;
        }
        if let Some(v) = lookup("UMLBOT_BACKOFF_MS") {
            config.backoff_ms = v.trim().parse().map_err(|e| {
                PipelineError::InvalidConfig(format!("UMLBOT_BACKOFF_MS: {}", e))
            })?;
        }

        if in_container {
            config.plantuml_url_template = rewrite_localhost(&config.plantuml_url_template);
        }
        Ok(config)
    }

    /// Parse a YAML document; absent keys keep their defaults.
    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| PipelineError::InvalidConfig(e.to_string()))
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Backoff as a duration; negative values clamp to zero.
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms.max(0) as u64)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }
}

/// Inside a container the render server is reachable by service name.
fn rewrite_localhost(template: &str) -> String {
    for local in ["http://localhost:8080", "http://127.0.0.1:8080"] {
        if let Some(rest) = template.strip_prefix(local) {
            return format!("{}{}", DOCKER_PLANTUML_HOST, rest);
        }
    }
    template.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DiagramConfig::default();
        assert!(!config.has_credentials());
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.render_timeout(), Duration::from_secs(10));
        assert_eq!(config.plantuml_url_template, DEFAULT_PLANTUML_TEMPLATE);
        assert_eq!(config.llm_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = DiagramConfig::from_lookup(
            lookup(&[
                ("UMLBOT_LLM_API_KEY", "sk-abc"),
                ("UMLBOT_LLM_API_BASE", "https://llm.local/v1"),
                ("UMLBOT_MAX_RETRIES", "5"),
                ("UMLBOT_BACKOFF_MS", "-20"),
            ]),
            false,
        )
        .unwrap();
        assert!(config.has_credentials());
        assert_eq!(config.api_base, "https://llm.local/v1");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.backoff(), Duration::ZERO);
    }

    #[test]
    fn test_from_lookup_rejects_bad_number() {
        let err = DiagramConfig::from_lookup(lookup(&[("UMLBOT_MAX_RETRIES", "many")]), false)
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_container_rewrites_localhost() {
        let config = DiagramConfig::from_lookup(
            lookup(&[(
                "UMLBOT_PLANTUML_SERVER_URL_TEMPLATE",
                "http://127.0.0.1:8080/svg/{encoded}",
            )]),
            true,
        )
        .unwrap();
        assert_eq!(config.plantuml_url_template, "http://plantuml:8080/svg/{encoded}");

        let config = DiagramConfig::from_lookup(lookup(&[]), true).unwrap();
        assert_eq!(config.plantuml_url_template, "http://plantuml:8080/png/{encoded}");
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = DiagramConfig {
            api_key: "sk-1234567890".into(),
            ..DiagramConfig::default()
        };
        let out = format!("{:?}", config);
        assert!(!out.contains("1234567890"));
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn test_from_yaml_str() {
        let config = DiagramConfig::from_yaml_str("api_key: sk-y\nmax_retries: 1\n").unwrap();
        assert_eq!(config.api_key, "sk-y");
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.model, "gpt-4o-mini");
    }
}
