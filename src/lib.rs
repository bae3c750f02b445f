//! # UMLBot
//!
//! Turns free-text descriptions into UML diagrams: a language model writes
//! PlantUML source, and a PlantUML server renders it to PNG.
//!
//! This crate provides the generation pipeline only. HTTP routing, UI, and
//! logging setup belong to the application that embeds it; the [`api`]
//! module shapes JSON responses so that embedding stays thin.
//!
//! ## Core Concepts
//!
//! - **[`PromptTemplate`]**: validated prompt with `{name}` or `{{ name }}`
//!   placeholders; values are brace-escaped on render.
//! - **[`RetryPolicy`]**: bounded attempts with an ordered error history and
//!   an injectable [`Sleeper`](retry::Sleeper) for backoff.
//! - **[`LlmInterface`]**: the model capability. [`LlmAdapter`] wraps a
//!   blocking closure; [`BackendLlm`] talks to an OpenAI-compatible server.
//! - **[`snippet`]**: extracts the last valid `@startuml` block from chatty
//!   output and repairs doubled braces.
//! - **[`encode`]**: deflate + base64 + PlantUML alphabet render tokens.
//! - **[`DiagramGenerator`]**: the orchestrator. `generate` never fails;
//!   problems are reported in [`DiagramGenerationResult::status_message`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use umlbot::{DiagramConfig, DiagramGenerator, DiagramRequest};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(DiagramConfig::from_env()?);
//!     let generator = DiagramGenerator::builder(config).build()?;
//!
//!     let request = DiagramRequest::new("Sequence", "A user logs in with 2FA");
//!     let result = generator.generate(&request).await;
//!
//!     println!("{}", result.status_message);
//!     println!("{}", result.plantuml_code);
//!     if result.has_image() {
//!         println!("rendered at {}", result.image_url);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Testing without a model
//!
//! ```
//! use umlbot::{DiagramConfig, DiagramGenerator, DiagramRequest, LlmAdapter};
//! use umlbot::retry::no_sleep;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = Arc::new(DiagramConfig { api_key: "test".into(), ..Default::default() });
//! let llm = LlmAdapter::from_fn(|_prompt| Ok("@startuml\nclass Shop\n@enduml".into()));
//! let generator = DiagramGenerator::builder(config)
//!     .llm(Arc::new(llm))
//!     .sleeper(no_sleep())
//!     .build()
//!     .unwrap();
//!
//! let mut policy = generator.new_retry_policy();
//! let code = generator.process("Class", "a shop", None, &mut policy).await.unwrap();
//! assert_eq!(code, "@startuml\nclass Shop\n@enduml");
//! # });
//! ```

pub mod api;
pub mod backend;
pub mod config;
pub mod encode;
pub mod error;
pub mod events;
pub mod generator;
pub mod llm;
pub mod prompt;
pub mod render;
pub mod retry;
pub mod snippet;
pub mod types;

pub use backend::{Backend, MockBackend, OpenAiBackend};
pub use config::DiagramConfig;
pub use error::{PipelineError, Result};
pub use events::{Event, EventHandler, FnEventHandler, GenerationState};
pub use generator::{DiagramGenerator, DiagramGeneratorBuilder};
pub use llm::{BackendLlm, LlmAdapter, LlmInterface};
pub use prompt::{PromptTemplate, RenderVariables};
pub use render::{HttpRenderer, Renderer};
pub use retry::RetryPolicy;
pub use types::{DiagramGenerationResult, DiagramImage, DiagramRequest};
