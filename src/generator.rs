//! The generation orchestrator.
//!
//! [`DiagramGenerator`] composes the template engine, the retry loop, the
//! LLM capability, snippet cleanup, URL encoding and the renderer into one
//! request/response call:
//!
//! ```text
//! BUILDING_PROMPT -> INVOKING (-> INVOKING on retry) -> EXTRACTING -> SUCCESS
//!                             \-> FAILED (fallback stub)
//! ```
//!
//! [`generate`](DiagramGenerator::generate) never returns an error; failures
//! are folded into [`DiagramGenerationResult::status_message`]. The
//! lower-level [`process`](DiagramGenerator::process) and
//! [`revise`](DiagramGenerator::revise) do raise, so callers that want the
//! error kind can have it.

use crate::config::DiagramConfig;
use crate::encode;
use crate::error::{PipelineError, Result};
use crate::events::{emit, Event, EventHandler, GenerationState};
use crate::llm::{BackendLlm, LlmInterface};
use crate::prompt::{escape_braces, PromptTemplate, RenderVariables};
use crate::render::{HttpRenderer, Renderer};
use crate::retry::{tokio_sleeper, RetryPolicy, Sleeper};
use crate::snippet::{extract_last_block, normalize_braces, strip_code_fences, strip_think_tags};
use crate::types::{DiagramGenerationResult, DiagramRequest};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, info, instrument, warn};

/// Status used when an existing diagram source is rendered again.
pub const RERENDER_MESSAGE: &str = "Re-rendered from PlantUML code.";

/// Orchestrates one diagram generation per call.
///
/// Cheap to share: every collaborator sits behind an `Arc`, and per-call
/// state (the retry history, the rendered prompt) lives on the stack of the
/// call that owns it.
///
/// # Example
///
/// ```no_run
/// use umlbot::{DiagramConfig, DiagramGenerator, DiagramRequest};
/// use std::sync::Arc;
///
/// # async fn run() -> umlbot::Result<()> {
/// let config = Arc::new(DiagramConfig::from_env()?);
/// let generator = DiagramGenerator::builder(config).build()?;
///
/// let result = generator
///     .generate(&DiagramRequest::new("Class", "An online shop with carts and orders"))
///     .await;
/// println!("{}\n{}", result.status_message, result.plantuml_code);
/// # Ok(())
/// # }
/// ```
pub struct DiagramGenerator {
    config: Arc<DiagramConfig>,
    llm: Option<Arc<dyn LlmInterface>>,
    template: Arc<PromptTemplate>,
    renderer: Arc<dyn Renderer>,
    sleeper: Sleeper,
    cancellation: Option<Arc<AtomicBool>>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for DiagramGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagramGenerator")
            .field("config", &self.config)
            .field("llm", &self.llm.as_ref().map(|l| l.name().to_string()))
            .field("has_cancellation", &self.cancellation.is_some())
            .field("has_event_handler", &self.event_handler.is_some())
            .finish_non_exhaustive()
    }
}

impl DiagramGenerator {
    /// Create a new builder.
    pub fn builder(config: Arc<DiagramConfig>) -> DiagramGeneratorBuilder {
        DiagramGeneratorBuilder {
            config,
            llm: None,
            template: None,
            renderer: None,
            sleeper: None,
            cancellation: None,
            event_handler: None,
        }
    }

    pub fn config(&self) -> &DiagramConfig {
        &self.config
    }

    /// A fresh retry policy configured from [`DiagramConfig`].
    pub fn new_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.max_retries).with_backoff(self.config.backoff())
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    fn enter(&self, state: GenerationState) {
        debug!(%state, "generation state");
        emit(&self.event_handler, Event::StateChanged { state });
    }

    /// The configured LLM, or `MissingCredentials`.
    fn llm(&self) -> Result<&Arc<dyn LlmInterface>> {
        if !self.config.has_credentials() {
            return Err(PipelineError::MissingCredentials);
        }
        self.llm.as_ref().ok_or(PipelineError::MissingCredentials)
    }

    /// Generate a diagram for `request`. Never fails; see the module docs.
    #[instrument(skip(self, request), fields(diagram_type = %request.diagram_type))]
    pub async fn generate(&self, request: &DiagramRequest) -> DiagramGenerationResult {
        let mut policy = self.new_retry_policy();
        let outcome = self
            .process(
                &request.diagram_type,
                &request.description,
                request.theme.as_deref(),
                &mut policy,
            )
            .await;

        let (code, status) = match outcome {
            Ok(code) => {
                info!(attempts = policy.attempts() + 1, "diagram generated");
                (code, self.config.success_message.clone())
            }
            Err(PipelineError::MissingCredentials) => {
                warn!("no LLM credentials configured");
                return DiagramGenerationResult::status_only(
                    self.config.missing_credentials_message.clone(),
                );
            }
            Err(PipelineError::Template(msg)) => {
                warn!(error = %msg, "prompt template rejected");
                return DiagramGenerationResult::status_only(format!(
                    "Prompt template error: {}",
                    msg
                ));
            }
            Err(PipelineError::Cancelled) => {
                info!("generation cancelled");
                return DiagramGenerationResult::status_only(format!(
                    "{}.",
                    PipelineError::Cancelled
                ));
            }
            Err(err) => {
                warn!(error = %err, "LLM generation failed, using fallback stub");
                let stub = normalize_braces(&self.fallback_stub(request));
                (
                    stub,
                    format!("LLM error: {}. Showing fallback stub.", policy.last_error()),
                )
            }
        };

        self.render(code, status).await
    }

    /// Render the prompt, call the model with retries, and clean the reply.
    ///
    /// `policy` is reset first and holds the attempt history afterwards.
    /// Returns `RetryExceeded` once every allowed attempt has failed.
    #[instrument(skip(self, description, theme, policy))]
    pub async fn process(
        &self,
        diagram_type: &str,
        description: &str,
        theme: Option<&str>,
        policy: &mut RetryPolicy,
    ) -> Result<String> {
        let llm = self.llm()?.clone();
        self.enter(GenerationState::BuildingPrompt);
        let vars = RenderVariables::for_diagram(diagram_type, description, theme);
        let prompt = self.template.render(&vars)?;
        let prompt = prompt.as_str();

        policy.reset();
        let code = self
            .retry_loop(policy, move || {
                let llm = llm.clone();
                async move {
                    let raw = llm.invoke_async(prompt).await?;
                    self.enter(GenerationState::Extracting);
                    let code = normalize_braces(&strip_code_fences(&strip_think_tags(&raw)));
                    if code.trim().is_empty() {
                        return Err(PipelineError::Llm("LLM returned an empty response".into()));
                    }
                    Ok(code)
                }
            })
            .await?;

        self.enter(GenerationState::Success);
        Ok(code)
    }

    /// Ask the model to revise `current_code` according to `instruction`.
    ///
    /// Each attempt invokes the model and extracts the last valid diagram
    /// block from its reply; a reply without one counts as a failed attempt.
    /// Returns `RetryExceeded` with the full error context on exhaustion.
    #[instrument(skip(self, current_code, instruction))]
    pub async fn revise(
        &self,
        diagram_type: &str,
        current_code: &str,
        instruction: &str,
    ) -> Result<String> {
        let llm = self.llm()?.clone();
        self.enter(GenerationState::BuildingPrompt);
        let prompt = revision_prompt(diagram_type, current_code, instruction);
        let prompt = prompt.as_str();

        let mut policy = self.new_retry_policy();
        let code = self
            .retry_loop(&mut policy, move || {
                let llm = llm.clone();
                async move {
                    let raw = llm.invoke_async(prompt).await?;
                    self.enter(GenerationState::Extracting);
                    Ok(extract_last_block(&raw)?)
                }
            })
            .await?;

        self.enter(GenerationState::Success);
        Ok(normalize_braces(&code))
    }

    /// Non-raising [`revise`](Self::revise). On failure the previous diagram
    /// is kept and the error context goes into the status message.
    pub async fn revise_or_keep(
        &self,
        diagram_type: &str,
        current_code: &str,
        instruction: &str,
    ) -> DiagramGenerationResult {
        match self.revise(diagram_type, current_code, instruction).await {
            Ok(code) => self.render(code, RERENDER_MESSAGE.to_string()).await,
            Err(err) => {
                warn!(error = %err, "revision failed, keeping previous diagram");
                let status = match err {
                    PipelineError::MissingCredentials => {
                        self.config.missing_credentials_message.clone()
                    }
                    other => format!("Revision failed: {}", other),
                };
                if current_code.trim().is_empty() {
                    return DiagramGenerationResult::status_only(status);
                }
                self.render(current_code.to_string(), status).await
            }
        }
    }

    /// Encode and fetch existing diagram source without calling the model.
    pub async fn rerender(&self, code: &str) -> DiagramGenerationResult {
        self.render(code.to_string(), RERENDER_MESSAGE.to_string())
            .await
    }

    /// Run `attempt` until it succeeds or `policy` is exhausted.
    async fn retry_loop<F, Fut>(&self, policy: &mut RetryPolicy, mut attempt: F) -> Result<String>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<String>>,
    {
        loop {
            self.check_cancelled()?;
            self.enter(GenerationState::Invoking);

            let err = match attempt().await {
                Ok(text) => return Ok(text),
                Err(err) => err,
            };

            let reason = format!("{}: {}", err.kind(), err);
            policy.record_error(err);
            warn!(attempt = policy.attempts(), max = policy.max_retries, %reason, "attempt failed");
            emit(
                &self.event_handler,
                Event::AttemptFailed {
                    attempt: policy.attempts(),
                    reason,
                },
            );

            if !policy.should_retry() {
                self.enter(GenerationState::Failed);
                emit(
                    &self.event_handler,
                    Event::RetryExhausted {
                        attempts: policy.attempts(),
                        context: policy.error_context(),
                    },
                );
                return Err(policy.exhausted());
            }

            policy.pause(&self.sleeper).await;
        }
    }

    /// Minimal valid diagram carrying the request as comments.
    fn fallback_stub(&self, request: &DiagramRequest) -> String {
        let description = request
            .description
            .lines()
            .collect::<Vec<_>>()
            .join("\n' ");
        self.config
            .fallback_template
            .replace("{diagram_type}", &request.diagram_type)
            .replace("{description}", &description)
    }

    /// Encode `code`, fetch the image, and fold any failure into `status`.
    async fn render(&self, code: String, status: String) -> DiagramGenerationResult {
        let fetched = match encode::render_url(&self.config.plantuml_url_template, &code) {
            Ok(url) => {
                debug!(%url, "fetching rendered diagram");
                self.renderer.fetch(&url).await.map(|image| (image, url))
            }
            Err(err) => Err(err),
        };

        match fetched {
            Ok((image, image_url)) => DiagramGenerationResult {
                plantuml_code: code,
                image: Some(image),
                status_message: status,
                image_url,
            },
            Err(err) => {
                warn!(error = %err, "PlantUML rendering failed");
                emit(
                    &self.event_handler,
                    Event::RenderFailed {
                        reason: err.to_string(),
                    },
                );
                DiagramGenerationResult {
                    plantuml_code: code,
                    image: None,
                    status_message: render_failure_status(&status, &self.config.success_message, &err),
                    image_url: String::new(),
                }
            }
        }
    }
}

/// Compose the status after a failed render.
fn render_failure_status(status: &str, success_message: &str, err: &PipelineError) -> String {
    if let PipelineError::UnexpectedContentType(_) = err {
        let detail = format!("PlantUML server error: {}", err);
        return if status.is_empty() {
            detail
        } else {
            format!("{} | {}", status, detail)
        };
    }
    if status == success_message {
        format!("Diagram generated, but rendering failed: {}", err)
    } else if status.is_empty() {
        format!("PlantUML rendering failed: {}", err)
    } else {
        format!("{} | PlantUML rendering failed: {}", status, err)
    }
}

/// Prompt for a conversational revision. Braces in user content are escaped.
pub fn revision_prompt(diagram_type: &str, current_code: &str, instruction: &str) -> String {
    format!(
        "Diagram type: {}\nUser request: {}\nCurrent PlantUML code:\n```plantuml\n{}\n```\n\
         Please return only the updated PlantUML code.",
        diagram_type,
        escape_braces(instruction),
        escape_braces(current_code.trim())
    )
}

/// Builder for [`DiagramGenerator`].
pub struct DiagramGeneratorBuilder {
    config: Arc<DiagramConfig>,
    llm: Option<Arc<dyn LlmInterface>>,
    template: Option<Arc<PromptTemplate>>,
    renderer: Option<Arc<dyn Renderer>>,
    sleeper: Option<Sleeper>,
    cancellation: Option<Arc<AtomicBool>>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl DiagramGeneratorBuilder {
    /// Set the LLM. Default: an OpenAI-compatible [`BackendLlm`] from the config.
    pub fn llm(mut self, llm: Arc<dyn LlmInterface>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Set a pre-loaded template. Default: `config.template_path`, else the built-in prompt.
    pub fn template(mut self, template: Arc<PromptTemplate>) -> Self {
        self.template = Some(template);
        self
    }

    /// Set the renderer. Default: [`HttpRenderer`] with `config.render_timeout()`.
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Set the delay function used between retries. Default: `tokio::time::sleep`.
    pub fn sleeper(mut self, sleeper: Sleeper) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Set the cancellation flag.
    pub fn cancellation(mut self, cancel: Option<Arc<AtomicBool>>) -> Self {
        self.cancellation = cancel;
        self
    }

    /// Set the event handler.
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Build the generator.
    ///
    /// Fails on an unreadable or invalid template file, or when credentials
    /// are present but the default LLM cannot be configured.
    pub fn build(self) -> Result<DiagramGenerator> {
        let template = match self.template {
            Some(t) => t,
            None => Arc::new(match &self.config.template_path {
                Some(path) => PromptTemplate::load(path)?,
                None => PromptTemplate::default_uml(),
            }),
        };

        let llm = match self.llm {
            Some(llm) => Some(llm),
            None if self.config.has_credentials() => {
                Some(Arc::new(BackendLlm::from_config(&self.config)?) as Arc<dyn LlmInterface>)
            }
            None => None,
        };

        let renderer = self
            .renderer
            .unwrap_or_else(|| Arc::new(HttpRenderer::new(self.config.render_timeout())));

        Ok(DiagramGenerator {
            config: self.config,
            llm,
            template,
            renderer,
            sleeper: self.sleeper.unwrap_or_else(tokio_sleeper),
            cancellation: self.cancellation,
            event_handler: self.event_handler,
        })
    }
}
