//! Event system for generation lifecycle hooks.
//!
//! Provides an optional, non-intrusive way to observe a generation as it
//! moves through its states. Implement [`EventHandler`] to drive progress
//! indicators or collect metrics; the pipeline works the same without one.

use std::fmt;
use std::sync::Arc;

/// States of a single generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    BuildingPrompt,
    /// Calling the model. Re-entered once per retry.
    Invoking,
    Extracting,
    Success,
    /// Retries exhausted; a fallback stub is returned instead.
    Failed,
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GenerationState::BuildingPrompt => "BUILDING_PROMPT",
            GenerationState::Invoking => "INVOKING",
            GenerationState::Extracting => "EXTRACTING",
            GenerationState::Success => "SUCCESS",
            GenerationState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Events emitted during generation.
#[derive(Debug, Clone)]
pub enum Event {
    /// The generation entered a new state.
    StateChanged {
        state: GenerationState,
    },
    /// One model attempt failed and was recorded.
    AttemptFailed {
        /// The attempt number (1-indexed).
        attempt: u32,
        /// Error kind and message.
        reason: String,
    },
    /// Every allowed attempt failed.
    RetryExhausted {
        attempts: u32,
        /// Semicolon-joined summary of every recorded error.
        context: String,
    },
    /// The rendering service did not return an image. Non-fatal.
    RenderFailed {
        reason: String,
    },
}

/// Handler for generation lifecycle events.
///
/// # Example
///
/// ```
/// use umlbot::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::StateChanged { state } => println!("[state] {}", state),
///             Event::AttemptFailed { attempt, reason } => println!("[retry] #{} {}", attempt, reason),
///             _ => {} // RetryExhausted, RenderFailed
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called when the generator emits an event.
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// # Example
///
/// ```
/// use umlbot::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::RenderFailed { reason } = event {
///         eprintln!("render failed: {}", reason);
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_emit_reaches_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: Option<Arc<dyn EventHandler>> = Some(Arc::new(FnEventHandler(move |e| {
            if let Event::StateChanged { state } = e {
                sink.lock().unwrap().push(state);
            }
        })));

        emit(&handler, Event::StateChanged { state: GenerationState::Invoking });
        emit(&None, Event::StateChanged { state: GenerationState::Failed });

        assert_eq!(*seen.lock().unwrap(), vec![GenerationState::Invoking]);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(GenerationState::BuildingPrompt.to_string(), "BUILDING_PROMPT");
        assert_eq!(GenerationState::Success.to_string(), "SUCCESS");
    }
}
