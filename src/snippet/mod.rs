//! # Diagram snippets
//!
//! Pulls PlantUML source out of free-form model output and repairs the
//! formatting mistakes models commonly make.
//!
//! | Function | Purpose |
//! |----------|---------|
//! | [`extract_last_block`] | Last valid `@startuml`…`@enduml` block in a chatty reply |
//! | [`strip_code_fences`] | Remove a wrapping ```` ``` ```` fence |
//! | [`normalize_braces`] | Collapse doubled `{{`/`}}` into single braces |
//! | [`strip_think_tags`] | Remove `<think>` reasoning blocks |

pub mod error;
pub mod extract;
pub mod normalize;

pub use error::SnippetError;
pub use extract::{extract_last_block, strip_code_fences, strip_think_tags};
pub use normalize::normalize_braces;

/// Opening marker of a PlantUML diagram.
pub const START_MARKER: &str = "@startuml";
/// Closing marker of a PlantUML diagram.
pub const END_MARKER: &str = "@enduml";
