//! Snippet extraction from LLM output.
//!
//! Conversational replies wrap the diagram in prose, fences, and sometimes
//! several drafts. Everything here works on `&str` offsets so candidates can
//! be ranked by where they appear.

use super::error::{truncate, SnippetError};
use super::{END_MARKER, START_MARKER};

const FENCE: &str = "```";

/// Strip all `<think>...</think>` and `<thinking>...</thinking>` blocks from text.
///
/// An unclosed block swallows the rest of the text.
///
/// # Examples
///
/// ```
/// use umlbot::snippet::strip_think_tags;
///
/// assert_eq!(strip_think_tags("<think>reasoning</think>@startuml"), "@startuml");
/// assert_eq!(strip_think_tags("<think>no closing tag"), "");
/// ```
pub fn strip_think_tags(text: &str) -> String {
    let result = strip_tag_variant(text, "<think>", "</think>");
    strip_tag_variant(&result, "<thinking>", "</thinking>")
}

fn strip_tag_variant(text: &str, open: &str, close: &str) -> String {
    let mut result = text.to_string();
    while let Some(start) = result.find(open) {
        if let Some(end_offset) = result[start..].find(close) {
            let end = start + end_offset + close.len();
            result = format!("{}{}", &result[..start], &result[end..]);
        } else {
            result.truncate(start);
            break;
        }
    }
    result
}

/// Remove a leading ```` ```lang ```` fence and a trailing ```` ``` ````,
/// then trim. Text without fences is only trimmed.
///
/// # Examples
///
/// ```
/// use umlbot::snippet::strip_code_fences;
///
/// let raw = "```plantuml\n@startuml\nA -> B\n@enduml\n```";
/// assert_eq!(strip_code_fences(raw), "@startuml\nA -> B\n@enduml");
/// ```
pub fn strip_code_fences(text: &str) -> String {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix(FENCE) {
        body = skip_language_tag(rest);
    }
    if let Some(rest) = body.strip_suffix(FENCE) {
        body = rest;
    }
    body.trim().to_string()
}

/// Skip an optional language tag directly after an opening fence.
fn skip_language_tag(after_fence: &str) -> &str {
    let tag_len = after_fence
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '+'))
        .unwrap_or(after_fence.len());
    &after_fence[tag_len..]
}

/// A candidate region and where it starts in the source text.
struct Candidate<'a> {
    start: usize,
    body: &'a str,
}

/// Every fenced code block, with or without a language tag.
fn fenced_blocks(text: &str) -> Vec<Candidate<'_>> {
    let mut blocks = Vec::new();
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find(FENCE) {
        let open = search_from + offset;
        let content_start = open + FENCE.len();
        let Some(close_offset) = text[content_start..].find(FENCE) else {
            break;
        };
        let close = content_start + close_offset;
        blocks.push(Candidate {
            start: open,
            body: skip_language_tag(&text[content_start..close]),
        });
        search_from = close + FENCE.len();
    }
    blocks
}

/// Every `@startuml … @enduml` region, shortest match.
fn marker_blocks(text: &str) -> Vec<Candidate<'_>> {
    let mut blocks = Vec::new();
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find(START_MARKER) {
        let start = search_from + offset;
        let after = start + START_MARKER.len();
        let Some(end_offset) = text[after..].find(END_MARKER) else {
            break;
        };
        let end = after + end_offset + END_MARKER.len();
        blocks.push(Candidate {
            start,
            body: &text[start..end],
        });
        search_from = end;
    }
    blocks
}

/// Return the last valid diagram block in `text`.
///
/// Candidates are fenced code blocks and marker-delimited regions. A
/// candidate is valid when, after stripping fences and whitespace, it still
/// contains both `@startuml` and `@enduml`. The candidate that starts last
/// wins, since models tend to restate corrected drafts at the end.
///
/// # Examples
///
/// ```
/// use umlbot::snippet::extract_last_block;
///
/// let reply = "Draft:\n```plantuml\n@startuml\nA -> B\n@enduml\n```\n\
///              Fixed:\n```plantuml\n@startuml\nA -> C\n@enduml\n```";
/// assert_eq!(extract_last_block(reply).unwrap(), "@startuml\nA -> C\n@enduml");
/// ```
pub fn extract_last_block(text: &str) -> Result<String, SnippetError> {
    let cleaned = strip_think_tags(text);
    if cleaned.trim().is_empty() {
        return Err(SnippetError::EmptyResponse);
    }

    let mut candidates = fenced_blocks(&cleaned);
    candidates.extend(marker_blocks(&cleaned));
    candidates.sort_by_key(|c| c.start);

    candidates
        .iter()
        .rev()
        .map(|c| strip_code_fences(c.body))
        .find(|body| body.contains(START_MARKER) && body.contains(END_MARKER))
        .ok_or_else(|| SnippetError::NoValidBlock {
            text: truncate(cleaned.trim(), 200),
        })
}
