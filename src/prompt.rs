//! Prompt templates with placeholder validation and brace-safe rendering.
//!
//! Two placeholder syntaxes are recognised and validated independently:
//!
//! - single-brace interpolation: `{name}`
//! - double-brace tags: `{{ name }}` plus `{% if name %}…{% else %}…{% endif %}` blocks
//!
//! A [`PromptTemplate`] is validated once when constructed and is read-only
//! afterwards, so it can be shared across concurrent generations behind an `Arc`.

use crate::error::{PipelineError, Result};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Placeholders every diagram prompt must reference.
pub const REQUIRED_PLACEHOLDERS: [&str; 2] = ["diagram_type", "description"];

/// Optional placeholder that must be well-formed if mentioned at all.
pub const OPTIONAL_THEME: &str = "theme";

/// Prompt used when no template file is configured.
pub const DEFAULT_TEMPLATE: &str = "You are an expert software architect who writes PlantUML.\n\
Convert the following description into a PlantUML {diagram_type} diagram.\n\
Description:\n{description}\n\
Optional PlantUML theme to apply with !theme (leave out if empty): {theme}\n\
Return only the PlantUML source, starting with @startuml and ending with @enduml.";

/// Double every `{` and `}` so a value cannot be read as template syntax.
///
/// # Examples
///
/// ```
/// use umlbot::prompt::escape_braces;
///
/// assert_eq!(escape_braces("skinparam {"), "skinparam {{");
/// assert_eq!(escape_braces("a}b"), "a}}b");
/// ```
pub fn escape_braces(value: &str) -> String {
    value.replace('{', "{{").replace('}', "}}")
}

/// Named values substituted into a [`PromptTemplate`].
///
/// Values are opaque strings; braces inside them are escaped at render time.
#[derive(Debug, Clone, Default)]
pub struct RenderVariables {
    values: HashMap<String, String>,
}

impl RenderVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard variable set for a diagram request. A missing theme
    /// renders as an empty string.
    pub fn for_diagram(diagram_type: &str, description: &str, theme: Option<&str>) -> Self {
        Self::new()
            .insert("diagram_type", diagram_type)
            .insert("description", description)
            .insert(OPTIONAL_THEME, theme.unwrap_or(""))
    }

    pub fn insert(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    fn is_truthy(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !v.is_empty())
    }
}

/// A validated, immutable prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    source: String,
    placeholders: BTreeSet<String>,
}

impl PromptTemplate {
    /// Validate `source` and wrap it.
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let placeholders = Self::validate(&source)?;
        Ok(Self {
            source,
            placeholders,
        })
    }

    /// The built-in diagram prompt.
    pub fn default_uml() -> Self {
        Self {
            source: DEFAULT_TEMPLATE.to_string(),
            placeholders: ["diagram_type", "description", "theme"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Read a template file and validate it.
    ///
    /// A leading `---` front-matter block (as in `.prompty` files) is skipped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Template(format!(
                "Failed to load template {}: {}",
                path.display(),
                e
            ))
        })?;
        tracing::debug!(path = %path.display(), bytes = text.len(), "loaded prompt template");
        Self::new(strip_front_matter(&text))
    }

    /// Raw template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder names found in either syntax.
    pub fn placeholders(&self) -> &BTreeSet<String> {
        &self.placeholders
    }

    /// Check placeholder syntax and required names. Returns every placeholder
    /// name found.
    ///
    /// Double-brace and block regions are removed before the single-brace
    /// scan so valid tags are never reported as malformed placeholders.
    pub fn validate(template: &str) -> Result<BTreeSet<String>> {
        let scan = scan_tags(template);
        let mut malformed = Vec::new();

        if scan.unclosed {
            malformed.push("Unclosed double-brace or block tag");
        }
        if template.matches("{{").count() != template.matches("}}").count() {
            malformed.push("Unbalanced double-brace variable tags");
        }
        if template.matches("{%").count() != template.matches("%}").count() {
            malformed.push("Unbalanced block tags");
        }

        let single = scan_single_brace(&scan.remainder);
        if single.empty {
            malformed.push("Empty placeholder");
        }
        if single.bad_name {
            malformed.push("Placeholder name must start with a letter or underscore");
        }
        if scan.remainder.matches('{').count() != scan.remainder.matches('}').count() {
            malformed.push("Unbalanced curly braces in single-brace section");
        }

        if !malformed.is_empty() {
            return Err(PipelineError::Template(format!(
                "Malformed placeholder(s) found: {}",
                malformed.join("; ")
            )));
        }

        let mut found = scan.variables;
        found.extend(single.names);

        let missing: Vec<&str> = REQUIRED_PLACEHOLDERS
            .iter()
            .copied()
            .filter(|name| !found.contains(*name))
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::Template(format!(
                "Missing required placeholder(s): {}",
                missing.join(", ")
            )));
        }

        if template.contains(OPTIONAL_THEME) && !found.contains(OPTIONAL_THEME) {
            return Err(PipelineError::Template(
                "Template references 'theme' but does not use a valid '{theme}' or '{{ theme }}' placeholder"
                    .to_string(),
            ));
        }

        Ok(found)
    }

    /// Substitute variables. Every value has its braces escaped first.
    pub fn render(&self, vars: &RenderVariables) -> Result<String> {
        let tokens = tokenize(&self.source)?;
        let mut out = String::with_capacity(self.source.len());
        // One frame per open `{% if %}`: (branch active, parent active).
        let mut frames: Vec<(bool, bool)> = Vec::new();
        let active = |frames: &[(bool, bool)]| frames.last().map_or(true, |f| f.0 && f.1);

        for token in tokens {
            match token {
                Token::Text(text) => {
                    if active(&frames) {
                        out.push_str(&text);
                    }
                }
                Token::Var(name) => {
                    if !active(&frames) {
                        continue;
                    }
                    let value = vars.get(&name).ok_or_else(|| {
                        PipelineError::Template(format!(
                            "Missing variable for rendering: '{}'",
                            name
                        ))
                    })?;
                    out.push_str(&escape_braces(value));
                }
                Token::Block(block) => {
                    let words: Vec<&str> = block.split_whitespace().collect();
                    match words.as_slice() {
                        ["if", name] => {
                            let parent = active(&frames);
                            frames.push((vars.is_truthy(name), parent));
                        }
                        ["if", "not", name] => {
                            let parent = active(&frames);
                            frames.push((!vars.is_truthy(name), parent));
                        }
                        ["else"] => match frames.last_mut() {
                            Some(frame) => frame.0 = !frame.0,
                            None => {
                                return Err(PipelineError::Template(
                                    "'{% else %}' without matching '{% if %}'".to_string(),
                                ))
                            }
                        },
                        ["endif"] => {
                            if frames.pop().is_none() {
                                return Err(PipelineError::Template(
                                    "'{% endif %}' without matching '{% if %}'".to_string(),
                                ));
                            }
                        }
                        _ => {
                            return Err(PipelineError::Template(format!(
                                "Unsupported block tag: '{{% {} %}}'",
                                block
                            )))
                        }
                    }
                }
            }
        }

        if !frames.is_empty() {
            return Err(PipelineError::Template(
                "'{% if %}' block is missing '{% endif %}'".to_string(),
            ));
        }
        Ok(out)
    }
}

fn strip_front_matter(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("---") else {
        return text;
    };
    match rest.find("\n---") {
        Some(end) => {
            let body = &rest[end + 4..];
            body.strip_prefix('\n')
                .or_else(|| body.strip_prefix("\r\n"))
                .unwrap_or(body)
        }
        None => text,
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

struct TagScan {
    remainder: String,
    variables: BTreeSet<String>,
    unclosed: bool,
}

/// Pull out `{{ … }}` and `{% … %}` regions, recording variable names.
fn scan_tags(template: &str) -> TagScan {
    let mut remainder = String::with_capacity(template.len());
    let mut variables = BTreeSet::new();
    let mut unclosed = false;
    let mut i = 0;

    while i < template.len() {
        let rest = &template[i..];
        let close = if rest.starts_with("{{") {
            Some("}}")
        } else if rest.starts_with("{%") {
            Some("%}")
        } else {
            None
        };

        match close {
            Some(close) => match rest[2..].find(close) {
                Some(end) => {
                    let inner = rest[2..2 + end].trim();
                    if close == "}}" && is_identifier(inner) {
                        variables.insert(inner.to_string());
                    }
                    i += 2 + end + 2;
                }
                None => {
                    unclosed = true;
                    remainder.push_str(rest);
                    break;
                }
            },
            None => {
                let ch = rest.chars().next().unwrap_or_default();
                remainder.push(ch);
                i += ch.len_utf8();
            }
        }
    }

    TagScan {
        remainder,
        variables,
        unclosed,
    }
}

#[derive(Default)]
struct SingleScan {
    names: BTreeSet<String>,
    empty: bool,
    bad_name: bool,
}

fn scan_single_brace(text: &str) -> SingleScan {
    let mut scan = SingleScan::default();
    let mut from = 0;
    while let Some(offset) = text[from..].find('{') {
        let open = from + offset;
        let Some(len) = text[open + 1..].find('}') else {
            break;
        };
        let inner = &text[open + 1..open + 1 + len];
        if inner.trim().is_empty() {
            scan.empty = true;
        } else if !inner.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
            scan.bad_name = true;
        } else if is_identifier(inner) {
            scan.names.insert(inner.to_string());
        }
        from = open + 1;
    }
    scan
}

#[derive(Debug, PartialEq)]
enum Token {
    Text(String),
    Var(String),
    Block(String),
}

fn tokenize(template: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    let flush = |text: &mut String, tokens: &mut Vec<Token>| {
        if !text.is_empty() {
            tokens.push(Token::Text(std::mem::take(text)));
        }
    };

    while i < template.len() {
        let rest = &template[i..];
        if rest.starts_with("{%") {
            let end = rest[2..].find("%}").ok_or_else(|| {
                PipelineError::Template("Unclosed block tag '{%'".to_string())
            })?;
            flush(&mut text, &mut tokens);
            tokens.push(Token::Block(rest[2..2 + end].trim().to_string()));
            i += 2 + end + 2;
        } else if rest.starts_with("{{") {
            match rest[2..].find("}}") {
                Some(end) if is_identifier(rest[2..2 + end].trim()) => {
                    flush(&mut text, &mut tokens);
                    tokens.push(Token::Var(rest[2..2 + end].trim().to_string()));
                    i += 2 + end + 2;
                }
                _ => {
                    text.push('{');
                    i += 2;
                }
            }
        } else if rest.starts_with("}}") {
            text.push('}');
            i += 2;
        } else if rest.starts_with('{') {
            let end = rest[1..].find('}').ok_or_else(|| {
                PipelineError::Template("Single '{' encountered in template".to_string())
            })?;
            let name = &rest[1..1 + end];
            if !is_identifier(name) {
                return Err(PipelineError::Template(format!(
                    "Invalid placeholder '{{{}}}'",
                    name
                )));
            }
            flush(&mut text, &mut tokens);
            tokens.push(Token::Var(name.to_string()));
            i += 1 + end + 1;
        } else if rest.starts_with('}') {
            return Err(PipelineError::Template(
                "Single '}' encountered in template".to_string(),
            ));
        } else {
            let ch = rest.chars().next().unwrap_or_default();
            text.push(ch);
            i += ch.len_utf8();
        }
    }
    flush(&mut text, &mut tokens);
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template_error(result: Result<BTreeSet<String>>) -> String {
        match result {
            Err(PipelineError::Template(msg)) => msg,
            other => panic!("expected template error, got {:?}", other),
        }
    }

    #[test]
    fn test_render_basic() {
        let template = PromptTemplate::new("Diagram: {diagram_type}, Desc: {description}").unwrap();
        let vars = RenderVariables::new()
            .insert("diagram_type", "Class")
            .insert("description", "shop system");
        assert_eq!(
            template.render(&vars).unwrap(),
            "Diagram: Class, Desc: shop system"
        );
    }

    #[test]
    fn test_render_escapes_value_braces() {
        let template = PromptTemplate::new("{diagram_type}: {description}").unwrap();
        let vars = RenderVariables::for_diagram(
            "class",
            "@startuml\nskinparam {\n  BackgroundColor #EEEBDC\n}\n@enduml",
            None,
        );
        let prompt = template.render(&vars).unwrap();
        assert!(prompt.contains("skinparam {{"));
        assert!(prompt.contains("}}\n@enduml"));
    }

    #[test]
    fn test_render_literal_escaped_braces() {
        let template =
            PromptTemplate::new("{diagram_type} {description} as {{\"key\": \"val\"}}").unwrap();
        let vars = RenderVariables::for_diagram("Class", "shop", None);
        assert_eq!(
            template.render(&vars).unwrap(),
            r#"Class shop as {"key": "val"}"#
        );
    }

    #[test]
    fn test_render_missing_variable() {
        let template = PromptTemplate::new("{diagram_type} {description}").unwrap();
        let vars = RenderVariables::new().insert("diagram_type", "Class");
        let err = template.render(&vars).unwrap_err();
        assert!(err.to_string().contains("description"));
    }

    #[test]
    fn test_render_double_brace_with_conditional() {
        let template = PromptTemplate::new(
            "Generate a {{ diagram_type }} diagram for: {{ description }}{% if theme %} Theme: {{ theme }}{% endif %}",
        )
        .unwrap();

        let with_theme = RenderVariables::for_diagram("Class", "shop", Some("bluegray"));
        assert_eq!(
            template.render(&with_theme).unwrap(),
            "Generate a Class diagram for: shop Theme: bluegray"
        );

        let without = RenderVariables::for_diagram("Class", "shop", None);
        assert_eq!(
            template.render(&without).unwrap(),
            "Generate a Class diagram for: shop"
        );
    }

    #[test]
    fn test_render_else_branch() {
        let template = PromptTemplate::new(
            "{{ diagram_type }} {{ description }}{% if theme %}!theme {{ theme }}{% else %}default{% endif %}",
        )
        .unwrap();
        let vars = RenderVariables::for_diagram("Class", "shop", None);
        assert_eq!(template.render(&vars).unwrap(), "Class shopdefault");
    }

    #[test]
    fn test_render_unsupported_block() {
        let template =
            PromptTemplate::new("{{ diagram_type }} {{ description }} {% for x in y %}").unwrap();
        let vars = RenderVariables::for_diagram("Class", "shop", None);
        assert!(template.render(&vars).is_err());
    }

    #[test]
    fn test_validate_missing_both_required() {
        let msg = template_error(PromptTemplate::validate("Generate a {theme} diagram"));
        assert!(msg.contains("diagram_type"));
        assert!(msg.contains("description"));
    }

    #[test]
    fn test_validate_missing_one_in_tag_syntax() {
        let msg = template_error(PromptTemplate::validate("A {{ diagram_type }} diagram"));
        assert!(msg.contains("description"));
        assert!(!msg.contains("diagram_type"));
    }

    #[test]
    fn test_validate_mixed_syntax_passes() {
        let found = PromptTemplate::validate("{diagram_type} and {{ description }}").unwrap();
        assert!(found.contains("diagram_type"));
        assert!(found.contains("description"));
    }

    #[test]
    fn test_validate_malformed_name() {
        let msg = template_error(PromptTemplate::validate(
            "Generate a {123bad} diagram for: {description}",
        ));
        assert!(msg.contains("Malformed"));
    }

    #[test]
    fn test_validate_empty_placeholder() {
        let msg = template_error(PromptTemplate::validate(
            "{diagram_type} {description} {}",
        ));
        assert!(msg.contains("Empty placeholder"));
    }

    #[test]
    fn test_validate_unbalanced_single_brace() {
        let msg = template_error(PromptTemplate::validate("{diagram_type} {description"));
        assert!(msg.contains("Unbalanced"));
    }

    #[test]
    fn test_validate_unclosed_tag() {
        let msg = template_error(PromptTemplate::validate(
            "{diagram_type} {description} {{ theme",
        ));
        assert!(msg.contains("Unclosed"));
    }

    #[test]
    fn test_validate_blocks_not_flagged_as_single_brace() {
        let template = "{{ diagram_type }} {{ description }} {% if theme %}{{ theme }}{% endif %}";
        assert!(PromptTemplate::validate(template).is_ok());
    }

    #[test]
    fn test_validate_theme_mentioned_without_placeholder() {
        let msg = template_error(PromptTemplate::validate(
            "Draw a {diagram_type} of {description} using the theme bluegray",
        ));
        assert!(msg.contains("theme"));
    }

    #[test]
    fn test_default_template_renders() {
        let template = PromptTemplate::default_uml();
        assert!(PromptTemplate::validate(template.source()).is_ok());
        let prompt = template
            .render(&RenderVariables::for_diagram("Sequence", "login flow", None))
            .unwrap();
        assert!(prompt.contains("PlantUML Sequence diagram"));
        assert!(prompt.contains("login flow"));
    }

    #[test]
    fn test_load_strips_front_matter() {
        let dir = std::env::temp_dir().join(format!("umlbot-prompt-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("uml_diagram.prompty");
        std::fs::write(
            &path,
            "---\nname: uml\nmodel: gpt\n---\nDraw {diagram_type} for {description}",
        )
        .unwrap();
        let template = PromptTemplate::load(&path).unwrap();
        assert_eq!(template.source(), "Draw {diagram_type} for {description}");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_missing_file() {
        let err = PromptTemplate::load("/definitely/not/here.prompty").unwrap_err();
        assert!(matches!(err, PipelineError::Template(_)));
    }
}
