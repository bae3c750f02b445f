//! Brace normalization for PlantUML source.

/// Collapse every run of `{` into one `{` and every run of `}` into one `}`.
///
/// PlantUML containers use single braces; models sometimes emit `{{ … }}`,
/// which the renderer rejects. Idempotent.
///
/// # Examples
///
/// ```
/// use umlbot::snippet::normalize_braces;
///
/// assert_eq!(normalize_braces("package A {{\n}}"), "package A {\n}");
/// assert_eq!(normalize_braces("{{{x}}}"), "{x}");
/// ```
pub fn normalize_braces(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut prev: Option<char> = None;
    for ch in source.chars() {
        if (ch == '{' || ch == '}') && prev == Some(ch) {
            continue;
        }
        out.push(ch);
        prev = Some(ch);
    }
    out
}
