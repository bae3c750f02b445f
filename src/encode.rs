//! Render-URL encoding.
//!
//! The rendering service accepts diagram source as a path token: the UTF-8
//! bytes are raw-deflated, base64-encoded, and then mapped onto the
//! service's own 64-symbol alphabet. The mapping is positional, so
//! [`decode`] simply runs the three steps backwards.

use crate::error::{PipelineError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
const PLANTUML_ALPHABET: &[u8; 64] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_";

/// Placeholder substituted by [`build_url`].
pub const TOKEN_PLACEHOLDER: &str = "{encoded}";

fn translate(input: &str, from: &[u8; 64], to: &[u8; 64]) -> String {
    input
        .bytes()
        .map(|b| match from.iter().position(|&f| f == b) {
            Some(idx) => to[idx] as char,
            None => b as char,
        })
        .collect()
}

/// Encode diagram source into a rendering-service token.
///
/// Deterministic: the same source always yields the same token.
///
/// # Examples
///
/// ```
/// use umlbot::encode::{decode, encode};
///
/// let src = "@startuml\nAlice -> Bob: hi\n@enduml";
/// let token = encode(src).unwrap();
/// assert_eq!(token, encode(src).unwrap());
/// assert_eq!(decode(&token).unwrap(), src);
/// ```
pub fn encode(source: &str) -> Result<String> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(source.as_bytes())?;
    let compressed = encoder.finish()?;
    let b64 = STANDARD.encode(compressed);
    Ok(translate(&b64, BASE64_ALPHABET, PLANTUML_ALPHABET))
}

/// Invert [`encode`].
pub fn decode(token: &str) -> Result<String> {
    let b64 = translate(token, PLANTUML_ALPHABET, BASE64_ALPHABET);
    let compressed = STANDARD
        .decode(b64.as_bytes())
        .map_err(|e| PipelineError::Render(format!("invalid diagram token: {}", e)))?;
    let mut source = String::new();
    DeflateDecoder::new(compressed.as_slice()).read_to_string(&mut source)?;
    Ok(source)
}

/// Build the render URL from a template and an encoded token.
///
/// A template containing `{encoded}` has it replaced; any other template is
/// treated as a base path and the token is appended after a single `/`.
pub fn build_url(template: &str, token: &str) -> String {
    if template.contains(TOKEN_PLACEHOLDER) {
        template.replace(TOKEN_PLACEHOLDER, token)
    } else {
        format!("{}/{}", template.trim_end_matches('/'), token)
    }
}

/// [`encode`] then [`build_url`].
pub fn render_url(template: &str, source: &str) -> Result<String> {
    Ok(build_url(template, &encode(source)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabet_swaps_symbols() {
        assert_eq!(translate("Az09+/", BASE64_ALPHABET, PLANTUML_ALPHABET), "0pqz-_");
        assert_eq!(translate("=", BASE64_ALPHABET, PLANTUML_ALPHABET), "=");
    }

    #[test]
    fn encode_is_url_safe() {
        let token = encode("@startuml\nclass A {\n  +id: int\n}\n@enduml").unwrap();
        assert!(!token.is_empty());
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '='));
    }

    #[test]
    fn encode_round_trips_unicode() {
        let src = "@startuml\nactor Café\nCafé -> Bär : grüß dich\n@enduml";
        assert_eq!(decode(&encode(src).unwrap()).unwrap(), src);
    }

    #[test]
    fn different_sources_differ() {
        assert_ne!(
            encode("@startuml\nA -> B\n@enduml").unwrap(),
            encode("@startuml\nA -> C\n@enduml").unwrap()
        );
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode("!!!").is_err());
    }

    #[test]
    fn build_url_with_placeholder() {
        assert_eq!(
            build_url("http://localhost:8080/png/{encoded}", "abc"),
            "http://localhost:8080/png/abc"
        );
        assert_eq!(
            build_url("http://h/svg/{encoded}?v=1", "abc"),
            "http://h/svg/abc?v=1"
        );
    }

    #[test]
    fn build_url_appends_to_base() {
        assert_eq!(build_url("http://h/png/", "abc"), "http://h/png/abc");
        assert_eq!(build_url("http://h/png", "abc"), "http://h/png/abc");
    }
}
