use crate::error::{PipelineError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Input to a diagram generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramRequest {
    /// Free-text description of the system to diagram.
    pub description: String,

    /// Diagram kind, e.g. `"Class"` or `"Sequence"`.
    pub diagram_type: String,

    /// Optional styling hint. Rendered as an empty string when absent.
    #[serde(default)]
    pub theme: Option<String>,
}

impl DiagramRequest {
    pub fn new(diagram_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            diagram_type: diagram_type.into(),
            theme: None,
        }
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    /// Reject blank required fields, naming each one.
    pub fn validate(&self) -> Result<()> {
        let missing = missing_fields(&[
            ("description", &self.description),
            ("diagram_type", &self.diagram_type),
        ]);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::InvalidRequest(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Names of the fields whose values are blank, in the given order.
fn missing_fields<'a>(fields: &[(&'a str, &str)]) -> Vec<&'a str> {
    fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect()
}

/// A rendered diagram as returned by the rendering service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl DiagramImage {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            content_type: "image/png".to_string(),
        }
    }

    /// Standard base64 of the image bytes, for JSON transport.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Outcome of a generation. The only value the orchestrator returns.
///
/// Failures surface through an empty `plantuml_code` or an explanatory
/// `status_message`; `image_url` is empty whenever `image` is `None`.
#[derive(Debug, Clone, Serialize)]
pub struct DiagramGenerationResult {
    pub plantuml_code: String,

    #[serde(rename = "image_base64", serialize_with = "image_as_base64")]
    pub image: Option<DiagramImage>,

    pub status_message: String,

    pub image_url: String,
}

impl DiagramGenerationResult {
    /// A result carrying only a status message.
    pub fn status_only(message: impl Into<String>) -> Self {
        Self {
            plantuml_code: String::new(),
            image: None,
            status_message: message.into(),
            image_url: String::new(),
        }
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

fn image_as_base64<S: serde::Serializer>(
    image: &Option<DiagramImage>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match image {
        Some(img) => serializer.serialize_some(&img.to_base64()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_names_every_missing_field() {
        let err = DiagramRequest::new("  ", "").validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid request: Missing required fields: description, diagram_type"
        );
        assert!(DiagramRequest::new("Class", "shop").validate().is_ok());
    }

    #[test]
    fn test_request_theme_defaults_to_none() {
        let req: DiagramRequest =
            serde_json::from_str(r#"{"description":"shop","diagram_type":"Class"}"#).unwrap();
        assert!(req.theme.is_none());
    }

    #[test]
    fn test_image_to_base64() {
        let img = DiagramImage::png(vec![0x89, b'P', b'N', b'G']);
        assert_eq!(img.to_base64(), "iVBORw==");
    }

    #[test]
    fn test_result_serializes_image_as_base64() {
        let result = DiagramGenerationResult {
            plantuml_code: "@startuml\n@enduml".into(),
            image: Some(DiagramImage::png(vec![1, 2, 3])),
            status_message: "ok".into(),
            image_url: "http://h/png/x".into(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["image_base64"], "AQID");
        assert_eq!(json["image_url"], "http://h/png/x");

        let json = serde_json::to_value(DiagramGenerationResult::status_only("nope")).unwrap();
        assert!(json["image_base64"].is_null());
        assert_eq!(json["plantuml_code"], "");
    }
}
