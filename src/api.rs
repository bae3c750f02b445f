//! Framework-agnostic request handling for a JSON HTTP surface.
//!
//! Each handler takes the raw request body and returns an [`ApiResponse`]
//! (status code plus JSON body), so it can sit behind any web framework.
//! Missing required fields are rejected here and never reach the pipeline.

use crate::error::PipelineError;
use crate::generator::DiagramGenerator;
use crate::types::{DiagramGenerationResult, DiagramRequest};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, warn};

/// Body of `POST /api/generate`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateRequest {
    pub description: Option<String>,
    pub diagram_type: Option<String>,
    pub theme: Option<String>,
}

impl GenerateRequest {
    /// Convert into a pipeline request, naming every blank required field.
    pub fn into_diagram_request(self) -> Result<DiagramRequest, PipelineError> {
        let request = DiagramRequest {
            description: self.description.unwrap_or_default(),
            diagram_type: self.diagram_type.unwrap_or_default(),
            theme: self.theme.filter(|t| !t.trim().is_empty()),
        };
        request.validate()?;
        Ok(request)
    }
}

/// Body of `POST /api/render`. `code` is accepted as an alias.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderRequest {
    pub plantuml_code: Option<String>,
    pub code: Option<String>,
}

impl RenderRequest {
    pub fn source(&self) -> Option<&str> {
        [&self.plantuml_code, &self.code]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.trim().is_empty())
    }
}

/// HTTP status plus JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "status": "error", "message": message.into() }),
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiResponse> {
    serde_json::from_str(body).map_err(|e| {
        warn!(error = %e, "rejecting malformed request body");
        ApiResponse::error(400, format!("Invalid JSON body: {}", e))
    })
}

fn image_fields(result: &DiagramGenerationResult) -> (Option<String>, &str, &str) {
    (
        result.image.as_ref().map(|img| img.to_base64()),
        result.image_url.as_str(),
        result.status_message.as_str(),
    )
}

/// Handle `POST /api/generate`.
///
/// 400 on missing fields, 500 when no diagram source was produced, else 200
/// with `plantuml_code`, `image_base64`, `image_url` and `message`.
pub async fn handle_generate(generator: &DiagramGenerator, body: &str) -> ApiResponse {
    let request = match parse_body::<GenerateRequest>(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let request = match request.into_diagram_request() {
        Ok(r) => r,
        Err(PipelineError::InvalidRequest(msg)) => return ApiResponse::error(400, msg),
        Err(other) => return ApiResponse::error(400, other.to_string()),
    };

    let result = generator.generate(&request).await;
    if result.plantuml_code.is_empty() {
        error!(status = %result.status_message, "generation produced no diagram");
        let message = if result.status_message.is_empty() {
            "Generation failed".to_string()
        } else {
            result.status_message
        };
        return ApiResponse::error(500, message);
    }

    let (image_base64, image_url, message) = image_fields(&result);
    ApiResponse::ok(json!({
        "status": "ok",
        "plantuml_code": &result.plantuml_code,
        "image_base64": image_base64,
        "image_url": image_url,
        "message": message,
    }))
}

/// Handle `POST /api/render`: re-render client-edited source.
pub async fn handle_render(generator: &DiagramGenerator, body: &str) -> ApiResponse {
    let request = match parse_body::<RenderRequest>(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let Some(code) = request.source() else {
        return ApiResponse::error(400, "Missing required field: plantuml_code");
    };

    let result = generator.rerender(code).await;
    let (image_base64, image_url, message) = image_fields(&result);
    ApiResponse::ok(json!({
        "status": "ok",
        "image_base64": image_base64,
        "image_url": image_url,
        "message": message,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiagramConfig;
    use crate::error::Result;
    use crate::llm::LlmAdapter;
    use crate::render::Renderer;
    use crate::retry::no_sleep;
    use crate::types::DiagramImage;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct PngRenderer;

    #[async_trait]
    impl Renderer for PngRenderer {
        async fn fetch(&self, _url: &str) -> Result<DiagramImage> {
            Ok(DiagramImage::png(vec![1, 2, 3]))
        }
    }

    fn generator(api_key: &str) -> DiagramGenerator {
        let config = DiagramConfig {
            api_key: api_key.into(),
            ..DiagramConfig::default()
        };
        DiagramGenerator::builder(Arc::new(config))
            .llm(Arc::new(LlmAdapter::from_fn(|_| {
                Ok("@startuml\nclass Shop\n@enduml".to_string())
            })))
            .renderer(Arc::new(PngRenderer))
            .sleeper(no_sleep())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_generate_ok() {
        let resp = handle_generate(
            &generator("sk-test"),
            r#"{"description":"shop","diagram_type":"Class"}"#,
        )
        .await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body["status"], "ok");
        assert_eq!(resp.body["plantuml_code"], "@startuml\nclass Shop\n@enduml");
        assert_eq!(resp.body["image_base64"], "AQID");
        assert_eq!(resp.body["message"], crate::config::SUCCESS_MESSAGE);
    }

    #[tokio::test]
    async fn test_generate_missing_fields() {
        let resp = handle_generate(&generator("sk-test"), r#"{"description":"shop"}"#).await;
        assert_eq!(resp.status, 400);
        assert_eq!(
            resp.body,
            json!({
                "status": "error",
                "message": "Missing required fields: diagram_type"
            })
        );
    }

    #[tokio::test]
    async fn test_generate_names_every_blank_field() {
        let resp = handle_generate(
            &generator("sk-test"),
            r#"{"description":"  ","diagram_type":""}"#,
        )
        .await;
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body["message"], "Missing required fields: description, diagram_type");
    }

    #[tokio::test]
    async fn test_generate_without_credentials_is_500() {
        let resp = handle_generate(
            &generator(""),
            r#"{"description":"shop","diagram_type":"Class"}"#,
        )
        .await;
        assert_eq!(resp.status, 500);
        assert_eq!(resp.body["message"], crate::config::MISSING_CREDENTIALS_MESSAGE);
    }

    #[tokio::test]
    async fn test_generate_malformed_json() {
        let resp = handle_generate(&generator("sk-test"), "{not json").await;
        assert_eq!(resp.status, 400);
        assert!(resp.body["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid JSON body"));
    }

    #[tokio::test]
    async fn test_render_accepts_code_alias() {
        let resp = handle_render(
            &generator(""),
            r#"{"code":"@startuml\nA -> B\n@enduml"}"#,
        )
        .await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body["message"], crate::generator::RERENDER_MESSAGE);
        assert!(resp.body["image_url"]
            .as_str()
            .unwrap()
            .starts_with("http://localhost:8080/png/"));
    }

    #[tokio::test]
    async fn test_render_missing_code() {
        let resp = handle_render(&generator(""), r#"{"plantuml_code":"  "}"#).await;
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body["message"], "Missing required field: plantuml_code");
    }
}
