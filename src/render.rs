//! Rendering-service client.
//!
//! The orchestrator only needs "URL in, PNG out", so the HTTP call sits
//! behind the [`Renderer`] capability and tests can swap it out.

use crate::error::{PipelineError, Result};
use crate::types::DiagramImage;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Fetches a rendered diagram from a fully-built render URL.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<DiagramImage>;
}

/// GETs the render URL and accepts only `image/png` bodies.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: Client,
    timeout: Duration,
}

impl HttpRenderer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    /// Share a connection pool with other callers.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

impl Default for HttpRenderer {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn fetch(&self, url: &str) -> Result<DiagramImage> {
        let resp = self.client.get(url).timeout(self.timeout).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.starts_with("image/png") {
            return Err(PipelineError::UnexpectedContentType(content_type));
        }

        let bytes = resp.bytes().await?.to_vec();
        debug!(url, size = bytes.len(), "fetched rendered diagram");
        Ok(DiagramImage {
            bytes,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response per connection; returns the base URL.
    async fn serve(status: &'static str, content_type: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    content_type,
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(body).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_fetch_png() {
        let base = serve("200 OK", "image/png", b"\x89PNG\r\n").await;
        let image = HttpRenderer::default()
            .fetch(&format!("{}/png/abc", base))
            .await
            .unwrap();
        assert_eq!(image.bytes, b"\x89PNG\r\n");
        assert_eq!(image.content_type, "image/png");
    }

    #[tokio::test]
    async fn test_fetch_server_error() {
        let base = serve("500 Internal Server Error", "text/plain", b"syntax error").await;
        let err = HttpRenderer::default()
            .fetch(&format!("{}/png/abc", base))
            .await
            .unwrap_err();
        match err {
            PipelineError::HttpError { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "syntax error");
            }
            other => panic!("expected HttpError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_wrong_content_type() {
        let base = serve("200 OK", "text/html; charset=utf-8", b"<html></html>").await;
        let err = HttpRenderer::default()
            .fetch(&format!("{}/png/abc", base))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnexpectedContentType(ref ct) if ct.starts_with("text/html")));
        assert_eq!(err.kind(), "RenderError");
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = HttpRenderer::new(Duration::from_secs(2))
            .fetch(&format!("http://{}/png/abc", addr))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Request(_)));
    }
}
