//! Example: generate a diagram against a live OpenAI-compatible endpoint.
//!
//! Needs `UMLBOT_LLM_API_KEY`, `UMLBOT_LLM_API_BASE` and a PlantUML server
//! (default `http://localhost:8080`).
//!
//! Run with: `cargo run --example generate_diagram -- "Class" "An online bookstore"`

use std::sync::Arc;
use umlbot::{DiagramConfig, DiagramGenerator, DiagramRequest};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    let diagram_type = args.next().unwrap_or_else(|| "Class".to_string());
    let description = args
        .next()
        .unwrap_or_else(|| "An online bookstore with customers, orders and books".to_string());

    let config = Arc::new(DiagramConfig::from_env()?);
    let generator = DiagramGenerator::builder(config).build()?;

    let result = generator
        .generate(&DiagramRequest::new(diagram_type, description))
        .await;

    println!("Status: {}", result.status_message);
    println!("\n{}\n", result.plantuml_code);
    match &result.image {
        Some(image) => {
            std::fs::write("diagram.png", &image.bytes)?;
            println!("Saved diagram.png ({} bytes) from {}", image.bytes.len(), result.image_url);
        }
        None => println!("No image rendered."),
    }

    Ok(())
}
