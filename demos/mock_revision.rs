//! Example: the conversational revision flow with a scripted backend.
//!
//! No model or PlantUML server is needed; rendering failures are reported
//! in the status message instead of aborting.
//!
//! Run with: `cargo run --example mock_revision`

use std::sync::Arc;
use umlbot::retry::no_sleep;
use umlbot::{BackendLlm, DiagramConfig, DiagramGenerator, DiagramRequest, Event, FnEventHandler, MockBackend};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    // First reply fails, then a first draft, then a chatty revision.
    let mock = MockBackend::new(vec![
        Err("rate limited".to_string()),
        Ok("```plantuml\n@startuml\nclass Customer\nclass Order\n@enduml\n```".to_string()),
        Ok("Here is the update:\n```plantuml\n@startuml\nclass Customer\nclass Order {{\n +total: Money\n}}\n\
            Customer \"1\" --> \"*\" Order\n@enduml\n```\nLet me know if you need more."
            .to_string()),
    ]);

    let config = Arc::new(DiagramConfig {
        api_key: "mock".into(),
        ..DiagramConfig::default()
    });
    let generator = DiagramGenerator::builder(config)
        .llm(Arc::new(BackendLlm::new(Arc::new(mock), "http://unused", "mock")))
        .sleeper(no_sleep())
        .event_handler(Arc::new(FnEventHandler(|event: Event| {
            if let Event::AttemptFailed { attempt, reason } = event {
                println!("[attempt {} failed] {}", attempt, reason);
            }
        })))
        .build()?;

    let first = generator
        .generate(&DiagramRequest::new("Class", "Customers place orders"))
        .await;
    println!("Status: {}\n{}\n", first.status_message, first.plantuml_code);

    let revised = generator
        .revise_or_keep("Class", &first.plantuml_code, "Give Order a total and link it to Customer")
        .await;
    println!("Status: {}\n{}", revised.status_message, revised.plantuml_code);

    Ok(())
}
