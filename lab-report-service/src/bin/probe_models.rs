//! Probe the configured model candidates once and report which one answers.

use std::sync::Arc;

use lab_report_service::llm::{ModelResolver, OpenRouterClient};
use lab_report_service::{ServiceConfig, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ServiceConfig::from_env()?;
    let client = Arc::new(OpenRouterClient::new(&config)?);
    let resolver = ModelResolver::new(client, config.model_candidates.clone(), config.model_timeout);

    let outcome = resolver.resolve().await;

    for candidate in resolver.candidates() {
        let marker = if candidate.last_known_working { "*" } else { " " };
        println!("{marker} {}", candidate.identifier);
    }

    match outcome {
        Ok(model) => {
            println!("working model: {model}");
            Ok(())
        }
        Err(e) => {
            eprintln!("no working model ({}): {e}", e.kind());
            std::process::exit(1);
        }
    }
}
