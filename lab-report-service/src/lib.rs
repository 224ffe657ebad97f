pub mod alerts;
pub mod audit;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod interactions;
pub mod knowledge;
pub mod llm;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod prompt;
pub mod service;
pub mod tasks;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use config::ServiceConfig;
pub use error::{AnalysisError, ConfigError, ModelCallError, ModelUnavailableKind};
pub use models::*;
pub use pipeline::{AnalysisPipeline, build_analysis_graph};
pub use service::{AppState, build_router, create_app};

/// Install the global subscriber. `LOG_FORMAT=pretty` for development, JSON otherwise.
pub fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lab_report_service=debug,audit=info,tower_http=debug".into());

    match log_format.as_str() {
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}
