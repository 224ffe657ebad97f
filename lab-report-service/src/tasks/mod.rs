// Lab report analysis stages, one task per stage
pub mod alerts;
pub mod ingest;
pub mod interactions;
pub mod invoke;
pub mod normalize;
pub mod retrieve;

// Shared modules
pub mod attachments;
pub mod types;

pub use alerts::GenerateAlertsTask;
pub use ingest::IngestDocumentTask;
pub use interactions::CheckInteractionsTask;
pub use invoke::InvokeModelTask;
pub use normalize::NormalizeResponseTask;
pub use retrieve::RetrieveKnowledgeTask;

pub use attachments::{Attachments, Upload};
pub use types::session_keys;

use graph_flow::{Context, GraphError};
use tracing::warn;

use crate::error::AnalysisError;

/// Typed read of a value an earlier task must have written.
pub(crate) async fn require<T: serde::de::DeserializeOwned>(
    context: &Context,
    key: &str,
) -> graph_flow::Result<T> {
    context
        .get(key)
        .await
        .ok_or_else(|| GraphError::ContextError(format!("{key} not found in context")))
}

/// Store the typed error for the pipeline to pick up, and fail the task.
pub(crate) async fn fail(context: &Context, err: AnalysisError) -> GraphError {
    warn!(kind = err.kind(), error = %err, "Analysis stage failed");
    let message = err.to_string();
    context.set(session_keys::FAILURE, err).await;
    GraphError::TaskExecutionFailed(message)
}
