use async_trait::async_trait;
use graph_flow::{Context, NextAction, Result, Task, TaskResult};
use tracing::{info, warn};

use super::{require, session_keys};
use crate::interactions::check_interactions;
use crate::models::AnalysisResult;

/// Screens the medications the model recommended against each other.
pub struct CheckInteractionsTask;

#[async_trait]
impl Task for CheckInteractionsTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let result: AnalysisResult = require(&context, session_keys::RESULT).await?;

        let findings = check_interactions(&result.medications);
        if findings.is_empty() {
            info!(task_id = %self.id(), medications = result.medications.len(), "No interactions found");
        } else {
            warn!(task_id = %self.id(), findings = findings.len(), "Recommended medications interact");
        }

        let status = format!("{} interaction findings", findings.len());
        context.set(session_keys::FINDINGS, findings).await;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(status),
        ))
    }
}
