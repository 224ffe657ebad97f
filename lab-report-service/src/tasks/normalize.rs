use async_trait::async_trait;
use graph_flow::{Context, NextAction, Result, Task, TaskResult};

use super::{fail, require, session_keys};
use crate::normalize::normalize;

pub struct NormalizeResponseTask;

#[async_trait]
impl Task for NormalizeResponseTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let raw: String = require(&context, session_keys::RAW_RESPONSE).await?;
        let result = match normalize(&raw) {
            Ok(result) => result,
            Err(e) => return Err(fail(&context, e).await),
        };

        let status = format!(
            "{} tests, {} conditions, overall {:?}",
            result.tests.len(),
            result.identified_conditions.len(),
            result.overall_severity
        );
        context
            .set(session_keys::HAS_MEDICATIONS, !result.medications.is_empty())
            .await;
        context.set(session_keys::RESULT, result).await;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(status),
        ))
    }
}
