use async_trait::async_trait;
use chrono::{DateTime, Utc};
use graph_flow::{Context, NextAction, Result, Task, TaskResult};

use super::{require, session_keys};
use crate::alerts::{generate_alerts_at, interaction_alerts_at};
use crate::models::{AnalysisResult, InteractionFinding};

pub struct GenerateAlertsTask;

#[async_trait]
impl Task for GenerateAlertsTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let result: AnalysisResult = require(&context, session_keys::RESULT).await?;
        let findings: Vec<InteractionFinding> =
            context.get(session_keys::FINDINGS).await.unwrap_or_default();
        let at: DateTime<Utc> = context
            .get(session_keys::GENERATED_AT)
            .await
            .unwrap_or_else(Utc::now);

        let mut alerts = generate_alerts_at(
            &result.tests,
            &result.identified_conditions,
            result.overall_severity,
            at,
        );
        alerts.extend(interaction_alerts_at(&findings, at));
        alerts.sort_by(|a, b| b.severity.cmp(&a.severity));

        let status = format!("{} alerts generated", alerts.len());
        context.set(session_keys::ALERTS, alerts).await;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::End,
            Some(status),
        ))
    }
}
