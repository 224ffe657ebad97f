use std::sync::Arc;

use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use tracing::info;

use super::{Attachments, fail, require, session_keys};
use crate::llm::ModelResolver;
use crate::models::KnowledgeChunk;
use crate::prompt;

/// Assembles the prompt from the ingested payload and the selected knowledge, then calls the
/// model through the resolver's fallback chain.
pub struct InvokeModelTask {
    resolver: Arc<ModelResolver>,
    attachments: Arc<Attachments>,
    max_tokens: u32,
}

impl InvokeModelTask {
    pub fn new(resolver: Arc<ModelResolver>, attachments: Arc<Attachments>, max_tokens: u32) -> Self {
        Self {
            resolver,
            attachments,
            max_tokens,
        }
    }
}

#[async_trait]
impl Task for InvokeModelTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let run_id: String = require(&context, session_keys::RUN_ID).await?;
        let payload = self
            .attachments
            .payload(&run_id)
            .ok_or_else(|| GraphError::ContextError(format!("no payload held for run {run_id}")))?;
        let knowledge: Vec<KnowledgeChunk> =
            context.get(session_keys::KNOWLEDGE).await.unwrap_or_default();

        let request = prompt::assemble(&payload, &knowledge, self.max_tokens);
        info!(task_id = %self.id(), multimodal = request.has_image(), "Invoking analysis model");

        let reply = match self.resolver.invoke_with_fallback(&request).await {
            Ok(reply) => reply,
            Err(e) => return Err(fail(&context, e).await),
        };
        let status = format!("analysed by {} ({} chars)", reply.model, reply.text.len());

        context.set(session_keys::MODEL_USED, &reply.model).await;
        context.set(session_keys::RAW_RESPONSE, reply.text).await;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(status),
        ))
    }
}
