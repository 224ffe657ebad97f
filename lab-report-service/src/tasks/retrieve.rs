use std::sync::Arc;

use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use tracing::info;

use super::{Attachments, require, session_keys};
use crate::knowledge::KnowledgeRetriever;

pub struct RetrieveKnowledgeTask {
    retriever: Arc<KnowledgeRetriever>,
    attachments: Arc<Attachments>,
    top_k: usize,
}

impl RetrieveKnowledgeTask {
    pub fn new(
        retriever: Arc<KnowledgeRetriever>,
        attachments: Arc<Attachments>,
        top_k: usize,
    ) -> Self {
        Self {
            retriever,
            attachments,
            top_k,
        }
    }
}

#[async_trait]
impl Task for RetrieveKnowledgeTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let run_id: String = require(&context, session_keys::RUN_ID).await?;
        let payload = self
            .attachments
            .payload(&run_id)
            .ok_or_else(|| GraphError::ContextError(format!("no payload held for run {run_id}")))?;

        let retrieval = self
            .retriever
            .retrieve(&payload.retrieval_query(), self.top_k)
            .await;
        let ids: Vec<&str> = retrieval.chunks.iter().map(|c| c.id.as_str()).collect();
        info!(task_id = %self.id(), chunks = ?ids, scores = ?retrieval.scores, "Knowledge selected");

        let status = format!("{} knowledge chunks selected", retrieval.chunks.len());
        context.set(session_keys::KNOWLEDGE, retrieval.chunks).await;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(status),
        ))
    }
}
