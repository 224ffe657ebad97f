use std::sync::Arc;

use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use tracing::info;

use super::{Attachments, fail, require, session_keys};
use crate::ingestion::{IngestionRouter, TranscriptionPayload};

pub struct IngestDocumentTask {
    router: Arc<IngestionRouter>,
    attachments: Arc<Attachments>,
}

impl IngestDocumentTask {
    pub fn new(router: Arc<IngestionRouter>, attachments: Arc<Attachments>) -> Self {
        Self {
            router,
            attachments,
        }
    }
}

#[async_trait]
impl Task for IngestDocumentTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let run_id: String = require(&context, session_keys::RUN_ID).await?;
        let upload = self
            .attachments
            .take_upload(&run_id)
            .ok_or_else(|| GraphError::ContextError(format!("no upload held for run {run_id}")))?;
        info!(
            task_id = %self.id(),
            media_type = %upload.media_type,
            bytes = upload.bytes.len(),
            "Ingesting document"
        );

        let payload = match self.router.ingest(&upload.bytes, &upload.media_type).await {
            Ok(payload) => payload,
            Err(e) => return Err(fail(&context, e).await),
        };
        let status = match &payload {
            TranscriptionPayload::Image { mime_type, .. } => format!("image payload ({mime_type})"),
            TranscriptionPayload::Text { text, .. } => {
                format!("text payload ({} chars)", text.chars().count())
            }
        };
        self.attachments.put_payload(&run_id, payload);

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(status),
        ))
    }
}
