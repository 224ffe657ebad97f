use std::sync::Arc;

use chrono::Utc;
use graph_flow::{ExecutionStatus, Graph, GraphBuilder, Session, Task};
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::audit::{
    ACTION_CREATE, AccessRecord, AuditSink, RESOURCE_LAB_REPORT_ANALYSIS, TracingAuditSink,
};
use crate::config::ServiceConfig;
use crate::error::{AnalysisError, ConfigError};
use crate::ingestion::{IngestionRouter, PdfiumTextExtractor, TextExtractor};
use crate::interactions;
use crate::knowledge::{KnowledgeRetriever, KnowledgeStore};
use crate::llm::{GenerativeModel, ModelResolver, OpenRouterClient};
use crate::models::{
    Alert, AnalysisOutcome, AnalysisResult, InteractionFinding, Medication, RequestContext,
};
use crate::tasks::*;

/// Wire the analysis stages into a graph and return it with the id of its first task.
/// Interaction screening only runs when the model recommended structured medications.
pub fn build_analysis_graph(
    router: Arc<IngestionRouter>,
    retriever: Arc<KnowledgeRetriever>,
    resolver: Arc<ModelResolver>,
    attachments: Arc<Attachments>,
    config: &ServiceConfig,
) -> (Graph, String) {
    let ingest_task: Arc<dyn Task> =
        Arc::new(IngestDocumentTask::new(router, attachments.clone()));
    let ingest_id = ingest_task.id().to_string();

    let retrieve_task: Arc<dyn Task> = Arc::new(RetrieveKnowledgeTask::new(
        retriever,
        attachments.clone(),
        config.knowledge_top_k,
    ));
    let retrieve_id = retrieve_task.id().to_string();

    let invoke_task: Arc<dyn Task> =
        Arc::new(InvokeModelTask::new(resolver, attachments, config.max_tokens));
    let invoke_id = invoke_task.id().to_string();

    let normalize_task: Arc<dyn Task> = Arc::new(NormalizeResponseTask);
    let normalize_id = normalize_task.id().to_string();

    let interactions_task: Arc<dyn Task> = Arc::new(CheckInteractionsTask);
    let interactions_id = interactions_task.id().to_string();

    let alerts_task: Arc<dyn Task> = Arc::new(GenerateAlertsTask);
    let alerts_id = alerts_task.id().to_string();

    let graph = GraphBuilder::new("lab_report_analysis")
        .add_task(ingest_task)
        .add_task(retrieve_task)
        .add_task(invoke_task)
        .add_task(normalize_task)
        .add_task(interactions_task)
        .add_task(alerts_task)
        .add_edge(ingest_id.clone(), retrieve_id.clone())
        .add_edge(retrieve_id, invoke_id.clone())
        .add_edge(invoke_id, normalize_id.clone())
        .add_conditional_edge(
            normalize_id,
            |context| {
                context
                    .get_sync::<bool>(session_keys::HAS_MEDICATIONS)
                    .unwrap_or(false)
            },
            interactions_id.clone(),
            alerts_id.clone(),
        )
        .add_edge(interactions_id, alerts_id)
        .build();

    (graph, ingest_id)
}

/// Entry point of the lab report analysis core.
pub struct AnalysisPipeline {
    graph: Arc<Graph>,
    start_task_id: String,
    attachments: Arc<Attachments>,
    resolver: Arc<ModelResolver>,
    knowledge: Arc<KnowledgeStore>,
    audit: Arc<dyn AuditSink>,
}

impl AnalysisPipeline {
    pub fn new(
        config: &ServiceConfig,
        model: Arc<dyn GenerativeModel>,
        extractor: Arc<dyn TextExtractor>,
        knowledge: Arc<KnowledgeStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let resolver = Arc::new(ModelResolver::new(
            model,
            config.model_candidates.clone(),
            config.model_timeout,
        ));

        let mut retriever = KnowledgeRetriever::new(knowledge.clone());
        if config.llm_ranking {
            retriever = retriever.with_llm_ranking(resolver.clone());
        }

        let attachments = Arc::new(Attachments::new());
        let router = Arc::new(IngestionRouter::new(extractor, config.max_document_chars));
        let (graph, start_task_id) = build_analysis_graph(
            router,
            Arc::new(retriever),
            resolver.clone(),
            attachments.clone(),
            config,
        );

        Self {
            graph: Arc::new(graph),
            start_task_id,
            attachments,
            resolver,
            knowledge,
            audit,
        }
    }

    /// Production wiring: OpenRouter, PDFium and the tracing audit sink.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ConfigError> {
        let model = Arc::new(OpenRouterClient::new(config)?);
        let knowledge = Arc::new(match &config.knowledge_store_path {
            Some(path) => KnowledgeStore::load_or_generate(path),
            None => KnowledgeStore::with_defaults(),
        });

        Ok(Self::new(
            config,
            model,
            Arc::new(PdfiumTextExtractor),
            knowledge,
            Arc::new(TracingAuditSink),
        ))
    }

    pub async fn analyze_document(
        &self,
        bytes: &[u8],
        media_type: &str,
        request: &RequestContext,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let report_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "analyze_document",
            report_id = %report_id,
            patient_id = %request.patient_id,
            media_type = %media_type
        );

        let outcome = self
            .run(report_id.clone(), bytes, media_type)
            .instrument(span)
            .await;

        match &outcome {
            Ok(done) => info!(
                report_id = %report_id,
                tests = done.result.tests.len(),
                alerts = done.alerts.len(),
                "Analysis completed"
            ),
            Err(e) => error!(report_id = %report_id, kind = e.kind(), error = %e, "Analysis failed"),
        }

        self.audit.record(AccessRecord {
            identity: request.requesting_user_id.clone(),
            identity_token: request.identity_token.clone(),
            patient_id: request.patient_id.clone(),
            action: ACTION_CREATE,
            resource_kind: RESOURCE_LAB_REPORT_ANALYSIS,
            resource_id: report_id,
            success: outcome.is_ok(),
            error: outcome.as_ref().err().map(|e| e.kind().to_string()),
        });

        outcome
    }

    async fn run(
        &self,
        report_id: String,
        bytes: &[u8],
        media_type: &str,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        self.attachments.put_upload(
            &report_id,
            Upload {
                media_type: media_type.to_string(),
                bytes: Arc::from(bytes),
            },
        );

        let mut session = Session::new_from_task(report_id.clone(), &self.start_task_id);
        session.context.set(session_keys::RUN_ID, &report_id).await;
        session
            .context
            .set(session_keys::GENERATED_AT, Utc::now())
            .await;

        let execution = self.graph.execute_session(&mut session).await;
        self.attachments.discard(&report_id);

        let failure: Option<AnalysisError> = session.context.get(session_keys::FAILURE).await;
        match (execution, failure) {
            (_, Some(failure)) => return Err(failure),
            (Err(e), None) => return Err(AnalysisError::Internal(e.to_string())),
            (Ok(execution), None) if !matches!(execution.status, ExecutionStatus::Completed) => {
                return Err(AnalysisError::Internal(format!(
                    "analysis graph stopped early at {}",
                    session.current_task_id
                )));
            }
            (Ok(_), None) => {}
        }
        info!(last_task = %session.current_task_id, "Analysis graph finished");

        let result: AnalysisResult = session
            .context
            .get(session_keys::RESULT)
            .await
            .ok_or_else(|| AnalysisError::Internal("analysis result missing after run".into()))?;
        let alerts: Vec<Alert> = session
            .context
            .get(session_keys::ALERTS)
            .await
            .ok_or_else(|| AnalysisError::Internal("alerts missing after run".into()))?;

        Ok(AnalysisOutcome {
            report_id,
            result,
            alerts,
        })
    }

    /// True when no per-run document data is still held.
    pub fn is_idle(&self) -> bool {
        self.attachments.is_empty()
    }

    pub fn check_interactions(&self, medications: &[Medication]) -> Vec<InteractionFinding> {
        interactions::check_interactions(medications)
    }

    pub fn resolver(&self) -> &Arc<ModelResolver> {
        &self.resolver
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeStore> {
        &self.knowledge
    }
}
