use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
    middleware::{Next, from_fn},
    response::{Json, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, info, warn};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::{AnalysisError, ConfigError, ModelUnavailableKind};
use crate::knowledge::NewChunk;
use crate::models::{Medication, RequestContext};
use crate::pipeline::AnalysisPipeline;

/// Uploads above this size are rejected by the body limit layer.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

type ApiResult<T> = Result<Json<T>, ApiError>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message, "kind": "bad_request" })),
    )
}

/// Status code for a pipeline failure. The body only ever carries the user-facing message.
fn status_for(err: &AnalysisError) -> StatusCode {
    match err {
        AnalysisError::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        AnalysisError::UnreadableDocument(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AnalysisError::ResponseParse { .. } => StatusCode::BAD_GATEWAY,
        AnalysisError::ModelUnavailable { kind, .. } => match kind {
            ModelUnavailableKind::Quota => StatusCode::TOO_MANY_REQUESTS,
            ModelUnavailableKind::Permission | ModelUnavailableKind::NotFound => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ModelUnavailableKind::MalformedRequest | ModelUnavailableKind::Unreachable => {
                StatusCode::BAD_GATEWAY
            }
        },
        AnalysisError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn analysis_error(err: &AnalysisError) -> ApiError {
    (
        status_for(err),
        Json(json!({ "error": err.user_message(), "kind": err.kind() })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnalysisPipeline>,
}

pub fn create_app(config: &ServiceConfig) -> Result<Router, ConfigError> {
    let pipeline = AnalysisPipeline::from_config(config)?;
    Ok(build_router(AppState {
        pipeline: Arc::new(pipeline),
    }))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/analyze", post(analyze_document))
        .route("/interactions", post(check_interactions))
        .route("/knowledge", get(list_knowledge).post(add_knowledge))
        .route("/models", get(list_models))
        .route("/models/refresh", post(refresh_models))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(correlation_id_middleware))
        .with_state(app_state)
}

/// Runs every request inside an `http_request` span and echoes the id back to the caller.
async fn correlation_id_middleware(mut request: Request<axum::body::Body>, next: Next) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    let header_value = HeaderValue::from_str(&correlation_id).ok();

    if let Some(value) = &header_value {
        request.headers_mut().insert("x-correlation-id", value.clone());
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;

    if let Some(value) = header_value {
        response.headers_mut().insert("x-correlation-id", value);
    }
    response
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

async fn analyze_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Value> {
    let patient_id = header_str(&headers, "x-patient-id")
        .ok_or_else(|| bad_request_error("x-patient-id header is required"))?;
    let requesting_user_id = header_str(&headers, "x-user-id")
        .ok_or_else(|| bad_request_error("x-user-id header is required"))?;
    let media_type = header_str(&headers, header::CONTENT_TYPE.as_str())
        .unwrap_or("application/octet-stream");

    let request = RequestContext {
        patient_id: patient_id.to_string(),
        requesting_user_id: requesting_user_id.to_string(),
        identity_token: header_str(&headers, header::AUTHORIZATION.as_str()).map(str::to_string),
    };

    info!(
        patient_id = %request.patient_id,
        media_type = %media_type,
        bytes = body.len(),
        "Received lab report for analysis"
    );

    let outcome = state
        .pipeline
        .analyze_document(&body, media_type, &request)
        .await
        .map_err(|e| analysis_error(&e))?;

    Ok(Json(json!({
        "reportId": outcome.report_id,
        "result": outcome.result,
        "alerts": outcome.alerts,
    })))
}

#[derive(Debug, Deserialize)]
struct InteractionRequest {
    medications: Vec<Medication>,
}

async fn check_interactions(
    State(state): State<AppState>,
    Json(request): Json<InteractionRequest>,
) -> ApiResult<Value> {
    let findings = state.pipeline.check_interactions(&request.medications);
    info!(
        medications = request.medications.len(),
        findings = findings.len(),
        "Interaction check completed"
    );
    Ok(Json(json!({ "findings": findings })))
}

async fn list_knowledge(State(state): State<AppState>) -> Json<Value> {
    let chunks = state.pipeline.knowledge().snapshot();
    Json(json!({ "chunks": chunks.as_slice() }))
}

async fn add_knowledge(
    State(state): State<AppState>,
    Json(chunk): Json<NewChunk>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if chunk.category.trim().is_empty() || chunk.content.trim().is_empty() {
        return Err(bad_request_error("category and content are required"));
    }
    let added = state.pipeline.knowledge().add_chunk(chunk);
    Ok((StatusCode::CREATED, Json(json!(added))))
}

async fn list_models(State(state): State<AppState>) -> Json<Value> {
    let resolver = state.pipeline.resolver();
    Json(json!({
        "working": resolver.working_model(),
        "candidates": resolver.candidates(),
    }))
}

async fn refresh_models(State(state): State<AppState>) -> ApiResult<Value> {
    let resolver = state.pipeline.resolver();
    match resolver.refresh().await {
        Ok(model) => {
            info!(model = %model, "Model candidates re-probed");
            Ok(Json(json!({
                "working": model,
                "candidates": resolver.candidates(),
            })))
        }
        Err(e) => {
            warn!(kind = e.kind(), error = %e, "No model candidate is available");
            Err(analysis_error(&e))
        }
    }
}
