use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{info, warn};

use super::client::{GenerativeModel, ModelRequest};
use crate::error::{AnalysisError, ModelCallError};
use crate::models::ModelCandidate;

/// A successful model call and the identifier that served it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReply {
    pub model: String,
    pub text: String,
}

/// Picks a callable model from an ordered candidate list and remembers the last one that worked.
///
/// Candidates are tried one at a time, never concurrently, and the first success wins. The
/// remembered identifier is tried first on later calls; a stale value only costs one extra call.
pub struct ModelResolver {
    model: Arc<dyn GenerativeModel>,
    candidates: Vec<String>,
    working: RwLock<Option<String>>,
    timeout: Duration,
}

impl ModelResolver {
    pub fn new(model: Arc<dyn GenerativeModel>, candidates: Vec<String>, timeout: Duration) -> Self {
        Self {
            model,
            candidates,
            working: RwLock::new(None),
            timeout,
        }
    }

    /// Return the cached working model, probing the candidates in order if there is none.
    pub async fn resolve(&self) -> Result<String, AnalysisError> {
        if let Some(model) = self.working_model() {
            return Ok(model);
        }
        self.probe_all().await
    }

    /// Forget the cached model and probe again from the top of the list.
    pub async fn refresh(&self) -> Result<String, AnalysisError> {
        self.set_working(None);
        self.probe_all().await
    }

    /// Send a real request, falling back through the candidates on any failure.
    pub async fn invoke_with_fallback(
        &self,
        request: &ModelRequest,
    ) -> Result<ModelReply, AnalysisError> {
        let mut last_error = None;

        for model_id in self.trial_order() {
            match self.call(&model_id, request).await {
                Ok(text) => {
                    self.set_working(Some(model_id.clone()));
                    return Ok(ModelReply {
                        model: model_id,
                        text,
                    });
                }
                Err(e) => {
                    warn!(model = %model_id, error = %e, "Model call failed, trying next candidate");
                    last_error = Some(e);
                }
            }
        }

        Err(exhausted(last_error))
    }

    pub fn working_model(&self) -> Option<String> {
        match self.working.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Snapshot of the candidate list with the cached designation applied.
    pub fn candidates(&self) -> Vec<ModelCandidate> {
        let working = self.working_model();
        self.candidates
            .iter()
            .map(|id| ModelCandidate {
                identifier: id.clone(),
                last_known_working: working.as_deref() == Some(id.as_str()),
            })
            .collect()
    }

    async fn probe_all(&self) -> Result<String, AnalysisError> {
        let probe = ModelRequest::probe();
        let mut last_error = None;

        for model_id in &self.candidates {
            match self.call(model_id, &probe).await {
                Ok(_) => {
                    info!(model = %model_id, "Model probe succeeded");
                    self.set_working(Some(model_id.clone()));
                    return Ok(model_id.clone());
                }
                Err(e) => {
                    warn!(model = %model_id, error = %e, "Model probe failed");
                    last_error = Some(e);
                }
            }
        }

        Err(exhausted(last_error))
    }

    /// Cached model first, then the remaining candidates in configured order.
    fn trial_order(&self) -> Vec<String> {
        let mut order = Vec::with_capacity(self.candidates.len());
        if let Some(working) = self.working_model() {
            order.push(working);
        }
        for id in &self.candidates {
            if !order.contains(id) {
                order.push(id.clone());
            }
        }
        order
    }

    async fn call(&self, model_id: &str, request: &ModelRequest) -> Result<String, ModelCallError> {
        match tokio::time::timeout(self.timeout, self.model.generate(model_id, request)).await {
            Ok(result) => result,
            Err(_) => Err(ModelCallError::Timeout(self.timeout.as_secs())),
        }
    }

    fn set_working(&self, model: Option<String>) {
        match self.working.write() {
            Ok(mut guard) => *guard = model,
            Err(poisoned) => *poisoned.into_inner() = model,
        }
    }
}

fn exhausted(last_error: Option<ModelCallError>) -> AnalysisError {
    AnalysisError::unavailable(last_error.unwrap_or_else(|| {
        ModelCallError::NotFound("no model candidates configured".to_string())
    }))
}
