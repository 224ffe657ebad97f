//! Access records for the external audit trail. Storage is someone else's job; we only emit.

use serde::Serialize;
use tracing::info;

pub const ACTION_CREATE: &str = "create";
pub const RESOURCE_LAB_REPORT_ANALYSIS: &str = "lab_report_analysis";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessRecord {
    /// Requesting user, plus the opaque identity token when one was supplied.
    pub identity: String,
    pub identity_token: Option<String>,
    pub patient_id: String,
    pub action: &'static str,
    pub resource_kind: &'static str,
    pub resource_id: String,
    pub success: bool,
    pub error: Option<String>,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, record: AccessRecord);
}

/// Emits each record as a structured `audit` event.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AccessRecord) {
        info!(
            target: "audit",
            identity = %record.identity,
            has_identity_token = record.identity_token.is_some(),
            patient_id = %record.patient_id,
            action = record.action,
            resource_kind = record.resource_kind,
            resource_id = %record.resource_id,
            success = record.success,
            error = record.error.as_deref().unwrap_or(""),
            "Access recorded"
        );
    }
}
