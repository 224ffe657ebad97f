use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lab_report_service::audit::{AccessRecord, AuditSink};
use lab_report_service::ingestion::{ExtractionError, TextExtractor};
use lab_report_service::knowledge::KnowledgeStore;
use lab_report_service::llm::{ContentPart, GenerativeModel, ModelRequest};
use lab_report_service::{
    AlertSeverity, AlertType, AnalysisPipeline, ModelCallError, RequestContext, ServiceConfig,
};

struct FakeModel {
    reply: Result<String, ModelCallError>,
    requests: Mutex<Vec<(String, ModelRequest)>>,
}

impl FakeModel {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn failing(error: ModelCallError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(error),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<(String, ModelRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeModel for FakeModel {
    async fn generate(
        &self,
        model_id: &str,
        request: &ModelRequest,
    ) -> Result<String, ModelCallError> {
        self.requests
            .lock()
            .unwrap()
            .push((model_id.to_string(), request.clone()));
        self.reply.clone()
    }
}

struct StaticPdfText(&'static str);

impl TextExtractor for StaticPdfText {
    fn extract_text(&self, _bytes: &[u8]) -> Result<String, ExtractionError> {
        Ok(self.0.to_string())
    }
}

#[derive(Default)]
struct RecordingAudit {
    records: Mutex<Vec<AccessRecord>>,
}

impl AuditSink for RecordingAudit {
    fn record(&self, record: AccessRecord) {
        self.records.lock().unwrap().push(record);
    }
}

fn config() -> ServiceConfig {
    ServiceConfig::from_lookup(|key| match key {
        "OPENROUTER_API_KEY" => Some("test-key".to_string()),
        "MODEL_CANDIDATES" => Some("first/model,second/model".to_string()),
        "LLM_RANKING" => Some("false".to_string()),
        _ => None,
    })
    .unwrap()
}

fn request() -> RequestContext {
    RequestContext {
        patient_id: "patient-42".to_string(),
        requesting_user_id: "dr-who".to_string(),
        identity_token: Some("Bearer token".to_string()),
    }
}

fn pipeline(model: Arc<FakeModel>, audit: Arc<RecordingAudit>) -> AnalysisPipeline {
    AnalysisPipeline::new(
        &config(),
        model,
        Arc::new(StaticPdfText("Glucose fasting 92 mg/dL")),
        Arc::new(KnowledgeStore::with_defaults()),
        audit,
    )
}

const DIABETIC_REPLY: &str = r#"Sure! Here is the analysis:
```json
{
  "tests": [
    {"name": "HbA1c", "value": "10.5", "unit": "%", "referenceRange": "4.0-5.6", "severity": "critical"},
    {"name": "Fasting Glucose", "value": 182, "unit": "mg/dL", "severity": "high"}
  ],
  "overallSeverity": "high",
  "identifiedConditions": [
    {"conditionName": "Type 2 Diabetes", "likelihood": "very high", "severity": "high", "explanation": "HbA1c well above 6.5%"}
  ],
  "narrativeSummary": "Poorly controlled diabetes.",
  "recommendedMedicines": [
    {"name": "Warfarin", "dosage": "5mg", "indication": "AF anticoagulation"},
    {"name": "Aspirin", "dosage": "75mg", "indication": "cardiovascular prevention"}
  ],
  "confidence": 0.85
}
```"#;

#[tokio::test]
async fn text_report_runs_end_to_end() {
    let model = FakeModel::replying(DIABETIC_REPLY);
    let audit = Arc::new(RecordingAudit::default());
    let pipeline = pipeline(model.clone(), audit.clone());

    let outcome = pipeline
        .analyze_document(b"HbA1c 10.5 % (4.0-5.6)\nGlucose 182 mg/dL", "text/plain", &request())
        .await
        .unwrap();

    assert_eq!(outcome.result.tests.len(), 2);
    assert_eq!(outcome.result.tests[0].value, 10.5);
    assert_eq!(outcome.result.medications.len(), 2);
    assert_eq!(outcome.result.recommended_medicines.len(), 2);

    // Most severe first, interaction screening ran on the recommended medicines.
    assert_eq!(outcome.alerts[0].severity, AlertSeverity::Critical);
    assert!(
        outcome
            .alerts
            .iter()
            .any(|a| a.alert_type == AlertType::MedicationInteraction)
    );
    assert!(
        outcome
            .alerts
            .iter()
            .any(|a| a.alert_type == AlertType::ConditionWarning && a.subject_ref == "Type 2 Diabetes")
    );
    assert!(
        outcome
            .alerts
            .windows(2)
            .all(|pair| pair[0].severity >= pair[1].severity)
    );

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "first/model");
    let ContentPart::Text { text: instructions } = &requests[0].1.parts[0] else {
        panic!("instructions must be text");
    };
    assert!(instructions.contains("RELEVANT MEDICAL KNOWLEDGE"));
    let ContentPart::Text { text: document } = &requests[0].1.parts[1] else {
        panic!("document must be text");
    };
    assert!(document.contains("HbA1c 10.5"));

    let records = audit.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
    assert_eq!(records[0].patient_id, "patient-42");
    assert_eq!(records[0].resource_id, outcome.report_id);
}

#[tokio::test]
async fn image_is_forwarded_as_image_part() {
    let model = FakeModel::replying(r#"{"tests": []}"#);
    let pipeline = pipeline(model.clone(), Arc::new(RecordingAudit::default()));
    let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    let outcome = pipeline
        .analyze_document(png, "image/png", &request())
        .await
        .unwrap();

    assert!(outcome.result.tests.is_empty());
    assert!(outcome.alerts.is_empty());
    let requests = model.requests();
    assert!(requests[0].1.has_image());
}

#[tokio::test]
async fn pdf_text_layer_is_used() {
    let model = FakeModel::replying(r#"{"tests": [{"name": "Glucose", "value": 92, "severity": "normal"}]}"#);
    let pipeline = pipeline(model.clone(), Arc::new(RecordingAudit::default()));

    let outcome = pipeline
        .analyze_document(b"%PDF-1.7 ...", "application/pdf", &request())
        .await
        .unwrap();

    assert_eq!(outcome.result.tests[0].name, "Glucose");
    let ContentPart::Text { text } = &model.requests()[0].1.parts[1] else {
        panic!("pdf text must be sent as text");
    };
    assert!(text.contains("Glucose fasting 92"));
}

#[tokio::test]
async fn unsupported_media_never_reaches_the_model() {
    let model = FakeModel::replying(DIABETIC_REPLY);
    let audit = Arc::new(RecordingAudit::default());
    let pipeline = pipeline(model.clone(), audit.clone());

    let err = pipeline
        .analyze_document(b"PK\x03\x04", "application/zip", &request())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "unsupported_media");
    assert!(model.requests().is_empty());
    let records = audit.records.lock().unwrap();
    assert!(!records[0].success);
    assert_eq!(records[0].error.as_deref(), Some("unsupported_media"));
}

#[tokio::test]
async fn exhausted_candidates_surface_the_last_failure() {
    let model = FakeModel::failing(ModelCallError::Permission("403".to_string()));
    let pipeline = pipeline(model.clone(), Arc::new(RecordingAudit::default()));

    let err = pipeline
        .analyze_document(b"Creatinine 1.1 mg/dL", "text/plain", &request())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "model_permission");
    let tried: Vec<String> = model.requests().into_iter().map(|(id, _)| id).collect();
    assert_eq!(tried, vec!["first/model", "second/model"]);
    assert!(pipeline.resolver().working_model().is_none());
}

#[tokio::test]
async fn prose_only_reply_is_a_parse_error() {
    let model = FakeModel::replying("I cannot read this document.");
    let pipeline = pipeline(model, Arc::new(RecordingAudit::default()));

    let err = pipeline
        .analyze_document(b"Sodium 140 mmol/L", "text/plain", &request())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "response_parse");
    assert!(!err.user_message().contains("cannot read"));
}

#[tokio::test]
async fn document_data_is_released_after_every_run() {
    let passing = pipeline(
        FakeModel::replying(DIABETIC_REPLY),
        Arc::new(RecordingAudit::default()),
    );
    passing
        .analyze_document(b"HbA1c 10.5 %", "text/plain", &request())
        .await
        .unwrap();
    assert!(passing.is_idle());

    let failing = pipeline(
        FakeModel::replying("no json here"),
        Arc::new(RecordingAudit::default()),
    );
    let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    let err = failing
        .analyze_document(png, "image/png", &request())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "response_parse");
    assert!(failing.is_idle());
}
