//! Merges the instruction template, the ingested document and retrieved knowledge into one request.

use crate::ingestion::TranscriptionPayload;
use crate::knowledge::format_for_prompt;
use crate::llm::{ContentPart, ModelRequest};
use crate::models::KnowledgeChunk;

const INSTRUCTIONS: &str = r#"You are a medical AI assistant analysing a laboratory test report.

Guidelines:
1. Extract every test with its numeric value, unit and reference range
2. Classify each test severity as one of: normal, moderate, high, critical
3. Identify likely conditions with likelihood (Low, Moderate, High, Very High) and severity (Low, Moderate, High, Critical)
4. Recommend medicines only where clearly indicated, with dosage and indication
5. Do not invent values that are not present in the report

Respond with ONLY a JSON object using exactly this structure:
{
  "tests": [
    {"name": "", "value": 0, "unit": "", "referenceRange": "", "severity": "normal", "clinicalSignificance": ""}
  ],
  "overallSeverity": "normal",
  "identifiedConditions": [
    {"conditionName": "", "likelihood": "Low", "explanation": "", "severity": "Low"}
  ],
  "narrativeSummary": "",
  "recommendedMedicines": [
    {"name": "", "dosage": "", "frequency": "", "duration": "", "indication": ""}
  ],
  "precautions": [],
  "lifestyleRecommendations": {"diet": [], "exercise": [], "sleep": [], "stressManagement": []},
  "additionalRecommendations": {"followUpTests": [], "specialistConsultations": [], "monitoring": []},
  "confidence": 0.0
}"#;

/// Build the analysis request. The document part comes after the instructions so image and text
/// payloads share one template.
pub fn assemble(
    payload: &TranscriptionPayload,
    knowledge: &[KnowledgeChunk],
    max_tokens: u32,
) -> ModelRequest {
    let mut instructions = INSTRUCTIONS.to_string();
    instructions.push_str(&format_for_prompt(knowledge));

    if let TranscriptionPayload::Text {
        truncation: Some(t),
        ..
    } = payload
    {
        instructions.push_str(&format!(
            "\nNote: the report text was truncated to the first {} of {} characters.\n",
            t.kept_chars, t.original_chars
        ));
    }

    ModelRequest {
        parts: vec![
            ContentPart::Text { text: instructions },
            payload.document_part(),
        ],
        max_tokens,
    }
}
