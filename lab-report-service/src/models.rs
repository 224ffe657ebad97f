use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of a single extracted test, as reported by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TestSeverity {
    #[default]
    Normal,
    Moderate,
    High,
    Critical,
}

impl TestSeverity {
    pub fn parse(raw: &str) -> Option<Self> {
        match canonical_label(raw).as_str() {
            "normal" => Some(TestSeverity::Normal),
            "moderate" => Some(TestSeverity::Moderate),
            "high" => Some(TestSeverity::High),
            "critical" => Some(TestSeverity::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Likelihood {
    #[default]
    Low,
    Moderate,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl Likelihood {
    pub fn parse(raw: &str) -> Option<Self> {
        match canonical_label(raw).as_str() {
            "low" => Some(Likelihood::Low),
            "moderate" => Some(Likelihood::Moderate),
            "high" => Some(Likelihood::High),
            "veryhigh" => Some(Likelihood::VeryHigh),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Likelihood::Low => "Low",
            Likelihood::Moderate => "Moderate",
            Likelihood::High => "High",
            Likelihood::VeryHigh => "Very High",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConditionSeverity {
    #[default]
    Low,
    Moderate,
    High,
    Critical,
}

impl ConditionSeverity {
    pub fn parse(raw: &str) -> Option<Self> {
        match canonical_label(raw).as_str() {
            "low" => Some(ConditionSeverity::Low),
            "moderate" => Some(ConditionSeverity::Moderate),
            "high" => Some(ConditionSeverity::High),
            "critical" => Some(ConditionSeverity::Critical),
            _ => None,
        }
    }
}

/// Lowercase and drop separators so "Very High", "very_high" and "VERY-HIGH" compare equal.
fn canonical_label(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedTest {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub reference_range: String,
    pub severity: TestSeverity,
    pub clinical_significance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifiedCondition {
    pub condition_name: String,
    pub likelihood: Likelihood,
    pub explanation: String,
    pub severity: ConditionSeverity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LifestyleRecommendations {
    pub diet: Vec<String>,
    pub exercise: Vec<String>,
    pub sleep: Vec<String>,
    pub stress_management: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalRecommendations {
    pub follow_up_tests: Vec<String>,
    pub specialist_consultations: Vec<String>,
    pub monitoring: Vec<String>,
}

/// Canonical, fully-populated analysis of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub tests: Vec<ExtractedTest>,
    pub overall_severity: TestSeverity,
    pub identified_conditions: Vec<IdentifiedCondition>,
    pub narrative_summary: String,
    /// Display strings, kept for consumers that predate structured medications.
    pub recommended_medicines: Vec<String>,
    pub medications: Vec<Medication>,
    pub precautions: Vec<String>,
    pub lifestyle_recommendations: LifestyleRecommendations,
    pub additional_recommendations: AdditionalRecommendations,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    CriticalValue,
    ConditionWarning,
    MedicationInteraction,
    AbnormalTrend,
    FollowUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// A generated alert. Acknowledgement state is tracked by the caller, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub subject_ref: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Medication {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub instructions: String,
    pub quantity: String,
}

impl Medication {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionSeverity {
    Mild,
    Moderate,
    Severe,
    Contraindicated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionFinding {
    pub medication_pair: (String, String),
    pub severity: InteractionSeverity,
    pub description: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: String,
    pub category: String,
    pub keywords: BTreeSet<String>,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunks: Vec<KnowledgeChunk>,
    pub scores: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCandidate {
    pub identifier: String,
    pub last_known_working: bool,
}

/// Caller-supplied identity for one analysis request. Authentication happens upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub patient_id: String,
    pub requesting_user_id: String,
    pub identity_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    pub report_id: String,
    pub result: AnalysisResult,
    pub alerts: Vec<Alert>,
}
