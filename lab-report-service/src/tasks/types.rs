/// Keys under which the analysis tasks exchange state through the flow context.
pub mod session_keys {
    pub const RUN_ID: &str = "run_id";
    pub const KNOWLEDGE: &str = "knowledge_chunks";
    pub const RAW_RESPONSE: &str = "raw_model_response";
    pub const MODEL_USED: &str = "model_used";
    pub const RESULT: &str = "analysis_result";
    pub const HAS_MEDICATIONS: &str = "has_medications";
    pub const FINDINGS: &str = "interaction_findings";
    pub const GENERATED_AT: &str = "generated_at";
    pub const ALERTS: &str = "alerts";
    /// The typed error of the stage that stopped the run.
    pub const FAILURE: &str = "stage_failure";
}
