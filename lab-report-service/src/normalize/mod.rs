//! Turns untrusted model text into a fully-populated [`AnalysisResult`].
//!
//! Extraction (finding the JSON) and coercion (fitting it to the schema) are separate steps so
//! the defaulting rules can be tested without any text-recovery quirks.

pub mod coerce;
pub mod extract;

use tracing::{info, warn};

use crate::error::AnalysisError;
use crate::models::AnalysisResult;
pub use coerce::{CoercionWarning, coerce};
pub use extract::extract_object;

pub fn normalize(raw: &str) -> Result<AnalysisResult, AnalysisError> {
    let object = extract_object(raw)?;
    let (result, warnings) = coerce(&object);

    for warning in &warnings {
        warn!(field = %warning.field, detail = %warning.detail, "Coerced model output field");
    }
    info!(
        tests = result.tests.len(),
        conditions = result.identified_conditions.len(),
        coerced_fields = warnings.len(),
        "Model response normalized"
    );

    Ok(result)
}
