use std::fmt;

use serde_json::{Map, Value};

use crate::alerts::find_blood_pressure;
use crate::models::{
    AdditionalRecommendations, AnalysisResult, ConditionSeverity, ExtractedTest,
    IdentifiedCondition, LifestyleRecommendations, Likelihood, Medication, TestSeverity,
};

/// Placeholder used when the model leaves out the narrative.
pub const MISSING_SUMMARY: &str = "No summary was provided for this report.";

/// A field that was missing or mistyped and replaced by its default. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionWarning {
    pub field: String,
    pub detail: String,
}

impl fmt::Display for CoercionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.detail)
    }
}

#[derive(Default)]
struct Warnings(Vec<CoercionWarning>);

impl Warnings {
    fn push(&mut self, field: impl Into<String>, detail: impl Into<String>) {
        self.0.push(CoercionWarning {
            field: field.into(),
            detail: detail.into(),
        });
    }
}

/// Coerce a parsed model object into the canonical schema.
///
/// Every field of the result is populated; anything that had to be defaulted or dropped is
/// reported in the returned warnings.
pub fn coerce(object: &Map<String, Value>) -> (AnalysisResult, Vec<CoercionWarning>) {
    let mut warnings = Warnings::default();

    let tests = coerce_tests(lookup(object, &["tests"]), &mut warnings);
    let overall_severity = match lookup(object, &["overallSeverity", "overall_severity"]) {
        Some(Value::String(raw)) => TestSeverity::parse(raw).unwrap_or_else(|| {
            warnings.push("overallSeverity", format!("unknown severity {raw:?}, using normal"));
            TestSeverity::Normal
        }),
        Some(other) => {
            warnings.push("overallSeverity", format!("expected string, got {}", type_name(other)));
            TestSeverity::Normal
        }
        None => {
            warnings.push("overallSeverity", "missing, using normal");
            TestSeverity::Normal
        }
    };
    let identified_conditions = coerce_conditions(
        lookup(object, &["identifiedConditions", "identified_conditions"]),
        &mut warnings,
    );

    let narrative_summary = match lookup(object, &["narrativeSummary", "narrative_summary", "summary"])
    {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => {
            warnings.push("narrativeSummary", "missing or empty, using placeholder");
            MISSING_SUMMARY.to_string()
        }
    };

    let (recommended_medicines, medications) = coerce_medicines(object, &mut warnings);
    let precautions = string_list(lookup(object, &["precautions"]), "precautions", &mut warnings);

    let lifestyle = sub_object(
        object,
        &["lifestyleRecommendations", "lifestyle_recommendations"],
        "lifestyleRecommendations",
        &mut warnings,
    );
    let lifestyle_recommendations = LifestyleRecommendations {
        diet: nested_list(lifestyle, &["diet"], "lifestyleRecommendations.diet", &mut warnings),
        exercise: nested_list(lifestyle, &["exercise"], "lifestyleRecommendations.exercise", &mut warnings),
        sleep: nested_list(lifestyle, &["sleep"], "lifestyleRecommendations.sleep", &mut warnings),
        stress_management: nested_list(
            lifestyle,
            &["stressManagement", "stress_management"],
            "lifestyleRecommendations.stressManagement",
            &mut warnings,
        ),
    };

    let additional = sub_object(
        object,
        &["additionalRecommendations", "additional_recommendations"],
        "additionalRecommendations",
        &mut warnings,
    );
    let additional_recommendations = AdditionalRecommendations {
        follow_up_tests: nested_list(
            additional,
            &["followUpTests", "follow_up_tests"],
            "additionalRecommendations.followUpTests",
            &mut warnings,
        ),
        specialist_consultations: nested_list(
            additional,
            &["specialistConsultations", "specialist_consultations"],
            "additionalRecommendations.specialistConsultations",
            &mut warnings,
        ),
        monitoring: nested_list(
            additional,
            &["monitoring"],
            "additionalRecommendations.monitoring",
            &mut warnings,
        ),
    };

    let confidence = coerce_confidence(lookup(object, &["confidence"]), &mut warnings);

    let result = AnalysisResult {
        tests,
        overall_severity,
        identified_conditions,
        narrative_summary,
        recommended_medicines,
        medications,
        precautions,
        lifestyle_recommendations,
        additional_recommendations,
        confidence,
    };
    (result, warnings.0)
}

fn lookup<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| object.get(*key))
        .filter(|v| !v.is_null())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Missing or non-array values become an empty list.
fn array<'a>(value: Option<&'a Value>, field: &str, warnings: &mut Warnings) -> &'a [Value] {
    match value {
        Some(Value::Array(items)) => items,
        Some(other) => {
            warnings.push(field, format!("expected array, got {}", type_name(other)));
            &[]
        }
        None => {
            warnings.push(field, "missing, using empty list");
            &[]
        }
    }
}

fn string_list(value: Option<&Value>, field: &str, warnings: &mut Warnings) -> Vec<String> {
    array(value, field, warnings)
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match item {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            other => {
                warnings.push(format!("{field}[{i}]"), format!("dropped {} entry", type_name(other)));
                None
            }
        })
        .collect()
}

fn sub_object<'a>(
    object: &'a Map<String, Value>,
    keys: &[&str],
    field: &str,
    warnings: &mut Warnings,
) -> Option<&'a Map<String, Value>> {
    match lookup(object, keys) {
        Some(Value::Object(inner)) => Some(inner),
        Some(other) => {
            warnings.push(field, format!("expected object, got {}", type_name(other)));
            None
        }
        None => {
            warnings.push(field, "missing, using empty object");
            None
        }
    }
}

/// A list inside an optional sub-object. An absent parent was already reported.
fn nested_list(
    parent: Option<&Map<String, Value>>,
    keys: &[&str],
    field: &str,
    warnings: &mut Warnings,
) -> Vec<String> {
    match parent {
        Some(parent) => string_list(lookup(parent, keys), field, warnings),
        None => Vec::new(),
    }
}

fn text(object: &Map<String, Value>, keys: &[&str]) -> String {
    match lookup(object, keys) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Numbers, or the leading number of a string such as `"10.5 %"`.
pub fn numeric(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => leading_number(s),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn leading_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let end = trimmed
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}

fn coerce_tests(value: Option<&Value>, warnings: &mut Warnings) -> Vec<ExtractedTest> {
    let mut tests = Vec::new();

    for (i, item) in array(value, "tests", warnings).iter().enumerate() {
        let field = format!("tests[{i}]");
        let Value::Object(entry) = item else {
            warnings.push(field, format!("dropped {} entry", type_name(item)));
            continue;
        };

        let name = text(entry, &["name", "testName", "test_name"]);
        if name.is_empty() {
            warnings.push(field, "dropped entry without a name");
            continue;
        }
        let raw_value = lookup(entry, &["value", "result"]);
        let Some(value) = raw_value.and_then(numeric) else {
            warnings.push(field, format!("dropped {name:?}: no numeric value"));
            continue;
        };

        // A paired reading such as "150/125" keeps its second half in the unit.
        let mut unit = text(entry, &["unit", "units"]);
        if let Some(Value::String(raw)) = raw_value {
            if let Some(pair) = find_blood_pressure(raw) {
                if find_blood_pressure(&unit).is_none() {
                    warnings.push(
                        format!("{field}.unit"),
                        format!("moved paired reading {pair:?} into the unit"),
                    );
                    unit = format!("{pair} {unit}").trim().to_string();
                }
            }
        }

        let severity = match lookup(entry, &["severity"]) {
            Some(Value::String(raw)) => TestSeverity::parse(raw).unwrap_or_else(|| {
                warnings.push(
                    format!("{field}.severity"),
                    format!("unknown severity {raw:?}, using normal"),
                );
                TestSeverity::Normal
            }),
            _ => {
                warnings.push(format!("{field}.severity"), "missing, using normal");
                TestSeverity::Normal
            }
        };

        tests.push(ExtractedTest {
            name,
            value,
            unit,
            reference_range: text(entry, &["referenceRange", "reference_range", "normalRange"]),
            severity,
            clinical_significance: text(entry, &["clinicalSignificance", "clinical_significance"]),
        });
    }

    tests
}

fn coerce_conditions(value: Option<&Value>, warnings: &mut Warnings) -> Vec<IdentifiedCondition> {
    let mut conditions = Vec::new();

    for (i, item) in array(value, "identifiedConditions", warnings).iter().enumerate() {
        let field = format!("identifiedConditions[{i}]");
        let Value::Object(entry) = item else {
            warnings.push(field, format!("dropped {} entry", type_name(item)));
            continue;
        };

        let condition_name = text(entry, &["conditionName", "condition_name", "name", "condition"]);
        if condition_name.is_empty() {
            warnings.push(field, "dropped entry without a condition name");
            continue;
        }

        let likelihood_raw = text(entry, &["likelihood"]);
        let likelihood = Likelihood::parse(&likelihood_raw).unwrap_or_else(|| {
            warnings.push(
                format!("{field}.likelihood"),
                format!("unrecognised likelihood {likelihood_raw:?}, using Low"),
            );
            Likelihood::Low
        });

        let severity_raw = text(entry, &["severity"]);
        let severity = ConditionSeverity::parse(&severity_raw).unwrap_or_else(|| {
            warnings.push(
                format!("{field}.severity"),
                format!("unrecognised severity {severity_raw:?}, using Low"),
            );
            ConditionSeverity::Low
        });

        conditions.push(IdentifiedCondition {
            condition_name,
            likelihood,
            explanation: text(entry, &["explanation", "description"]),
            severity,
        });
    }

    conditions
}

/// Strings are kept verbatim; objects become a display string plus a structured [`Medication`].
/// A `medications` array of objects, as written by a previous normalisation, is read back too.
fn coerce_medicines(
    object: &Map<String, Value>,
    warnings: &mut Warnings,
) -> (Vec<String>, Vec<Medication>) {
    let mut display = Vec::new();
    let mut medications: Vec<Medication> = Vec::new();

    let entries = array(
        lookup(object, &["recommendedMedicines", "recommended_medicines"]),
        "recommendedMedicines",
        warnings,
    );
    for (i, item) in entries.iter().enumerate() {
        let field = format!("recommendedMedicines[{i}]");
        match item {
            Value::String(s) if !s.trim().is_empty() => display.push(s.trim().to_string()),
            Value::Object(entry) => match medication_from(entry) {
                Some(medication) => {
                    display.push(display_string(&medication, &text(entry, &["indication", "purpose"])));
                    push_unique(&mut medications, medication);
                }
                None => warnings.push(field, "dropped medicine without a name"),
            },
            other => warnings.push(field, format!("dropped {} entry", type_name(other))),
        }
    }

    if let Some(Value::Array(structured)) = lookup(object, &["medications"]) {
        for item in structured {
            if let Some(medication) = item.as_object().and_then(medication_from) {
                push_unique(&mut medications, medication);
            }
        }
    }

    (display, medications)
}

fn medication_from(entry: &Map<String, Value>) -> Option<Medication> {
    let name = text(entry, &["name", "medicine", "drug"]);
    if name.is_empty() {
        return None;
    }
    let instructions = match text(entry, &["instructions"]) {
        s if s.is_empty() => text(entry, &["indication", "purpose"]),
        s => s,
    };
    Some(Medication {
        name,
        dosage: text(entry, &["dosage", "dose"]),
        frequency: text(entry, &["frequency"]),
        duration: text(entry, &["duration"]),
        instructions,
        quantity: text(entry, &["quantity"]),
    })
}

fn push_unique(medications: &mut Vec<Medication>, medication: Medication) {
    if !medications
        .iter()
        .any(|m| m.name.eq_ignore_ascii_case(&medication.name))
    {
        medications.push(medication);
    }
}

/// `name (dosage) - indication`, omitting the parts that are empty.
pub fn display_string(medication: &Medication, indication: &str) -> String {
    let mut out = medication.name.clone();
    if !medication.dosage.is_empty() {
        out.push_str(&format!(" ({})", medication.dosage));
    }
    if !indication.is_empty() {
        out.push_str(&format!(" - {indication}"));
    }
    out
}

fn coerce_confidence(value: Option<&Value>, warnings: &mut Warnings) -> f64 {
    let Some(raw) = value else {
        warnings.push("confidence", "missing, using 0.0");
        return 0.0;
    };
    let Some(mut confidence) = numeric(raw) else {
        warnings.push("confidence", format!("not numeric ({}), using 0.0", type_name(raw)));
        return 0.0;
    };

    if confidence > 1.0 && confidence <= 100.0 {
        confidence /= 100.0;
    }
    if !(0.0..=1.0).contains(&confidence) {
        warnings.push("confidence", format!("{confidence} out of range, clamped"));
        confidence = confidence.clamp(0.0, 1.0);
    }
    confidence
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn paired_reading_in_value_moves_into_unit() {
        let (result, warnings) = coerce(&object(json!({
            "tests": [
                {"name": "Blood Pressure", "value": "150/125", "unit": "mmHg"},
                {"name": "BP", "value": "120/80 mmHg"},
                {"name": "Blood Pressure", "value": "170/95", "unit": "170/95 mmHg"}
            ]
        })));

        assert_eq!(result.tests[0].value, 150.0);
        assert_eq!(result.tests[0].unit, "150/125 mmHg");
        assert_eq!(result.tests[1].unit, "120/80");
        assert_eq!(result.tests[2].unit, "170/95 mmHg");
        assert!(warnings.iter().any(|w| w.field == "tests[0].unit"));
        assert!(!warnings.iter().any(|w| w.field == "tests[2].unit"));
    }

    #[test]
    fn empty_object_is_fully_defaulted() {
        let (result, warnings) = coerce(&Map::new());

        assert!(result.tests.is_empty());
        assert_eq!(result.overall_severity, TestSeverity::Normal);
        assert_eq!(result.narrative_summary, MISSING_SUMMARY);
        assert_eq!(result.lifestyle_recommendations, LifestyleRecommendations::default());
        assert_eq!(result.additional_recommendations, AdditionalRecommendations::default());
        assert_eq!(result.confidence, 0.0);
        assert!(warnings.iter().any(|w| w.field == "tests"));
        assert!(warnings.iter().any(|w| w.field == "lifestyleRecommendations"));
    }

    #[test]
    fn mistyped_lists_become_empty() {
        let (result, warnings) = coerce(&object(json!({
            "tests": "none",
            "precautions": {"a": 1},
            "lifestyleRecommendations": {"diet": "eat well", "sleep": ["8 hours", 7, null]}
        })));

        assert!(result.tests.is_empty());
        assert!(result.precautions.is_empty());
        assert!(result.lifestyle_recommendations.diet.is_empty());
        assert_eq!(result.lifestyle_recommendations.sleep, vec!["8 hours", "7"]);
        assert!(warnings.iter().any(|w| w.field == "lifestyleRecommendations.diet"));
        assert!(warnings.iter().any(|w| w.field == "lifestyleRecommendations.sleep[2]"));
    }

    #[test]
    fn tests_are_coerced_and_bad_entries_dropped() {
        let (result, warnings) = coerce(&object(json!({
            "tests": [
                {"name": "HbA1c", "value": "10.5 %", "unit": "%", "severity": "CRITICAL"},
                {"name": "LDL", "value": 150, "severity": "borderline"},
                {"name": "", "value": 1},
                {"name": "Comment", "value": "see note"},
                "glucose 90"
            ]
        })));

        assert_eq!(result.tests.len(), 2);
        assert_eq!(result.tests[0].value, 10.5);
        assert_eq!(result.tests[0].severity, TestSeverity::Critical);
        assert_eq!(result.tests[1].severity, TestSeverity::Normal);
        assert!(warnings.iter().any(|w| w.field == "tests[1].severity"));
        assert!(warnings.iter().any(|w| w.field == "tests[3]"));
        assert!(warnings.iter().any(|w| w.field == "tests[4]"));
    }

    #[test]
    fn condition_labels_are_lenient() {
        let (result, _) = coerce(&object(json!({
            "identifiedConditions": [
                {"conditionName": "Diabetes", "likelihood": "very_high", "severity": "critical"},
                {"conditionName": "Anemia", "likelihood": "possible", "severity": "mild"},
                {"likelihood": "High"}
            ]
        })));

        assert_eq!(result.identified_conditions.len(), 2);
        assert_eq!(result.identified_conditions[0].likelihood, Likelihood::VeryHigh);
        assert_eq!(result.identified_conditions[0].severity, ConditionSeverity::Critical);
        assert_eq!(result.identified_conditions[1].likelihood, Likelihood::Low);
        assert_eq!(result.identified_conditions[1].severity, ConditionSeverity::Low);
    }

    #[test]
    fn medicine_objects_are_flattened_and_kept() {
        let (result, _) = coerce(&object(json!({
            "recommendedMedicines": [
                "Vitamin D3 1000 IU daily",
                {"name": "Metformin", "dosage": "500mg", "frequency": "twice daily", "indication": "glycemic control"},
                {"name": "Atorvastatin"},
                {"dosage": "10mg"}
            ]
        })));

        assert_eq!(
            result.recommended_medicines,
            vec![
                "Vitamin D3 1000 IU daily",
                "Metformin (500mg) - glycemic control",
                "Atorvastatin"
            ]
        );
        assert_eq!(result.medications.len(), 2);
        assert_eq!(result.medications[0].frequency, "twice daily");
        assert_eq!(result.medications[0].instructions, "glycemic control");
    }

    #[test]
    fn confidence_forms() {
        let cases = [
            (json!(0.85), 0.85),
            (json!("0.6"), 0.6),
            (json!(85), 0.85),
            (json!("90%"), 0.9),
            (json!(250), 1.0),
            (json!(-3), 0.0),
            (json!("high"), 0.0),
        ];
        for (raw, expected) in cases {
            let (result, _) = coerce(&object(json!({ "confidence": raw })));
            assert!((result.confidence - expected).abs() < 1e-9, "{raw} -> {}", result.confidence);
        }
    }
}
