//! Deterministic safety alerts derived from fixed thresholds.
//!
//! Severity here is recomputed from the numeric values; the model's own per-test labels are
//! never consulted.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    Alert, AlertSeverity, AlertType, ConditionSeverity, ExtractedTest, IdentifiedCondition,
    InteractionFinding, InteractionSeverity, TestSeverity,
};

static BLOOD_PRESSURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2,3})\s*/\s*(\d{2,3})").expect("blood pressure pattern is valid")
});

/// The first `systolic/diastolic` pair in `text`, e.g. `"150/125"` from `"150/125 mmHg"`.
pub fn find_blood_pressure(text: &str) -> Option<&str> {
    BLOOD_PRESSURE.find(text).map(|m| m.as_str())
}

/// Cutoffs are inclusive lower bounds.
#[derive(Debug, Clone, Copy)]
struct Cutoffs {
    critical: f64,
    high: f64,
    moderate: f64,
}

#[derive(Debug, Clone, Copy)]
enum Measure {
    Single(Cutoffs),
    /// Systolic and diastolic cutoffs; either one crossing is enough.
    BloodPressure { systolic: Cutoffs, diastolic: Cutoffs },
}

/// How a reported value is brought into the unit a rule's cutoffs are written in.
#[derive(Debug, Clone, Copy)]
enum Convert {
    Multiply(f64),
    Divide(f64),
    /// IFCC mmol/mol to NGSP percent.
    IfccToNgsp,
}

impl Convert {
    fn apply(self, value: f64) -> f64 {
        match self {
            Convert::Multiply(factor) => value * factor,
            Convert::Divide(divisor) => value / divisor,
            Convert::IfccToNgsp => value * 0.0915 + 2.15,
        }
    }
}

const SAME: Convert = Convert::Multiply(1.0);

struct ThresholdRule {
    label: &'static str,
    keys: &'static [&'static str],
    /// Related tests that share a key but are measured on a different scale.
    excludes: &'static [&'static str],
    /// Unit the cutoffs are written in.
    unit: &'static str,
    /// Recognised units, compared as prefixes of the normalized unit string.
    conversions: &'static [(&'static str, Convert)],
    measure: Measure,
}

const fn cutoffs(critical: f64, high: f64, moderate: f64) -> Cutoffs {
    Cutoffs {
        critical,
        high,
        moderate,
    }
}

/// First matching rule wins, so more specific names come first.
const RULES: &[ThresholdRule] = &[
    ThresholdRule {
        label: "HbA1c",
        keys: &["hba1c", "a1c", "glycated", "glycosylated"],
        excludes: &["albumin"],
        unit: "%",
        conversions: &[("%", SAME), ("mmol/mol", Convert::IfccToNgsp)],
        measure: Measure::Single(cutoffs(10.0, 8.0, 6.5)),
    },
    ThresholdRule {
        label: "glucose",
        keys: &["glucose", "blood sugar", "fbs"],
        excludes: &["urine", "ratio", "csf", "tolerance"],
        unit: "mg/dL",
        conversions: &[("mg/dl", SAME), ("mmol/l", Convert::Multiply(18.0))],
        measure: Measure::Single(cutoffs(250.0, 180.0, 126.0)),
    },
    ThresholdRule {
        label: "LDL cholesterol",
        keys: &["ldl"],
        excludes: &["vldl", "ratio"],
        unit: "mg/dL",
        conversions: &[("mg/dl", SAME), ("mmol/l", Convert::Multiply(38.67))],
        measure: Measure::Single(cutoffs(190.0, 160.0, 130.0)),
    },
    ThresholdRule {
        label: "total cholesterol",
        keys: &["total cholesterol"],
        excludes: &["ratio"],
        unit: "mg/dL",
        conversions: &[("mg/dl", SAME), ("mmol/l", Convert::Multiply(38.67))],
        measure: Measure::Single(cutoffs(300.0, 240.0, 200.0)),
    },
    ThresholdRule {
        label: "triglycerides",
        keys: &["triglyceride"],
        excludes: &["ratio"],
        unit: "mg/dL",
        conversions: &[("mg/dl", SAME), ("mmol/l", Convert::Multiply(88.57))],
        measure: Measure::Single(cutoffs(500.0, 200.0, 150.0)),
    },
    ThresholdRule {
        label: "creatinine",
        keys: &["creatinine"],
        excludes: &["ratio", "clearance", "urine", "egfr", "gfr"],
        unit: "mg/dL",
        conversions: &[("mg/dl", SAME), ("umol/l", Convert::Divide(88.4))],
        measure: Measure::Single(cutoffs(2.5, 1.8, 1.3)),
    },
    ThresholdRule {
        label: "potassium",
        keys: &["potassium"],
        excludes: &["urine", "ratio"],
        unit: "mmol/L",
        conversions: &[("mmol/l", SAME), ("meq/l", SAME)],
        measure: Measure::Single(cutoffs(6.0, 5.5, 5.1)),
    },
    ThresholdRule {
        label: "blood pressure",
        keys: &["blood pressure", "systolic", "diastolic"],
        excludes: &[],
        unit: "mmHg",
        // The unit often carries the reading itself, so it is not used to gate this rule.
        conversions: &[],
        measure: Measure::BloodPressure {
            systolic: cutoffs(180.0, 160.0, 140.0),
            diastolic: cutoffs(120.0, 100.0, 90.0),
        },
    },
];

/// Lowercase without whitespace, micro signs spelled `u` (`"µmol / L"` -> `"umol/l"`).
fn unit_key(unit: &str) -> String {
    unit.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '\u{b5}' | '\u{3bc}' => 'u',
            other => other,
        })
        .collect::<String>()
        .to_lowercase()
}

impl ThresholdRule {
    fn matches(&self, name: &str) -> bool {
        self.keys.iter().any(|key| name.contains(key))
            && !self.excludes.iter().any(|word| name.contains(word))
    }

    /// The value in this rule's unit. A missing unit is taken to be the rule's unit; an
    /// unrecognised one yields `None`.
    fn normalize_value(&self, value: f64, unit: &str) -> Option<f64> {
        let key = unit_key(unit);
        if key.is_empty() {
            return Some(value);
        }
        self.conversions
            .iter()
            .find(|(prefix, _)| key.starts_with(prefix))
            .map(|(_, convert)| convert.apply(value))
    }
}

/// A test value that crossed one of the fixed thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdHit {
    pub level: TestSeverity,
    pub label: &'static str,
    /// Human-readable reading and the cutoff it crossed.
    pub reading: String,
    pub cutoff: String,
}

/// Re-derive the severity of one test from the threshold table. `None` when no rule matches or
/// the value is below every cutoff.
pub fn classify_test(test: &ExtractedTest) -> Option<ThresholdHit> {
    let name = test.name.to_lowercase();
    let rule = RULES.iter().find(|rule| rule.matches(&name))?;

    match rule.measure {
        Measure::Single(c) => {
            let Some(value) = rule.normalize_value(test.value, &test.unit) else {
                debug!(test = %test.name, unit = %test.unit, "Unit not recognised, threshold skipped");
                return None;
            };
            let (level, cutoff) = level_of(value, c)?;
            let mut reading = format!("{} {}", test.value, test.unit).trim().to_string();
            if value != test.value {
                reading.push_str(&format!(" ({value:.1} {})", rule.unit));
            }
            Some(ThresholdHit {
                level,
                label: rule.label,
                reading,
                cutoff: format!("{cutoff} {}", rule.unit),
            })
        }
        Measure::BloodPressure {
            systolic,
            diastolic,
        } => {
            let (sys, dia) = blood_pressure_reading(test, &name);
            let sys_level = sys.and_then(|v| level_of(v, systolic));
            let dia_level = dia.and_then(|v| level_of(v, diastolic));
            let level = match (sys_level, dia_level) {
                (Some((a, _)), Some((b, _))) => a.max(b),
                (Some((a, _)), None) | (None, Some((a, _))) => a,
                (None, None) => return None,
            };
            let (sys_cut, dia_cut) = match level {
                TestSeverity::Critical => (systolic.critical, diastolic.critical),
                TestSeverity::High => (systolic.high, diastolic.high),
                _ => (systolic.moderate, diastolic.moderate),
            };
            let reading = match (sys, dia) {
                (Some(s), Some(d)) => format!("{s}/{d} mmHg"),
                (Some(s), None) => format!("systolic {s} mmHg"),
                (None, Some(d)) => format!("diastolic {d} mmHg"),
                (None, None) => String::new(),
            };
            Some(ThresholdHit {
                level,
                label: rule.label,
                reading,
                cutoff: format!("{sys_cut}/{dia_cut} mmHg"),
            })
        }
    }
}

/// Checked critical first so a value above both cutoffs is always critical.
fn level_of(value: f64, c: Cutoffs) -> Option<(TestSeverity, f64)> {
    if value >= c.critical {
        Some((TestSeverity::Critical, c.critical))
    } else if value >= c.high {
        Some((TestSeverity::High, c.high))
    } else if value >= c.moderate {
        Some((TestSeverity::Moderate, c.moderate))
    } else {
        None
    }
}

/// `systolic/diastolic` from the unit (or name) string; otherwise the bare value, read as
/// diastolic only when the test is explicitly a diastolic measurement.
fn blood_pressure_reading(test: &ExtractedTest, name: &str) -> (Option<f64>, Option<f64>) {
    let captures = BLOOD_PRESSURE
        .captures(&test.unit)
        .or_else(|| BLOOD_PRESSURE.captures(&test.name));
    if let Some(caps) = captures {
        let sys = caps.get(1).and_then(|m| m.as_str().parse().ok());
        let dia = caps.get(2).and_then(|m| m.as_str().parse().ok());
        return (sys, dia);
    }

    if name.contains("diastolic") && !name.contains("systolic") {
        (None, Some(test.value))
    } else {
        (Some(test.value), None)
    }
}

struct Draft {
    alert_type: AlertType,
    severity: AlertSeverity,
    title: String,
    message: String,
    subject_ref: String,
}

pub fn generate_alerts(
    tests: &[ExtractedTest],
    conditions: &[IdentifiedCondition],
    overall_severity: TestSeverity,
) -> Vec<Alert> {
    generate_alerts_at(tests, conditions, overall_severity, Utc::now())
}

/// Same as [`generate_alerts`] with an explicit creation time. Identical inputs at an identical
/// time give identical alerts, ids included.
pub fn generate_alerts_at(
    tests: &[ExtractedTest],
    conditions: &[IdentifiedCondition],
    overall_severity: TestSeverity,
    at: DateTime<Utc>,
) -> Vec<Alert> {
    let mut drafts = Vec::new();

    for test in tests {
        let Some(hit) = classify_test(test) else {
            continue;
        };
        let draft = match hit.level {
            TestSeverity::Critical | TestSeverity::High => {
                let (severity, word) = if hit.level == TestSeverity::Critical {
                    (AlertSeverity::Critical, "Critical")
                } else {
                    (AlertSeverity::High, "High")
                };
                Draft {
                    alert_type: AlertType::CriticalValue,
                    severity,
                    title: format!("{word} {} value", test.name),
                    message: format!(
                        "{} reading of {} is at or above the {} threshold of {}.",
                        hit.label,
                        hit.reading,
                        word.to_lowercase(),
                        hit.cutoff
                    ),
                    subject_ref: test.name.clone(),
                }
            }
            _ => Draft {
                alert_type: AlertType::FollowUp,
                severity: AlertSeverity::Medium,
                title: format!("Follow up on {}", test.name),
                message: format!(
                    "{} reading of {} is above the target range (threshold {}). Repeat testing is advised.",
                    hit.label, hit.reading, hit.cutoff
                ),
                subject_ref: test.name.clone(),
            },
        };
        drafts.push(draft);
    }

    for condition in conditions {
        let severity = match condition.severity {
            ConditionSeverity::Critical => AlertSeverity::Critical,
            ConditionSeverity::High => AlertSeverity::High,
            _ => continue,
        };
        let explanation = if condition.explanation.is_empty() {
            "Flagged by the report analysis.".to_string()
        } else {
            condition.explanation.clone()
        };
        drafts.push(Draft {
            alert_type: AlertType::ConditionWarning,
            severity,
            title: format!("Possible {}", condition.condition_name),
            message: format!("{explanation} Likelihood: {}.", condition.likelihood.label()),
            subject_ref: condition.condition_name.clone(),
        });
    }

    if overall_severity == TestSeverity::Critical {
        drafts.push(Draft {
            alert_type: AlertType::FollowUp,
            severity: AlertSeverity::Critical,
            title: "Urgent medical review recommended".to_string(),
            message: "The overall assessment of this report is critical. Contact a healthcare \
                      provider promptly."
                .to_string(),
            subject_ref: "overall".to_string(),
        });
    }

    finish(drafts, at)
}

/// Alerts for interaction findings among the recommended medications.
pub fn interaction_alerts_at(findings: &[InteractionFinding], at: DateTime<Utc>) -> Vec<Alert> {
    let drafts = findings
        .iter()
        .map(|finding| {
            let (a, b) = &finding.medication_pair;
            let severity = match finding.severity {
                InteractionSeverity::Contraindicated => AlertSeverity::Critical,
                InteractionSeverity::Severe => AlertSeverity::High,
                InteractionSeverity::Moderate => AlertSeverity::Medium,
                InteractionSeverity::Mild => AlertSeverity::Low,
            };
            Draft {
                alert_type: AlertType::MedicationInteraction,
                severity,
                title: format!("Interaction: {a} + {b}"),
                message: format!("{} {}", finding.description, finding.recommendation),
                subject_ref: format!("{a}+{b}"),
            }
        })
        .collect();

    finish(drafts, at)
}

/// Order by severity (stable, so generation order breaks ties) and assign ids.
fn finish(mut drafts: Vec<Draft>, at: DateTime<Utc>) -> Vec<Alert> {
    drafts.sort_by(|a, b| b.severity.cmp(&a.severity));
    let stamp = at.to_rfc3339();

    drafts
        .into_iter()
        .enumerate()
        .map(|(ordinal, draft)| {
            let seed = format!(
                "{stamp}|{:?}|{}|{ordinal}",
                draft.alert_type, draft.subject_ref
            );
            Alert {
                id: Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()),
                alert_type: draft.alert_type,
                severity: draft.severity,
                title: draft.title,
                message: draft.message,
                subject_ref: draft.subject_ref,
                timestamp: at,
            }
        })
        .collect()
}
