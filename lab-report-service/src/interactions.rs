//! Pairwise drug interaction lookup over a static table.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use tracing::debug;

use crate::models::{InteractionFinding, InteractionSeverity, Medication};
use InteractionSeverity::{Contraindicated, Mild, Moderate, Severe};

struct InteractionRule {
    a: &'static str,
    b: &'static str,
    severity: InteractionSeverity,
    description: &'static str,
    recommendation: &'static str,
}

const fn rule(
    a: &'static str,
    b: &'static str,
    severity: InteractionSeverity,
    description: &'static str,
    recommendation: &'static str,
) -> InteractionRule {
    InteractionRule {
        a,
        b,
        severity,
        description,
        recommendation,
    }
}

const TABLE: &[InteractionRule] = &[
    rule(
        "warfarin",
        "aspirin",
        Severe,
        "Aspirin adds antiplatelet effect to warfarin anticoagulation and markedly raises bleeding risk.",
        "Avoid the combination unless specifically indicated; monitor INR and signs of bleeding.",
    ),
    rule(
        "warfarin",
        "ibuprofen",
        Severe,
        "NSAIDs increase bleeding risk with warfarin and can irritate the gastric lining.",
        "Prefer paracetamol for pain; if unavoidable, monitor INR closely.",
    ),
    rule(
        "warfarin",
        "naproxen",
        Severe,
        "NSAIDs increase bleeding risk with warfarin and can irritate the gastric lining.",
        "Prefer paracetamol for pain; if unavoidable, monitor INR closely.",
    ),
    rule(
        "clopidogrel",
        "omeprazole",
        Moderate,
        "Omeprazole inhibits CYP2C19 and reduces activation of clopidogrel.",
        "Consider pantoprazole or another acid suppressant instead.",
    ),
    rule(
        "sildenafil",
        "nitroglycerin",
        Contraindicated,
        "PDE5 inhibitors with nitrates can cause profound, life-threatening hypotension.",
        "Do not combine.",
    ),
    rule(
        "sildenafil",
        "isosorbide",
        Contraindicated,
        "PDE5 inhibitors with nitrates can cause profound, life-threatening hypotension.",
        "Do not combine.",
    ),
    rule(
        "simvastatin",
        "clarithromycin",
        Contraindicated,
        "Clarithromycin strongly inhibits CYP3A4, raising simvastatin levels and rhabdomyolysis risk.",
        "Suspend simvastatin during the antibiotic course or choose another antibiotic.",
    ),
    rule(
        "metformin",
        "contrast",
        Moderate,
        "Iodinated contrast can impair kidney function and precipitate metformin-associated lactic acidosis.",
        "Withhold metformin around contrast imaging and recheck kidney function before restarting.",
    ),
    rule(
        "lisinopril",
        "spironolactone",
        Severe,
        "ACE inhibitors with potassium-sparing diuretics can cause dangerous hyperkalemia.",
        "Monitor potassium and kidney function closely; avoid in renal impairment.",
    ),
    rule(
        "lisinopril",
        "potassium",
        Moderate,
        "ACE inhibitors reduce potassium excretion; supplements add to hyperkalemia risk.",
        "Check serum potassium before and during supplementation.",
    ),
    rule(
        "fluoxetine",
        "tramadol",
        Severe,
        "Both raise serotonergic activity; the combination risks serotonin syndrome and seizures.",
        "Avoid if possible; otherwise use the lowest doses and watch for agitation, tremor or fever.",
    ),
    rule(
        "methotrexate",
        "trimethoprim",
        Severe,
        "Trimethoprim adds antifolate effect and reduces methotrexate clearance, risking bone marrow suppression.",
        "Avoid the combination; if required, monitor blood counts.",
    ),
    rule(
        "digoxin",
        "amiodarone",
        Severe,
        "Amiodarone raises digoxin levels and can cause digoxin toxicity.",
        "Halve the digoxin dose when starting amiodarone and monitor levels.",
    ),
    rule(
        "ciprofloxacin",
        "tizanidine",
        Contraindicated,
        "Ciprofloxacin inhibits CYP1A2, sharply increasing tizanidine levels with severe hypotension and sedation.",
        "Do not combine.",
    ),
    rule(
        "aspirin",
        "ibuprofen",
        Mild,
        "Ibuprofen can blunt the antiplatelet effect of low-dose aspirin and adds gastrointestinal risk.",
        "Take aspirin at least 30 minutes before ibuprofen, or use an alternative analgesic.",
    ),
];

/// Normalized name to the rules it takes part in, indexed from both sides.
static ADJACENCY: LazyLock<HashMap<&'static str, Vec<&'static InteractionRule>>> =
    LazyLock::new(|| {
        let mut map: HashMap<&'static str, Vec<&'static InteractionRule>> = HashMap::new();
        for rule in TABLE {
            map.entry(rule.a).or_default().push(rule);
            map.entry(rule.b).or_default().push(rule);
        }
        map
    });

/// Lowercase, collapse whitespace and drop any strength suffix (`"Aspirin  75mg"` -> `"aspirin"`).
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .take_while(|word| !word.chars().any(|c| c.is_ascii_digit()))
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// The table key a normalized name refers to: the whole name, or else its first word that is a key
/// (`"warfarin sodium"` -> `"warfarin"`).
fn table_key(normalized: &str) -> Option<&'static str> {
    if let Some((key, _)) = ADJACENCY.get_key_value(normalized) {
        return Some(*key);
    }
    normalized
        .split(' ')
        .find_map(|word| ADJACENCY.get_key_value(word).map(|(key, _)| *key))
}

fn lookup(a: &str, b: &str) -> Option<&'static InteractionRule> {
    ADJACENCY.get(a)?.iter().copied().find(|rule| {
        (rule.a == a && rule.b == b) || (rule.a == b && rule.b == a)
    })
}

/// Every interacting pair in `medications`, at most one finding per pair.
///
/// Findings name the pair in table order, so the result does not depend on input order.
pub fn check_interactions(medications: &[Medication]) -> Vec<InteractionFinding> {
    let resolved: Vec<(&str, &'static str)> = medications
        .iter()
        .filter_map(|m| {
            let key = table_key(&normalize_name(&m.name))?;
            Some((m.name.trim(), key))
        })
        .collect();

    let mut seen: HashSet<(&'static str, &'static str)> = HashSet::new();
    let mut findings = Vec::new();

    for (i, (name_i, key_i)) in resolved.iter().enumerate() {
        for (name_j, key_j) in resolved.iter().skip(i + 1) {
            if key_i == key_j {
                continue;
            }
            let Some(rule) = lookup(key_i, key_j) else {
                continue;
            };
            if !seen.insert((rule.a, rule.b)) {
                continue;
            }

            let pair = if rule.a == *key_i {
                (name_i.to_string(), name_j.to_string())
            } else {
                (name_j.to_string(), name_i.to_string())
            };
            debug!(a = %pair.0, b = %pair.1, severity = ?rule.severity, "Drug interaction found");
            findings.push(InteractionFinding {
                medication_pair: pair,
                severity: rule.severity,
                description: rule.description.to_string(),
                recommendation: rule.recommendation.to_string(),
            });
        }
    }

    findings
}
