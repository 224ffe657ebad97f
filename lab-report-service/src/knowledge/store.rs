use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::KnowledgeChunk;

/// Payload for appending a chunk at runtime; the store assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChunk {
    pub category: String,
    pub keywords: Vec<String>,
    pub content: String,
}

/// Shared, append-only collection of knowledge chunks.
///
/// Readers take a cheap `Arc` snapshot; appends build a new vector and swap it in.
pub struct KnowledgeStore {
    chunks: RwLock<Arc<Vec<KnowledgeChunk>>>,
    path: Option<PathBuf>,
}

impl KnowledgeStore {
    pub fn in_memory(chunks: Vec<KnowledgeChunk>) -> Self {
        Self {
            chunks: RwLock::new(Arc::new(chunks)),
            path: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::in_memory(default_chunks())
    }

    /// Load chunks from `path`, or generate the defaults and persist them there.
    pub fn load_or_generate(path: &Path) -> Self {
        let chunks = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<Vec<KnowledgeChunk>>(&raw) {
                Ok(chunks) => {
                    info!(path = %path.display(), count = chunks.len(), "Loaded knowledge store");
                    Some(chunks.into_iter().map(tidy).collect())
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Knowledge store file is corrupt, regenerating");
                    None
                }
            },
            Err(_) => None,
        };

        let generated = chunks.is_none();
        let store = Self {
            chunks: RwLock::new(Arc::new(chunks.unwrap_or_else(default_chunks))),
            path: Some(path.to_path_buf()),
        };
        if generated {
            store.persist();
        }
        store
    }

    pub fn snapshot(&self) -> Arc<Vec<KnowledgeChunk>> {
        match self.chunks.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a chunk; existing chunks are never modified.
    pub fn add_chunk(&self, new: NewChunk) -> KnowledgeChunk {
        let chunk = {
            let mut guard = match self.chunks.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let chunk = KnowledgeChunk {
                id: format!("kb-{}", guard.len() + 1),
                category: new.category.trim().to_lowercase(),
                keywords: new
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
                content: new.content,
            };
            let mut next: Vec<KnowledgeChunk> = (**guard).clone();
            next.push(chunk.clone());
            *guard = Arc::new(next);
            chunk
        };

        info!(chunk_id = %chunk.id, category = %chunk.category, "Knowledge chunk added");
        self.persist();
        chunk
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let snapshot = self.snapshot();
        let result = serde_json::to_string_pretty(snapshot.as_slice())
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));

        match result {
            Ok(()) => info!(path = %path.display(), count = snapshot.len(), "Knowledge store persisted"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to persist knowledge store"),
        }
    }
}

/// Normalise a chunk read from disk: trimmed, lowercase category and keywords with blanks
/// removed. A hand-edited file may carry `""`, which would otherwise match any query.
fn tidy(mut chunk: KnowledgeChunk) -> KnowledgeChunk {
    chunk.category = chunk.category.trim().to_lowercase();
    chunk.keywords = chunk
        .keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    chunk
}

fn chunk(id: &str, category: &str, keywords: &[&str], content: &str) -> KnowledgeChunk {
    KnowledgeChunk {
        id: id.to_string(),
        category: category.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect::<BTreeSet<_>>(),
        content: content.to_string(),
    }
}

/// Built-in reference material injected into analysis prompts.
pub fn default_chunks() -> Vec<KnowledgeChunk> {
    vec![
        chunk(
            "kb-1",
            "diabetes",
            &["hba1c", "a1c", "glycated", "diabetes", "insulin", "metformin"],
            "HbA1c reflects average blood glucose over about three months. Below 5.7% is normal, \
             5.7-6.4% indicates prediabetes and 6.5% or higher is consistent with diabetes. Values of \
             8% or more indicate poor control; 10% or more warrants urgent review of therapy.",
        ),
        chunk(
            "kb-2",
            "glucose",
            &["glucose", "blood sugar", "fasting", "fbs", "hyperglycemia", "hypoglycemia"],
            "Fasting plasma glucose of 70-99 mg/dL is normal, 100-125 mg/dL indicates impaired fasting \
             glucose and 126 mg/dL or higher on two occasions indicates diabetes. Readings above \
             250 mg/dL risk ketoacidosis or hyperosmolar states and need prompt attention.",
        ),
        chunk(
            "kb-3",
            "lipid profile",
            &["ldl", "hdl", "cholesterol", "triglyceride", "lipid", "statin"],
            "LDL cholesterol below 100 mg/dL is optimal; 160-189 mg/dL is high and 190 mg/dL or more \
             is very high and suggests familial hypercholesterolemia. HDL below 40 mg/dL (men) or \
             50 mg/dL (women) is a risk factor. Triglycerides of 500 mg/dL or more raise pancreatitis risk.",
        ),
        chunk(
            "kb-4",
            "blood pressure",
            &["blood pressure", "systolic", "diastolic", "hypertension", "mmhg"],
            "Normal blood pressure is below 120/80 mmHg. Stage 1 hypertension is 130-139/80-89, stage 2 \
             is 140/90 or higher. Readings of 180/120 or higher are a hypertensive crisis and need \
             same-day evaluation, immediately if chest pain, vision change or neurological signs occur.",
        ),
        chunk(
            "kb-5",
            "kidney function",
            &["creatinine", "egfr", "urea", "kidney", "renal"],
            "Serum creatinine is typically 0.6-1.2 mg/dL. Rising creatinine with falling eGFR indicates \
             reduced kidney function; eGFR below 60 for three months defines chronic kidney disease. \
             Many drugs, including metformin and NSAIDs, need dose review when kidney function falls.",
        ),
        chunk(
            "kb-6",
            "liver function",
            &["alanine", "aspartate", "bilirubin", "alkaline phosphatase", "liver", "ggt"],
            "ALT and AST above three times the upper reference limit suggest significant hepatocellular \
             injury. Isolated GGT elevation is common with alcohol use. Raised bilirubin with raised \
             enzymes needs evaluation for obstruction or hepatitis.",
        ),
        chunk(
            "kb-7",
            "thyroid",
            &["tsh", "free t3", "free t4", "thyroid", "hypothyroidism", "hyperthyroidism"],
            "TSH of roughly 0.4-4.0 mIU/L is normal. High TSH with low free T4 indicates primary \
             hypothyroidism; low TSH with high free T4 indicates hyperthyroidism. Subclinical changes \
             are usually rechecked in 6-12 weeks before treatment.",
        ),
        chunk(
            "kb-8",
            "complete blood count",
            &["hemoglobin", "haemoglobin", "wbc", "platelet", "anemia", "cbc", "hematocrit"],
            "Hemoglobin below 13 g/dL in men or 12 g/dL in women indicates anemia; below 7 g/dL is \
             usually an indication for urgent care. White cell counts above 11,000/uL suggest infection \
             or inflammation. Platelets below 50,000/uL carry bleeding risk.",
        ),
        chunk(
            "kb-9",
            "electrolytes",
            &["potassium", "sodium", "electrolyte", "chloride", "hyperkalemia"],
            "Potassium of 3.5-5.0 mmol/L is normal. Values of 6.0 mmol/L or more can cause dangerous \
             arrhythmias and need emergency assessment. Sodium below 125 mmol/L can cause confusion \
             and seizures.",
        ),
        chunk(
            "kb-10",
            "vitamin d",
            &["vitamin d", "25-oh", "calcidiol", "deficiency"],
            "25-hydroxy vitamin D below 20 ng/mL indicates deficiency and 20-29 ng/mL insufficiency. \
             Supplementation is usually started with periodic rechecks after three months.",
        ),
        chunk(
            "kb-11",
            "drug interactions",
            &["warfarin", "aspirin", "anticoagulant", "nsaid", "bleeding", "inr"],
            "Combining warfarin with aspirin or other NSAIDs substantially increases bleeding risk. \
             INR should be monitored closely whenever anticoagulant therapy is combined with antiplatelet \
             or anti-inflammatory drugs.",
        ),
        chunk(
            "kb-12",
            "lifestyle",
            &["diet", "exercise", "weight", "sleep", "smoking", "alcohol", "stress"],
            "At least 150 minutes of moderate aerobic activity per week, a diet rich in vegetables, \
             whole grains and fibre, limited salt and alcohol, smoking cessation and 7-9 hours of sleep \
             improve glucose, lipid and blood pressure control.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_unique_ids() {
        let chunks = default_chunks();
        let ids: BTreeSet<_> = chunks.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids.len(), chunks.len());
    }

    #[test]
    fn add_chunk_appends_without_touching_existing() {
        let store = KnowledgeStore::with_defaults();
        let before = store.snapshot();

        let added = store.add_chunk(NewChunk {
            category: " Iron Studies ".into(),
            keywords: vec!["Ferritin".into(), " ".into()],
            content: "Ferritin below 30 ng/mL suggests iron deficiency.".into(),
        });

        assert_eq!(added.id, format!("kb-{}", before.len() + 1));
        assert_eq!(added.category, "iron studies");
        assert_eq!(added.keywords.len(), 1);
        assert!(added.keywords.contains("ferritin"));
        // Earlier snapshots are unaffected.
        assert_eq!(before.len(), default_chunks().len());
        assert_eq!(store.len(), before.len() + 1);
    }

    #[test]
    fn generates_and_persists_on_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.json");

        let store = KnowledgeStore::load_or_generate(&path);
        assert_eq!(store.len(), default_chunks().len());
        assert!(path.exists());

        store.add_chunk(NewChunk {
            category: "iron".into(),
            keywords: vec!["ferritin".into()],
            content: "Ferritin".into(),
        });

        let reloaded = KnowledgeStore::load_or_generate(&path);
        assert_eq!(reloaded.len(), default_chunks().len() + 1);
    }

    #[test]
    fn blank_keywords_and_categories_are_dropped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.json");
        std::fs::write(
            &path,
            r#"[{"id":"kb-1","category":"  ","keywords":["", " Ferritin ", "  "],"content":"Iron stores."}]"#,
        )
        .unwrap();

        let store = KnowledgeStore::load_or_generate(&path);
        let chunks = store.snapshot();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].category, "");
        assert_eq!(chunks[0].keywords.len(), 1);
        assert!(chunks[0].keywords.contains("ferritin"));
    }

    #[test]
    fn corrupt_file_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.json");
        std::fs::write(&path, "not json").unwrap();

        let store = KnowledgeStore::load_or_generate(&path);
        assert_eq!(store.len(), default_chunks().len());
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("kb-1"));
    }
}
