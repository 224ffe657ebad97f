use std::sync::Arc;

use tracing::{debug, info, warn};

use super::store::KnowledgeStore;
use crate::llm::{ModelRequest, ModelResolver};
use crate::models::{KnowledgeChunk, RetrievalResult};

const KEYWORD_WEIGHT: f32 = 2.0;
const CONTENT_WEIGHT: f32 = 1.0;
const CATEGORY_WEIGHT: f32 = 1.5;
/// Query terms shorter than this are ignored for content matching.
const MIN_TERM_LEN: usize = 4;
const MAX_RANKING_QUERY_CHARS: usize = 2_000;
const RANKING_MAX_TOKENS: u32 = 100;

/// Selects knowledge chunks relevant to a query.
///
/// LLM ranking is preferred when a resolver is attached; any failure there falls back to keyword
/// scoring, so retrieval itself never fails.
pub struct KnowledgeRetriever {
    store: Arc<KnowledgeStore>,
    ranker: Option<Arc<ModelResolver>>,
}

impl KnowledgeRetriever {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self {
            store,
            ranker: None,
        }
    }

    pub fn with_llm_ranking(mut self, resolver: Arc<ModelResolver>) -> Self {
        self.ranker = Some(resolver);
        self
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    pub async fn retrieve(&self, query: &str, top_k: usize) -> RetrievalResult {
        if top_k == 0 || query.trim().is_empty() {
            return RetrievalResult::default();
        }

        if let Some(resolver) = &self.ranker {
            let chunks = self.store.snapshot();
            match llm_rank(resolver, &chunks, query, top_k).await {
                Some(result) => {
                    info!(strategy = "llm", selected = result.chunks.len(), "Knowledge retrieved");
                    return result;
                }
                None => warn!("LLM ranking unavailable, falling back to keyword scoring"),
            }
        }

        let result = self.keyword_retrieve(query, top_k);
        info!(strategy = "keyword", selected = result.chunks.len(), "Knowledge retrieved");
        result
    }

    pub fn keyword_retrieve(&self, query: &str, top_k: usize) -> RetrievalResult {
        let query_lower = query.to_lowercase();
        let terms = query_terms(&query_lower);
        let chunks = self.store.snapshot();

        let mut scored: Vec<(f32, &KnowledgeChunk)> = chunks
            .iter()
            .map(|chunk| (keyword_score(chunk, &query_lower, &terms), chunk))
            .filter(|(score, _)| *score > 0.0)
            .collect();

        // Stable sort keeps store order among equal scores.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(top_k);

        RetrievalResult {
            scores: scored.iter().map(|(score, _)| *score).collect(),
            chunks: scored.into_iter().map(|(_, chunk)| chunk.clone()).collect(),
        }
    }
}

/// Score one chunk against an already-lowercased query.
pub fn keyword_score(chunk: &KnowledgeChunk, query_lower: &str, terms: &[String]) -> f32 {
    let mut score = 0.0;

    for keyword in chunk.keywords.iter().filter(|k| !k.trim().is_empty()) {
        if query_lower.contains(keyword.to_lowercase().as_str()) {
            score += KEYWORD_WEIGHT;
        }
    }

    let content_lower = chunk.content.to_lowercase();
    if terms.iter().any(|term| content_lower.contains(term.as_str())) {
        score += CONTENT_WEIGHT;
    }

    let category = chunk.category.trim().to_lowercase();
    if !category.is_empty() && query_lower.contains(category.as_str()) {
        score += CATEGORY_WEIGHT;
    }

    score
}

fn query_terms(query_lower: &str) -> Vec<String> {
    let mut terms: Vec<String> = query_lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TERM_LEN)
        .map(str::to_string)
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

async fn llm_rank(
    resolver: &ModelResolver,
    chunks: &[KnowledgeChunk],
    query: &str,
    top_k: usize,
) -> Option<RetrievalResult> {
    if chunks.is_empty() {
        return None;
    }

    let prompt = ranking_prompt(chunks, query, top_k);
    let reply = match resolver
        .invoke_with_fallback(&ModelRequest::text(prompt, RANKING_MAX_TOKENS))
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "Knowledge ranking call failed");
            return None;
        }
    };

    debug!(model = %reply.model, response = %reply.text, "Knowledge ranking response");
    let indices = parse_index_array(&reply.text, chunks.len())?;
    let selected: Vec<usize> = indices.into_iter().take(top_k).collect();
    let count = selected.len();

    Some(RetrievalResult {
        chunks: selected.iter().map(|&i| chunks[i].clone()).collect(),
        scores: (0..count).map(|rank| (count - rank) as f32 / count as f32).collect(),
    })
}

fn ranking_prompt(chunks: &[KnowledgeChunk], query: &str, top_k: usize) -> String {
    let listing = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let keywords: Vec<&str> = chunk.keywords.iter().map(String::as_str).collect();
            format!("{}: [{}] {}", i, chunk.category, keywords.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n");
    let query: String = query.chars().take(MAX_RANKING_QUERY_CHARS).collect();

    format!(
        r#"You rank medical reference notes by relevance to a lab report.

Notes (index: [category] keywords):
{listing}

Lab report excerpt:
{query}

Return ONLY a JSON array with the indices of the {top_k} most relevant notes, most relevant first, e.g. [3, 0, 7]."#
    )
}

/// Parse a model reply into valid, de-duplicated chunk indices. `None` if nothing usable is found.
pub fn parse_index_array(text: &str, len: usize) -> Option<Vec<usize>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }

    let values: Vec<serde_json::Value> = serde_json::from_str(&text[start..=end]).ok()?;
    let mut indices = Vec::new();
    for value in values {
        let index = match &value {
            serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize),
            serde_json::Value::String(s) => s.trim().parse::<usize>().ok(),
            _ => None,
        };
        if let Some(index) = index {
            if index < len && !indices.contains(&index) {
                indices.push(index);
            }
        }
    }

    if indices.is_empty() { None } else { Some(indices) }
}

/// Render chunks as a labelled block for the analysis prompt. Empty input renders nothing.
pub fn format_for_prompt(chunks: &[KnowledgeChunk]) -> String {
    if chunks.is_empty() {
        return String::new();
    }

    let body = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("[{}] {}: {}", i + 1, chunk.category.to_uppercase(), chunk.content))
        .collect::<Vec<_>>()
        .join("\n");

    format!("\n\nRELEVANT MEDICAL KNOWLEDGE (use as reference when interpreting values):\n{body}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelCallError;
    use crate::knowledge::store::default_chunks;
    use crate::llm::resolver::tests::ScriptedModel;
    use std::time::Duration;

    fn retriever() -> KnowledgeRetriever {
        KnowledgeRetriever::new(Arc::new(KnowledgeStore::with_defaults()))
    }

    fn resolver_with(reply: Result<String, ModelCallError>) -> Arc<ModelResolver> {
        Arc::new(ModelResolver::new(
            Arc::new(ScriptedModel::new(vec![("m", reply)])),
            vec!["m".to_string()],
            Duration::from_secs(5),
        ))
    }

    #[test]
    fn scoring_weights() {
        let chunk = KnowledgeChunk {
            id: "x".into(),
            category: "lipid profile".into(),
            keywords: ["ldl".to_string(), "hdl".to_string()].into_iter().collect(),
            content: "Cholesterol guidance".into(),
        };

        let query = "ldl and hdl cholesterol in a lipid profile";
        let terms = query_terms(query);
        // two keywords + content term + category
        assert_eq!(keyword_score(&chunk, query, &terms), 2.0 * 2.0 + 1.0 + 1.5);
        assert_eq!(keyword_score(&chunk, "thyroid", &query_terms("thyroid")), 0.0);
    }

    #[test]
    fn blank_keywords_and_category_match_nothing() {
        let chunk = KnowledgeChunk {
            id: "x".into(),
            category: " ".into(),
            keywords: [String::new(), "  ".to_string()].into_iter().collect(),
            content: "Ferritin guidance".into(),
        };

        let query = "tsh 2.1 miu/l";
        assert_eq!(keyword_score(&chunk, query, &query_terms(query)), 0.0);
    }

    #[test]
    fn keyword_retrieval_ranks_and_limits() {
        let result = retriever().keyword_retrieve("HbA1c 10.5% and fasting glucose 260", 2);

        assert_eq!(result.chunks.len(), 2);
        assert_eq!(result.scores.len(), 2);
        assert!(result.scores[0] >= result.scores[1]);
        let ids: Vec<&str> = result.chunks.iter().map(|c| c.id.as_str()).collect();
        assert!(ids.contains(&"kb-1"));
        assert!(ids.contains(&"kb-2"));
    }

    #[test]
    fn unrelated_query_returns_nothing() {
        let result = retriever().keyword_retrieve("zzz qqq", 3);
        assert!(result.chunks.is_empty());
    }

    #[tokio::test]
    async fn llm_ranking_is_preferred() {
        let retriever = retriever().with_llm_ranking(resolver_with(Ok("Sure: [4, 4, 99, 0]".into())));
        let result = retriever.retrieve("creatinine 2.7", 3).await;

        let ids: Vec<&str> = result.chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["kb-5", "kb-1"]);
        assert_eq!(result.scores, vec![1.0, 0.5]);
    }

    #[tokio::test]
    async fn llm_parse_failure_falls_back_to_keywords() {
        let retriever = retriever().with_llm_ranking(resolver_with(Ok("I think note four".into())));
        let result = retriever.retrieve("creatinine 2.7 mg/dL", 3).await;
        assert_eq!(result.chunks[0].id, "kb-5");
    }

    #[tokio::test]
    async fn llm_call_failure_falls_back_to_keywords() {
        let retriever = retriever()
            .with_llm_ranking(resolver_with(Err(ModelCallError::Quota("429".into()))));
        let result = retriever.retrieve("potassium 6.3", 3).await;
        assert_eq!(result.chunks[0].id, "kb-9");
    }

    #[test]
    fn index_parsing_handles_strings_and_noise() {
        assert_eq!(parse_index_array("```json\n[\"2\", 1]\n```", 5), Some(vec![2, 1]));
        assert_eq!(parse_index_array("[]", 5), None);
        assert_eq!(parse_index_array("no array", 5), None);
        assert_eq!(parse_index_array("[7, 8]", 5), None);
    }

    #[test]
    fn empty_chunk_list_formats_to_nothing() {
        assert_eq!(format_for_prompt(&[]), "");
        let block = format_for_prompt(&default_chunks()[..1]);
        assert!(block.contains("RELEVANT MEDICAL KNOWLEDGE"));
        assert!(block.contains("[1] DIABETES"));
    }
}
