use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_CANDIDATES: &[&str] = &[
    "google/gemini-2.0-flash-001",
    "google/gemini-flash-1.5",
    "openai/gpt-4.1-mini",
];

/// Configuration for the lab report service, read from the environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_key: String,
    pub base_url: String,
    pub model_candidates: Vec<String>,
    pub model_timeout: Duration,
    pub max_tokens: u32,
    pub knowledge_store_path: Option<PathBuf>,
    pub knowledge_top_k: usize,
    pub llm_ranking: bool,
    pub max_document_chars: usize,
    pub port: u16,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup, so tests need not touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENROUTER_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingCredential("OPENROUTER_API_KEY"))?;

        let model_candidates = match lookup("MODEL_CANDIDATES") {
            Some(raw) => parse_candidates(&raw),
            None => DEFAULT_CANDIDATES.iter().map(|s| s.to_string()).collect(),
        };
        if model_candidates.is_empty() {
            return Err(ConfigError::NoCandidates);
        }

        Ok(Self {
            api_key,
            base_url: lookup("OPENROUTER_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model_candidates,
            model_timeout: Duration::from_secs(parse_or(&lookup, "MODEL_TIMEOUT_SECS", 60)),
            max_tokens: parse_or(&lookup, "MODEL_MAX_TOKENS", 4000),
            knowledge_store_path: lookup("KNOWLEDGE_STORE_PATH").map(PathBuf::from),
            knowledge_top_k: parse_or(&lookup, "KNOWLEDGE_TOP_K", 3),
            llm_ranking: parse_or(&lookup, "LLM_RANKING", true),
            max_document_chars: parse_or(&lookup, "MAX_DOCUMENT_CHARS", 30_000),
            port: parse_or(&lookup, "PORT", 3000),
        })
    }
}

fn parse_candidates(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, ?default, "Invalid config value, using default");
            default
        }),
    }
}
