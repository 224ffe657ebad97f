use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::ServiceConfig;
use crate::error::{ConfigError, ModelCallError, preview};

/// One piece of a multimodal prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { mime_type: String, data_base64: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub parts: Vec<ContentPart>,
    pub max_tokens: u32,
}

impl ModelRequest {
    pub fn text(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            parts: vec![ContentPart::Text {
                text: prompt.into(),
            }],
            max_tokens,
        }
    }

    /// The cheapest possible request, used to check that a model answers at all.
    pub fn probe() -> Self {
        Self::text("Reply with the single word: ok", 5)
    }

    pub fn has_image(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, ContentPart::Image { .. }))
    }
}

/// A generative model endpoint addressed by model identifier.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, model_id: &str, request: &ModelRequest)
    -> Result<String, ModelCallError>;
}

/// OpenRouter (OpenAI-compatible) chat completions client.
pub struct OpenRouterClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenRouterClient {
    pub fn new(config: &ServiceConfig) -> Result<Self, ConfigError> {
        let http = Client::builder()
            .timeout(config.model_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl GenerativeModel for OpenRouterClient {
    async fn generate(
        &self,
        model_id: &str,
        request: &ModelRequest,
    ) -> Result<String, ModelCallError> {
        let payload = chat_payload(model_id, request);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelCallError::Unreachable(format!("request timed out: {e}"))
                } else {
                    ModelCallError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ModelCallError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &body));
        }

        let response_json: Value = serde_json::from_str(&body).map_err(|e| {
            ModelCallError::Unreachable(format!("invalid JSON from provider: {e}"))
        })?;

        // OpenRouter reports some upstream failures inside a 200 response.
        if let Some(error) = embedded_error(&response_json) {
            return Err(error);
        }

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(ModelCallError::Unreachable(
                "provider returned an empty completion".to_string(),
            ));
        }

        debug!(model = %model_id, chars = content.len(), "Model call succeeded");
        Ok(content.to_string())
    }
}

fn chat_payload(model_id: &str, request: &ModelRequest) -> Value {
    let content: Vec<Value> = request
        .parts
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => json!({ "type": "text", "text": text }),
            ContentPart::Image {
                mime_type,
                data_base64,
            } => json!({
                "type": "image_url",
                "image_url": { "url": format!("data:{};base64,{}", mime_type, data_base64) }
            }),
        })
        .collect();

    json!({
        "model": model_id,
        "messages": [
            {
                "role": "user",
                "content": content
            }
        ],
        "max_tokens": request.max_tokens
    })
}

/// Map a provider failure onto the error kinds the resolver distinguishes.
pub fn classify_failure(status: u16, body: &str) -> ModelCallError {
    let lower = body.to_lowercase();
    let detail = format!("HTTP {status}: {}", preview(body));

    if status == 429
        || lower.contains("quota")
        || lower.contains("rate limit")
        || lower.contains("rate-limit")
        || lower.contains("resource_exhausted")
        || lower.contains("insufficient credits")
    {
        return ModelCallError::Quota(detail);
    }
    if matches!(status, 401 | 402 | 403)
        || lower.contains("permission")
        || lower.contains("api key")
        || lower.contains("unauthorized")
    {
        return ModelCallError::Permission(detail);
    }
    if status == 404
        || lower.contains("not found")
        || lower.contains("not supported")
        || lower.contains("no endpoints")
        || lower.contains("not a valid model")
    {
        return ModelCallError::NotFound(detail);
    }
    if matches!(status, 400 | 413 | 422) {
        return ModelCallError::MalformedRequest(detail);
    }
    ModelCallError::Unreachable(detail)
}

/// Classify an `error` object carried inside a successful response. Codes outside the HTTP
/// range count as a generic upstream failure.
fn embedded_error(response_json: &Value) -> Option<ModelCallError> {
    let error = response_json.get("error")?;
    let code = error["code"]
        .as_u64()
        .and_then(|code| u16::try_from(code).ok())
        .unwrap_or(500);
    let message = error["message"].as_str().unwrap_or_default();
    Some(classify_failure(code, message))
}
