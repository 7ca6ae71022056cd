use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The inference capability every pipeline component talks to.
///
/// Returns the raw completion text. Callers are responsible for stripping
/// reasoning blocks and locating structured payloads.
#[async_trait]
pub trait Inference: Send + Sync {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_tokens: u32,
}

impl LlmClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        Self::build(base_url.to_string(), api_key, 4096, 300)
    }

    pub fn from_env() -> Result<Self> {
        let base_url = dotenv::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:1234/v1".to_string());
        let api_key = dotenv::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());
        let max_tokens = dotenv::var("LLM_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4096);
        let timeout_secs = dotenv::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(300);
        Self::build(base_url, api_key, max_tokens, timeout_secs)
    }

    fn build(base_url: String, api_key: Option<String>, max_tokens: u32, timeout_secs: u64) -> Result<Self> {
        // Local reasoning models are slow on long prompts
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            api_key,
            max_tokens,
        })
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    /// Non-streaming chat completion.
    pub async fn chat(&self, messages: &[Message], model: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": 0.3,
            "max_tokens": self.max_tokens,
        });

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req.send().await.context("LLM request failed")?;
        let status = resp.status();
        let text = resp.text().await.context("Failed to read LLM response")?;
        if !status.is_success() {
            anyhow::bail!("LLM returned {}: {}", status, text);
        }
        let json: serde_json::Value =
            serde_json::from_str(&text).context("Failed to parse LLM JSON")?;

        // Extract content from choices[0].message.content (handle null)
        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .unwrap_or("")
            .to_string();

        debug!(model, response_len = content.len(), "LLM call complete");
        Ok(content)
    }
}

#[async_trait]
impl Inference for LlmClient {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        let messages = vec![Message {
            role: "system".to_string(),
            content: prompt.to_string(),
        }];
        self.chat(&messages, model).await
    }
}
