//! Language-model oracle client (spec §4.3). Grounded in the teacher's
//! `agentic::llm_client::LlmClient` trait and `agentic::anthropic_client`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::OracleConfig;

/// Anything that can turn a natural-language turn into raw JSON text is an
/// oracle. Kept minimal and provider-agnostic so the compiler never talks
/// HTTP directly.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send `user_prompt` under `system_prompt` and return the raw text
    /// response, requesting JSON-only output where the provider supports it.
    async fn chat_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Anthropic Claude API client.
#[derive(Clone)]
pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    model: String,
}

impl AnthropicClient {
    pub fn new(config: &OracleConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            client: reqwest::Client::new(),
            model: config.model.clone(),
        }
    }

    async fn call_api(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&serde_json::json!({
                "model": &self.model,
                "max_tokens": 2048,
                "system": system_prompt,
                "messages": [{"role": "user", "content": user_prompt}]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("oracle API error {}: {}", status, body));
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            text: Option<String>,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            content: Vec<ContentBlock>,
        }

        let api_response: ApiResponse = response.json().await?;
        api_response
            .content
            .first()
            .and_then(|c| c.text.clone())
            .ok_or_else(|| anyhow!("empty response from oracle"))
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn chat_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let json_system = format!(
            "{}\n\nIMPORTANT: Respond with valid JSON only. No markdown code blocks, no explanations.",
            system_prompt
        );
        self.call_api(&json_system, user_prompt).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
