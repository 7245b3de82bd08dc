//! Answer generation providers.
//!
//! - **[`OpenAIGenerator`]**: `POST /v1/chat/completions`.
//! - **[`OllamaGenerator`]**: `POST /api/generate`, non-streaming.
//! - **[`DisabledGenerator`]**: always fails, so the pipeline reports a
//!   generation error instead of inventing an answer.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use fusion_rag_core::capability::Generator;

use crate::config::GenerationConfig;
use crate::http::{self, RetryPolicy};

const OPENAI_URL: &str = "https://api.openai.com";
const OLLAMA_URL: &str = "http://localhost:11434";

/// Fill the answer prompt with retrieved `context` and the user's `question`.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are an expert assistant. Use the following context to answer the question.\n\
         If the answer is not in the context, say you don't know.\n\
         \n\
         Context:\n\
         {}\n\
         \n\
         Question:\n\
         {}",
        context, question
    )
}

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _question: &str, _context: &str) -> Result<String> {
        bail!("Generation provider is disabled; set [generation].provider to enable answers")
    }
}

pub struct OpenAIGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    retry: RetryPolicy,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &GenerationConfig, api_key: impl Into<String>) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for OpenAI provider"))?;
        let base = config.url.as_deref().unwrap_or(OPENAI_URL);
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            endpoint: format!("{}/v1/chat/completions", base.trim_end_matches('/')),
            api_key: api_key.into(),
            model,
            temperature: config.temperature,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, question: &str, context: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "user", "content": build_prompt(question, context) }
            ],
        });
        let json = http::post_json(
            &self.client,
            &self.endpoint,
            Some(&self.api_key),
            &body,
            self.retry,
            "OpenAI",
        )
        .await?;
        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
    }
}

pub struct OllamaGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    retry: RetryPolicy,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Ollama provider"))?;
        let base = config.url.as_deref().unwrap_or(OLLAMA_URL);
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            endpoint: format!("{}/api/generate", base.trim_end_matches('/')),
            model,
            temperature: config.temperature,
            retry: RetryPolicy::new(config.max_retries),
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, question: &str, context: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": build_prompt(question, context),
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let json =
            http::post_json(&self.client, &self.endpoint, None, &body, self.retry, "Ollama").await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
    }
}

pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_context_and_question() {
        let prompt = build_prompt("What is LangGraph?", "LangGraph builds apps.");
        assert!(prompt.starts_with("You are an expert assistant."));
        assert!(prompt.contains("say you don't know"));
        let ctx_at = prompt.find("LangGraph builds apps.").unwrap();
        let q_at = prompt.find("What is LangGraph?").unwrap();
        assert!(ctx_at < q_at);
    }

    #[tokio::test]
    async fn test_disabled_generator_fails() {
        let g = create_generator(&GenerationConfig::default()).unwrap();
        assert_eq!(g.model_name(), "disabled");
        let err = g.generate("q", "c").await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn test_unknown_generator() {
        let config = GenerationConfig {
            provider: "bard".to_string(),
            ..GenerationConfig::default()
        };
        assert!(create_generator(&config).is_err());
    }

    #[test]
    fn test_ollama_requires_model() {
        let config = GenerationConfig {
            provider: "ollama".to_string(),
            ..GenerationConfig::default()
        };
        assert!(OllamaGenerator::new(&config).is_err());
    }
}
