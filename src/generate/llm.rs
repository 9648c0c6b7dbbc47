//! OpenAI-compatible chat-completions client
//!
//! One client serves all three generation roles; structured calls retry once
//! on the quiz model before giving up, since the planner model is the one
//! most prone to ignoring JSON instructions.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use super::{ContentGenerator, GenRole, GenerationError};
use crate::config::Config;

const TEXT_SYSTEM_PROMPT: &str = "Expert academic author. Produce clear study guides.";
const JSON_SYSTEM_PROMPT: &str = "Return JSON only. Follow structure strictly.";
const STRUCTURED_MAX_TOKENS: u32 = 1500;

/// Client for an OpenAI-compatible chat-completions endpoint
#[derive(Clone)]
pub struct LlmGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    study_model: String,
    quiz_model: String,
    planner_model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

impl LlmGenerator {
    /// Build a client from configuration, reading the API key from the
    /// configured environment variable.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = std::env::var(&config.generator.api_key_env).with_context(|| {
            format!(
                "API key not set. Export {} before running.",
                config.generator.api_key_env
            )
        })?;
        Self::new(config, api_key)
    }

    /// Build a client with an explicit API key
    pub fn new(config: &Config, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.generator.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: config.generator.base_url.clone(),
            api_key,
            study_model: config.models.study.clone(),
            quiz_model: config.models.quiz.clone(),
            planner_model: config.models.planner.clone(),
        })
    }

    fn model_for(&self, role: GenRole) -> &str {
        match role {
            GenRole::Study => &self.study_model,
            GenRole::Quiz => &self.quiz_model,
            GenRole::Planner => &self.planner_model,
        }
    }

    /// Models to try for a structured call, in order. The planner role
    /// falls back to the quiz model, mirroring its weaker JSON compliance.
    fn structured_chain(&self, role: GenRole) -> Vec<&str> {
        let primary = self.model_for(role);
        let mut chain = vec![primary];
        if role == GenRole::Planner && self.quiz_model != primary {
            chain.push(self.quiz_model.as_str());
        }
        chain
    }

    /// Send one chat-completion request and extract the message content
    async fn chat(
        &self,
        model: &str,
        system: &str,
        user: &str,
        max_tokens: u32,
        json_mode: bool,
    ) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user.to_string(),
                },
            ],
            max_tokens: Some(max_tokens),
            response_format: json_mode.then(|| serde_json::json!({ "type": "json_object" })),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api { status, body });
        }

        // Parse as a raw Value for provider flexibility; strict structs
        // break on models that return content as an array of parts.
        let body = response.text().await?;
        let raw: Value = serde_json::from_str(&body)
            .map_err(|e| GenerationError::Malformed(format!("response is not JSON: {e}")))?;

        let content_value = raw
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"));

        let content = match content_value {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(parts)) => parts
                .iter()
                .filter_map(|part| {
                    if part.get("type").and_then(|t| t.as_str()) == Some("text") {
                        part.get("text").and_then(|t| t.as_str()).map(String::from)
                    } else {
                        None
                    }
                })
                .collect::<Vec<_>>()
                .join(""),
            _ => String::new(),
        };

        if content.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(content)
    }
}

#[async_trait]
impl ContentGenerator for LlmGenerator {
    async fn generate_text(
        &self,
        role: GenRole,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        self.chat(self.model_for(role), TEXT_SYSTEM_PROMPT, prompt, max_tokens, false)
            .await
    }

    async fn generate_structured(
        &self,
        role: GenRole,
        prompt: &str,
        schema: &str,
    ) -> Result<Value, GenerationError> {
        let user = format!("Schema: {schema}\n\nTask: {prompt}");
        let mut last_err = GenerationError::Empty;

        for model in self.structured_chain(role) {
            match self
                .chat(model, JSON_SYSTEM_PROMPT, &user, STRUCTURED_MAX_TOKENS, true)
                .await
            {
                Ok(body) => match parse_json_block(&body) {
                    Ok(value) => return Ok(value),
                    Err(err) => {
                        warn!(model, %err, "structured output did not parse, trying next model");
                        last_err = err;
                    }
                },
                Err(err) => {
                    warn!(model, %err, "structured generation failed, trying next model");
                    last_err = err;
                }
            }
        }

        Err(last_err)
    }
}

/// Parse a completion body as JSON, tolerating a markdown code fence
fn parse_json_block(body: &str) -> Result<Value, GenerationError> {
    let trimmed = body.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);
    serde_json::from_str(inner).map_err(|e| GenerationError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_block_plain() {
        let value = parse_json_block(r#"{"a": 1}"#).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_parse_json_block_fenced() {
        let value = parse_json_block("```json\n{\"a\": [1, 2]}\n```").unwrap();
        assert_eq!(value["a"][1], 2);
    }

    #[test]
    fn test_parse_json_block_rejects_prose() {
        assert!(parse_json_block("Sure! Here is the JSON you asked for").is_err());
    }

    #[test]
    fn test_structured_chain_planner_falls_back() {
        let config = Config::default();
        let generator = LlmGenerator::new(&config, "test-key".to_string()).unwrap();
        let chain = generator.structured_chain(GenRole::Planner);
        assert_eq!(chain, vec!["gpt-5-nano", "gpt-4o-mini"]);

        let chain = generator.structured_chain(GenRole::Quiz);
        assert_eq!(chain, vec!["gpt-4o-mini"]);
    }
}
