use crate::shellout::{env, env_bool};
use gloss_core::{Error, ExplainPrompt, ExplanationGenerator, Generated, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub fn ollama_enabled() -> bool {
    env_bool("GLOSS_OLLAMA_ENABLE")
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout_ms: u64,
}

impl OllamaClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            timeout_ms: 120_000,
        }
    }

    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        // Opt-in: don't start calling localhost unless asked to.
        if !ollama_enabled() {
            return Err(Error::NotConfigured(
                "GLOSS_OLLAMA_ENABLE is not set (or false)".to_string(),
            ));
        }
        let base_url =
            env("GLOSS_OLLAMA_BASE_URL").unwrap_or_else(|| "http://127.0.0.1:11434".to_string());
        let model = env("GLOSS_OLLAMA_MODEL").unwrap_or_else(|| "qwen2.5:3b-instruct".to_string());
        Ok(Self::new(client, base_url, model).with_timeout_ms(crate::llm_timeout_ms_from_env()))
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    fn endpoint_chat(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    pub async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let req = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            stream: Some(false),
        };

        let resp = self
            .client
            .post(self.endpoint_chat())
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Llm(format!("ollama chat HTTP {status}")));
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| Error::Llm(e.to_string()))?;
        if parsed.message.content.trim().is_empty() {
            return Err(Error::Llm("ollama returned no content".to_string()));
        }
        Ok(parsed.message.content)
    }
}

#[async_trait::async_trait]
impl ExplanationGenerator for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn generate(&self, prompt: &ExplainPrompt) -> Result<Generated> {
        let t0 = std::time::Instant::now();
        let text = self.chat(&prompt.system, &prompt.user).await?;
        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("llm".to_string(), t0.elapsed().as_millis());
        Ok(Generated {
            text,
            provider: self.name().to_string(),
            model: self.model.clone(),
            timings_ms,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}
