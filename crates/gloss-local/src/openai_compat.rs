use crate::shellout::env;
use gloss_core::{Error, ExplainPrompt, ExplanationGenerator, Generated, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub fn openai_compat_configured() -> bool {
    env("GLOSS_OPENAI_COMPAT_BASE_URL").is_some()
}

/// Client for any `/v1/chat/completions` endpoint (OpenAI, OpenRouter, vLLM, llama.cpp, ...).
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_ms: u64,
    max_tokens: Option<u64>,
    temperature: Option<f64>,
}

impl OpenAiCompatClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            timeout_ms: 60_000,
            max_tokens: Some(900),
            temperature: Some(0.3),
        }
    }

    pub fn from_env(client: reqwest::Client, model_override: Option<String>) -> Result<Self> {
        let base_url = env("GLOSS_OPENAI_COMPAT_BASE_URL").ok_or_else(|| {
            Error::NotConfigured("missing GLOSS_OPENAI_COMPAT_BASE_URL".to_string())
        })?;
        let api_key = env("GLOSS_OPENAI_COMPAT_API_KEY");
        let model = model_override
            .or_else(|| env("GLOSS_OPENAI_COMPAT_MODEL"))
            .ok_or_else(|| {
                Error::NotConfigured(
                    "missing model for openai_compat (set GLOSS_OPENAI_COMPAT_MODEL)".to_string(),
                )
            })?;
        Ok(Self::new(client, base_url, api_key, model)
            .with_timeout_ms(crate::llm_timeout_ms_from_env()))
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    fn endpoint_chat_completions(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }

    pub async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let req = ChatCompletionsRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: Some(false),
        };

        let mut rb = self
            .client
            .post(self.endpoint_chat_completions())
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(k) = &self.api_key {
            rb = rb.header(reqwest::header::AUTHORIZATION, format!("Bearer {k}"));
        }

        let resp = rb
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Llm(format!(
                "openai_compat chat.completions HTTP {status}"
            )));
        }

        let parsed: ChatCompletionsResponse =
            resp.json().await.map_err(|e| Error::Llm(e.to_string()))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(Error::Llm("openai_compat returned no content".to_string()));
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl ExplanationGenerator for OpenAiCompatClient {
    fn name(&self) -> &'static str {
        "openai_compat"
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
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}
