//! Groq HTTP backend: OpenAI-compatible chat completions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{
    CompletionRequest, LlmClient, LlmResponse, COST_EPSILON_USD, GROQ_8B_MODEL,
};

const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// Groq pricing (USD per 1M tokens)
const COST_8B_INPUT: f64 = 0.05;
const COST_8B_OUTPUT: f64 = 0.08;
const COST_70B_INPUT: f64 = 0.59;
const COST_70B_OUTPUT: f64 = 0.79;

/// Groq chat-completions client.
#[derive(Debug, Clone)]
pub struct GroqClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GroqClient {
    /// Build a client with an explicit key and the default endpoint.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Transport` if the HTTP client cannot be
    /// constructed.
    pub fn new(api_key: impl Into<String>) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Build a client from `GROQ_API_KEY`, honoring a `GROQ_API_URL`
    /// endpoint override.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingApiKey` when the key variable is unset.
    pub fn new_from_env() -> Result<Self, LlmError> {
        let api_key = std::env::var("GROQ_API_KEY").map_err(|_| LlmError::MissingApiKey)?;
        let mut client = Self::new(api_key)?;
        if let Ok(url) = std::env::var("GROQ_API_URL") {
            client.base_url = url;
        }
        Ok(client)
    }

    /// Endpoint override, mainly for tests against a local stub.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn price(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let (input_rate, output_rate) = if model == GROQ_8B_MODEL {
            (COST_8B_INPUT, COST_8B_OUTPUT)
        } else {
            (COST_70B_INPUT, COST_70B_OUTPUT)
        };
        input_tokens as f64 / 1_000_000.0 * input_rate
            + output_tokens as f64 / 1_000_000.0 * output_rate
    }

    /// Word-count heuristic for providers that omit usage metadata;
    /// roughly two tokens per whitespace-separated word.
    fn estimate_tokens(text: &str) -> u64 {
        (text.split_whitespace().count() * 2) as u64
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

#[async_trait]
impl LlmClient for GroqClient {
    async fn complete(&self, request: CompletionRequest) -> Result<LlmResponse, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &request.model,
            messages,
            temperature: 0.1,
            max_tokens: request.max_tokens,
        };

        debug!(model = %request.model, max_tokens = request.max_tokens, "invoking groq backend");

        let response = self
            .http
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| {
                LlmError::MalformedResponse("response missing choices[0].message.content".into())
            })?
            .trim()
            .to_string();

        let (input_tokens, output_tokens) = match parsed.usage {
            Some(Usage {
                prompt_tokens: Some(input),
                completion_tokens: Some(output),
            }) => (input, output),
            _ => {
                warn!("groq response missing usage metadata; estimating tokens from word count");
                (
                    Self::estimate_tokens(&request.prompt),
                    Self::estimate_tokens(&content),
                )
            }
        };

        let cost = Self::price(&request.model, input_tokens, output_tokens);
        let cost_usd = if cost > 0.0 { cost } else { COST_EPSILON_USD };

        Ok(LlmResponse {
            content,
            cost_usd,
            model: request.model,
            input_tokens,
            output_tokens,
        })
    }
}
