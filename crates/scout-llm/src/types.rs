use async_trait::async_trait;

use crate::error::LlmError;

/// Fast navigation model.
pub const GROQ_8B_MODEL: &str = "llama-3.1-8b-instant";
/// Mid-tier compression model used by the gate.
pub const GROQ_70B_MODEL: &str = "llama-3.3-70b-versatile";

/// Reported for a successful call whose computed price rounds to zero,
/// so the audit log can distinguish "call made" from "no call".
pub const COST_EPSILON_USD: f64 = 1e-7;

/// Input to one LLM completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: String,
    pub system: Option<String>,
    pub max_tokens: u32,
}

impl CompletionRequest {
    #[must_use]
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            system: None,
            max_tokens: 500,
        }
    }

    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Result of one LLM completion call.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub cost_usd: f64,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Backend seam for LLM completions.
///
/// The gate holds this as a trait object; anything that can answer a
/// prompt (HTTP backend, scripted test double) plugs in here.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one completion.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] for transport failures, provider errors, and
    /// malformed response bodies. A deadline expiration surfaces as
    /// `Transport`; the caller treats every variant as a retryable
    /// attempt failure.
    async fn complete(&self, request: CompletionRequest) -> Result<LlmResponse, LlmError>;
}
