//! LLM client seam for scout.
//!
//! The gate talks to a [`LlmClient`] trait object and never reaches into
//! the HTTP layer; [`GroqClient`] is the production backend, tests inject
//! scripted implementations.

mod error;
mod groq;
mod types;

pub use error::LlmError;
pub use groq::GroqClient;
pub use types::{
    CompletionRequest, LlmClient, LlmResponse, COST_EPSILON_USD, GROQ_70B_MODEL, GROQ_8B_MODEL,
};
