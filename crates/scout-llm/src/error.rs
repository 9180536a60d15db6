use thiserror::Error;

/// Failures from an LLM backend invocation.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("GROQ_API_KEY not set; export it or configure the client explicitly")]
    MissingApiKey,

    /// Network-level failure: connect, TLS, timeout, or a body that
    /// could not be read.
    #[error("LLM transport failure: {0}")]
    Transport(String),

    /// The provider answered with a non-success status.
    #[error("LLM provider error (status {status}): {message}")]
    Provider { status: u16, message: String },

    /// The provider answered 200 but the body did not have the expected
    /// shape.
    #[error("malformed LLM response: {0}")]
    MalformedResponse(String),
}
