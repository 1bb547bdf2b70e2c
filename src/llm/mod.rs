//! Inference backend abstraction
//!
//! The chat session and the HTTP server both talk to a model through
//! [`InferenceBackend`]. The bundled implementation forwards requests to
//! a locally running Ollama-style server; anything that can produce a
//! fragment stream can stand in (tests use a scripted mock).

mod ollama;

pub use ollama::{OllamaBackend, ModelInfo};

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::transcript::Message;

/// One generation call, snapshotted from session state
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub seed: Option<u32>,
    pub stream: bool,
    pub num_ctx: Option<u32>,
    /// Cap on generated tokens
    pub num_predict: Option<u32>,
    pub temperature: Option<f64>,
    /// Enable iterative reasoning on models that support it
    pub think: Option<bool>,
}

/// Errors from the inference backend
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Connectivity failure: connection refused, reset mid-stream, etc.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend itself reported a generation failure
    #[error("generation error: {0}")]
    Generation(String),

    /// A streamed line was not valid chunk JSON
    #[error("malformed response chunk: {0}")]
    MalformedChunk(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Transport(e.to_string())
    }
}

/// A finite, non-restartable sequence of generated text fragments
///
/// Ends after the backend's explicit end-of-stream marker. May yield an
/// error at any point; fragments already yielded are not retracted.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, GatewayError>> + Send>>;

/// Trait for inference backends
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Run one generation to completion and return the full answer
    async fn generate(&self, request: GenerationRequest) -> Result<String, GatewayError>;

    /// Run one generation, delivering the answer incrementally
    async fn stream(&self, request: GenerationRequest) -> Result<FragmentStream, GatewayError>;

    /// List models available on this backend
    async fn models(&self) -> Result<Vec<ModelInfo>, GatewayError>;
}
