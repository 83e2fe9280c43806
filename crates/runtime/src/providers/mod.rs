//! LLM provider adapters.
//!
//! Each provider implements the backend trait for its specific API.

use std::time::Duration;

mod anthropic;
mod ollama;

pub use anthropic::{AnthropicAuth, AnthropicBackend, AnthropicBackendBuilder};
pub use ollama::{OllamaBackend, OllamaBackendBuilder};

use crate::model::{Backend, ModelError, ModelRequest, ModelResponse};

/// Upper bound on a single model HTTP call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub mod defaults {
    pub use super::anthropic::DEFAULT_BASE_URL as ANTHROPIC_BASE_URL;
    pub use super::ollama::{DEFAULT_BASE_URL as OLLAMA_BASE_URL, DEFAULT_MODEL as OLLAMA_MODEL};
}

/// Any configured backend, chosen at runtime.
pub enum Provider {
    Ollama(OllamaBackend),
    Anthropic(AnthropicBackend),
}

impl From<OllamaBackend> for Provider {
    fn from(backend: OllamaBackend) -> Self {
        Self::Ollama(backend)
    }
}

impl From<AnthropicBackend> for Provider {
    fn from(backend: AnthropicBackend) -> Self {
        Self::Anthropic(backend)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama(backend) => write!(f, "{backend}"),
            Self::Anthropic(backend) => write!(f, "{backend}"),
        }
    }
}

impl Backend for Provider {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        match self {
            Self::Ollama(backend) => backend.call(request).await,
            Self::Anthropic(backend) => backend.call(request).await,
        }
    }
}
