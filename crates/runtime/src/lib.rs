//! Conduit runtime: a tool-augmented conversation orchestrator.
//!
//! A [`Session`] sits between a language model and a set of remotely
//! hosted capabilities. The model proposes invocations by name; the
//! session resolves them against a [`Directory`], runs them through a
//! [`CapabilityTransport`], folds the results back into the
//! [`Conversation`] and asks the model for the final answer.
//!
//! # Overview
//!
//! - **Directory**: the catalog of tools and resources, loaded once.
//! - **Dispatcher**: runs one invocation and turns the outcome into text.
//! - **Conversation**: append-only history of turns.
//! - **Session**: the orchestration loop.
//! - **Backend**: a trait abstracting model providers (Ollama, Anthropic).
//! - **Sink**: where output goes and input comes from.
//!
//! # Example
//!
//! ```ignore
//! use mcp::{Server, ServerConfig};
//! use runtime::{OllamaBackend, Session, SessionConfig};
//!
//! # async fn example(sink: &mut impl runtime::Sink) -> Result<(), Box<dyn std::error::Error>> {
//! let server = Server::connect(ServerConfig::new("knowledge", "node").args(["server.js"])).await?;
//! let backend = OllamaBackend::builder("http://localhost:11434", "llama3.1").build();
//!
//! let mut session = Session::connect(backend, server, SessionConfig::default()).await?;
//! session.run(sink).await?;
//! # Ok(())
//! # }
//! ```

pub mod capability;
mod conversation;
mod error;
pub mod model;
pub mod providers;
mod session;
mod sink;

#[cfg(test)]
mod testing;

pub use capability::{
    Capability, CapabilityKind, CapabilityTransport, DispatchError, Directory, Dispatcher, Handler,
    ResourceListing,
};
pub use conversation::Conversation;
pub use error::{Error, Result};
pub use model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, Part, Role, ToolCall, ToolChoice,
    ToolResult, ToolSpec, Usage,
};
pub use providers::{AnthropicAuth, AnthropicBackend, OllamaBackend, Provider};
pub use session::{
    DEFAULT_GREETING, EMPTY_ANSWER, FOLLOWUP_TURN_FAILED, GREETING_PROMPT, LOOKUP_PLACEHOLDER,
    MODEL_TURN_FAILED, RoundOutcome, Session, SessionConfig,
};
pub use sink::Sink;
