//! The orchestration loop.
//!
//! One round takes a line of user input to an answer:
//!
//! ```text
//! AwaitingModelTurn ──no invocations──────────────────────────▶ Done
//!        │
//!        └─invocations─▶ DispatchingInvocations ─▶ AwaitingFollowupTurn ─▶ Done
//! ```
//!
//! A failed model call in either model state also ends the round in `Done`.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::capability::{CapabilityTransport, DEFAULT_RESOURCE_SCHEME, Directory, Dispatcher};
use crate::conversation::Conversation;
use crate::model::{Backend, Message, ModelRequest, ModelResponse, ToolCall, ToolChoice};
use crate::sink::Sink;
use crate::Result;

/// Sent, alone, to obtain the opening line of a fresh conversation.
pub const GREETING_PROMPT: &str = "Generate a friendly greeting for a user starting a chat.";

/// Used when the greeting call fails.
pub const DEFAULT_GREETING: &str = "How can I help you today?";

/// Assistant text recorded for a turn that only proposed invocations.
pub const LOOKUP_PLACEHOLDER: &str = "I'll need to look that up.";

/// Answer recorded when the follow-up turn has no text.
pub const EMPTY_ANSWER: &str = "I wasn't able to put together an answer.";

pub const MODEL_TURN_FAILED: &str = "Sorry, I encountered an error processing your request.";

pub const FOLLOWUP_TURN_FAILED: &str = "Sorry, I had trouble processing the results.";

/// Knobs for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Optional system turn placed at the start of the conversation.
    pub system: Option<String>,
    /// URI scheme for resources whose listing carries none.
    pub resource_scheme: String,
    pub greeting_prompt: String,
    pub default_greeting: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system: None,
            resource_scheme: DEFAULT_RESOURCE_SCHEME.to_string(),
            greeting_prompt: GREETING_PROMPT.to_string(),
            default_greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

/// How a round ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// The answer that was presented and recorded.
    Answered(String),
    /// A model call failed; an error line was presented instead.
    Failed,
}

#[derive(Debug)]
enum State {
    AwaitingModelTurn,
    DispatchingInvocations(Vec<ToolCall>),
    AwaitingFollowupTurn,
    Done(RoundOutcome),
}

/// A conversation between one user, one model backend and one capability
/// transport.
pub struct Session<B, T> {
    backend: B,
    transport: T,
    directory: Arc<Directory>,
    conversation: Conversation,
    config: SessionConfig,
    greeting: Option<String>,
}

impl<B, T> Session<B, T>
where
    B: Backend,
    T: CapabilityTransport,
{
    /// Load the directory from `transport` and start a session on it.
    ///
    /// Fails with [`crate::Error::DirectoryUnavailable`] if the catalog
    /// cannot be listed.
    pub async fn connect(backend: B, transport: T, config: SessionConfig) -> Result<Self> {
        let directory = Directory::load(&transport, &config.resource_scheme).await?;
        info!(capabilities = directory.len(), "session ready");
        Ok(Self::new(backend, transport, Arc::new(directory), config))
    }

    /// Start a session on an already loaded directory.
    pub fn new(backend: B, transport: T, directory: Arc<Directory>, config: SessionConfig) -> Self {
        let conversation = match &config.system {
            Some(system) => Conversation::with_system(system.clone()),
            None => Conversation::new(),
        };
        Self {
            backend,
            transport,
            directory,
            conversation,
            config,
            greeting: None,
        }
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Give back the transport, e.g. to shut it down.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// The input prompt, generated once per session.
    ///
    /// Only a fresh conversation asks the model; the exchange is not
    /// recorded. Any failure falls back to the default greeting.
    pub async fn greeting(&mut self) -> &str {
        if self.greeting.is_none() {
            let greeting = if self.conversation.is_fresh() {
                self.generate_greeting().await
            } else {
                self.config.default_greeting.clone()
            };
            self.greeting = Some(greeting);
        }
        self.greeting.as_deref().unwrap_or(DEFAULT_GREETING)
    }

    async fn generate_greeting(&self) -> String {
        let messages = [Message::user(self.config.greeting_prompt.clone())];
        match self.backend.call(ModelRequest::plain(&messages)).await {
            Ok(response) => {
                let text = response.message.text();
                let text = text.trim();
                if text.is_empty() {
                    warn!("model returned an empty greeting");
                    self.config.default_greeting.clone()
                } else {
                    text.to_string()
                }
            }
            Err(err) => {
                warn!(error = %err, "greeting failed, using default");
                self.config.default_greeting.clone()
            }
        }
    }

    /// Prompt and answer until input ends or the user quits.
    pub async fn run<S: Sink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        let prompt = self.greeting().await.to_string();

        loop {
            let Some(line) = sink.question(&prompt)? else {
                debug!("input exhausted");
                break;
            };
            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
                break;
            }
            self.round(input, sink).await;
        }

        info!(turns = self.conversation.len(), "session ended");
        Ok(())
    }

    /// Take one line of user input through to an answer.
    pub async fn round<S: Sink + ?Sized>(&mut self, input: &str, sink: &mut S) -> RoundOutcome {
        self.conversation.push_user(input);

        let mut state = State::AwaitingModelTurn;
        loop {
            state = match state {
                State::Done(outcome) => return outcome,
                state => self.step(state, sink).await,
            };
            debug!(?state, "round advanced");
        }
    }

    async fn step<S: Sink + ?Sized>(&mut self, state: State, sink: &mut S) -> State {
        match state {
            State::AwaitingModelTurn => self.model_turn(sink).await,
            State::DispatchingInvocations(calls) => self.dispatch(calls, sink).await,
            State::AwaitingFollowupTurn => self.followup_turn(sink).await,
            State::Done(outcome) => State::Done(outcome),
        }
    }

    async fn model_turn<S: Sink + ?Sized>(&mut self, sink: &mut S) -> State {
        let request = ModelRequest::with_tools(self.conversation.turns(), self.directory.specs());
        let response = match self.backend.call(request).await {
            Ok(response) => response,
            Err(err) => {
                error!(error = %err, "model turn failed");
                sink.error(MODEL_TURN_FAILED);
                return State::Done(RoundOutcome::Failed);
            }
        };
        log_usage(&response);

        let calls = response.message.tool_calls();
        let text = response.message.text();
        let text = text.trim();

        if calls.is_empty() {
            let answer = if text.is_empty() { EMPTY_ANSWER } else { text };
            self.conversation.push_assistant(answer);
            sink.llm(answer);
            return State::Done(RoundOutcome::Answered(answer.to_string()));
        }

        let text = if text.is_empty() { LOOKUP_PLACEHOLDER } else { text };
        sink.llm(text);
        sink.progress(&format!("Using {} capability call(s)", calls.len()));
        self.conversation.push_invocations(text, calls.clone());
        State::DispatchingInvocations(calls)
    }

    /// Strictly sequential, in proposal order.
    async fn dispatch<S: Sink + ?Sized>(&mut self, calls: Vec<ToolCall>, sink: &mut S) -> State {
        let dispatcher = Dispatcher::new(&self.directory, &self.transport);
        for call in &calls {
            let result = dispatcher.dispatch(call, sink).await;
            self.conversation.push_result(result);
        }
        State::AwaitingFollowupTurn
    }

    async fn followup_turn<S: Sink + ?Sized>(&mut self, sink: &mut S) -> State {
        let request = ModelRequest {
            messages: self.conversation.turns(),
            tools: self.directory.specs(),
            tool_choice: ToolChoice::None,
        };
        let response = match self.backend.call(request).await {
            Ok(response) => response,
            Err(err) => {
                error!(error = %err, "follow-up turn failed");
                sink.error(FOLLOWUP_TURN_FAILED);
                return State::Done(RoundOutcome::Failed);
            }
        };
        log_usage(&response);

        let ignored = response.message.tool_calls();
        if !ignored.is_empty() {
            warn!(
                count = ignored.len(),
                "ignoring invocations proposed in a follow-up turn"
            );
        }

        let text = response.message.text();
        let answer = match text.trim() {
            "" => EMPTY_ANSWER,
            text => text,
        };
        self.conversation.push_assistant(answer);
        sink.llm(&format!("Answer: {answer}"));
        State::Done(RoundOutcome::Answered(answer.to_string()))
    }
}

fn log_usage(response: &ModelResponse) {
    debug!(
        input_tokens = response.usage.input_tokens,
        output_tokens = response.usage.output_tokens,
        "model responded"
    );
}
