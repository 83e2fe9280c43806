//! Anthropic Messages API backend.

use std::time::Duration;

use crate::model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, Part, Role, ToolCall, ToolChoice,
    ToolSpec, Usage,
};
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

// OAuth tokens are only accepted with the CLI client's headers and system
// prefix.
const CLI_VERSION: &str = "2.1.2";
const OAUTH_BETA_HEADER: &str = "claude-code-20250219,oauth-2025-04-20";
const OAUTH_SYSTEM_PREFIX: &str = "You are Claude Code, Anthropic's official CLI for Claude.";

/// Authentication mode for the Anthropic API.
#[derive(Debug, Clone)]
pub enum AnthropicAuth {
    /// Standard API key authentication.
    ApiKey(String),
    /// OAuth bearer token.
    ClaudeCodeOauth(String),
}

impl std::fmt::Display for AnthropicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => write!(f, "api_key"),
            Self::ClaudeCodeOauth(_) => write!(f, "claude_code_oauth"),
        }
    }
}

impl AnthropicAuth {
    fn apply_headers(&self, req: RequestBuilder) -> RequestBuilder {
        match self {
            Self::ApiKey(key) => req.header("x-api-key", key),
            Self::ClaudeCodeOauth(token) => req
                .header("anthropic-dangerous-direct-browser-access", "true")
                .header("Authorization", format!("Bearer {token}"))
                .header("anthropic-beta", OAUTH_BETA_HEADER)
                .header("user-agent", format!("claude-cli/{CLI_VERSION} (external, cli)"))
                .header("x-app", "cli"),
        }
    }

    fn build_system(&self, system: Option<String>) -> Option<ApiSystemPrompt> {
        match self {
            Self::ApiKey(_) => system.map(ApiSystemPrompt::Simple),
            Self::ClaudeCodeOauth(_) => {
                let blocks = std::iter::once(OAUTH_SYSTEM_PREFIX.to_string())
                    .chain(system)
                    .map(|text| ApiSystemBlock {
                        block_type: "text",
                        text,
                    })
                    .collect();
                Some(ApiSystemPrompt::Blocks(blocks))
            }
        }
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<ApiSystemPrompt>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ApiToolChoice>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiSystemPrompt {
    Simple(String),
    Blocks(Vec<ApiSystemBlock>),
}

#[derive(Debug, Serialize)]
struct ApiSystemBlock {
    #[serde(rename = "type")]
    block_type: &'static str,
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiToolChoice {
    Auto,
    None,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ApiContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiResponseBlock>,
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Builder for creating an Anthropic backend.
#[derive(Debug, Clone)]
pub struct AnthropicBackendBuilder {
    auth: AnthropicAuth,
    model: String,
    base_url: String,
    max_tokens: u32,
    system: Option<String>,
    timeout: Duration,
}

impl AnthropicBackendBuilder {
    pub fn new(auth: AnthropicAuth, model: impl Into<String>) -> Self {
        Self {
            auth,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: 4096,
            system: None,
            timeout: super::DEFAULT_TIMEOUT,
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> AnthropicBackend {
        AnthropicBackend {
            client: reqwest::Client::new(),
            auth: self.auth,
            model: self.model,
            endpoint: format!("{}/v1/messages", self.base_url.trim_end_matches('/')),
            max_tokens: self.max_tokens,
            system: self.system,
            timeout: self.timeout,
        }
    }
}

/// Anthropic API backend.
pub struct AnthropicBackend {
    client: reqwest::Client,
    auth: AnthropicAuth,
    model: String,
    endpoint: String,
    max_tokens: u32,
    system: Option<String>,
    timeout: Duration,
}

impl AnthropicBackend {
    pub fn builder(auth: AnthropicAuth, model: impl Into<String>) -> AnthropicBackendBuilder {
        AnthropicBackendBuilder::new(auth, model)
    }

    /// System turns are lifted out of the history and joined with the
    /// configured system prompt.
    fn system_prompt(&self, messages: &[Message]) -> Option<String> {
        let parts: Vec<String> = self
            .system
            .iter()
            .cloned()
            .chain(
                messages
                    .iter()
                    .filter(|m| m.role == Role::System)
                    .map(Message::text),
            )
            .filter(|s| !s.trim().is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    /// Tool turns travel as user turns; consecutive turns of the same API
    /// role are merged, since the API requires alternation.
    fn messages_to_api(messages: &[Message]) -> Vec<ApiMessage> {
        let mut out: Vec<ApiMessage> = Vec::new();

        for msg in messages.iter().filter(|m| m.role != Role::System) {
            let role = match msg.role {
                Role::Assistant => "assistant",
                Role::User | Role::Tool | Role::System => "user",
            };
            let blocks: Vec<ApiContentBlock> = msg.parts.iter().filter_map(part_to_api).collect();
            if blocks.is_empty() {
                continue;
            }

            match out.last_mut() {
                Some(last) if last.role == role => last.content.extend(blocks),
                _ => out.push(ApiMessage {
                    role,
                    content: blocks,
                }),
            }
        }

        out
    }

    fn tool_to_api(spec: &ToolSpec) -> ApiTool {
        ApiTool {
            name: spec.name.clone(),
            description: spec.description.clone(),
            input_schema: spec.schema.clone(),
        }
    }

    fn response_to_message(blocks: Vec<ApiResponseBlock>) -> Message {
        let parts: Vec<Part> = blocks
            .into_iter()
            .filter_map(|block| match block {
                ApiResponseBlock::Text { text } => Some(Part::Text(text)),
                ApiResponseBlock::ToolUse { id, name, input } => {
                    Some(Part::ToolCall(ToolCall { id, name, input }))
                }
                ApiResponseBlock::Unknown => None,
            })
            .collect();

        Message {
            role: Role::Assistant,
            parts,
        }
    }
}

/// Empty text blocks are rejected by the API.
fn part_to_api(part: &Part) -> Option<ApiContentBlock> {
    match part {
        Part::Text(text) if text.trim().is_empty() => None,
        Part::Text(text) => Some(ApiContentBlock::Text { text: text.clone() }),
        Part::ToolCall(call) => Some(ApiContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: match &call.input {
                Value::Null => Value::Object(Default::default()),
                input => input.clone(),
            },
        }),
        Part::ToolResult(result) => Some(ApiContentBlock::ToolResult {
            tool_use_id: result.tool_call_id.clone(),
            content: result.content.clone(),
            is_error: result.is_error,
        }),
    }
}

impl std::fmt::Display for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "anthropic({}, auth={})", self.model, self.auth)
    }
}

impl Backend for AnthropicBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let tools: Vec<ApiTool> = request.tools.iter().map(Self::tool_to_api).collect();
        let tool_choice = (!tools.is_empty()).then_some(match request.tool_choice {
            ToolChoice::Auto => ApiToolChoice::Auto,
            ToolChoice::None => ApiToolChoice::None,
        });

        let api_request = ApiRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: Self::messages_to_api(request.messages),
            system: self.auth.build_system(self.system_prompt(request.messages)),
            tools,
            tool_choice,
        };
        debug!(
            model = %self.model,
            messages = api_request.messages.len(),
            tools = api_request.tools.len(),
            "anthropic request"
        );

        let req = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .header("accept", "application/json");

        let req = self.auth.apply_headers(req);

        let response = req
            .json(&api_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response.json().await?;

        let message = Self::response_to_message(api_response.content);
        let usage = Usage {
            input_tokens: api_response.usage.input_tokens,
            output_tokens: api_response.usage.output_tokens,
        };

        Ok(ModelResponse { message, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolResult;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn multiply_call() -> ToolCall {
        ToolCall {
            id: "toolu_1".into(),
            name: "calculator".into(),
            input: json!({ "operation": "multiply", "a": 6, "b": 7 }),
        }
    }

    #[test]
    fn auth_display() {
        let api = AnthropicAuth::ApiKey("test".into());
        let oauth = AnthropicAuth::ClaudeCodeOauth("test".into());
        assert_eq!(api.to_string(), "api_key");
        assert_eq!(oauth.to_string(), "claude_code_oauth");
    }

    #[test]
    fn tool_turns_merge_into_one_user_message() {
        let call = multiply_call();
        let second = ToolCall {
            id: "toolu_2".into(),
            ..multiply_call()
        };
        let messages = [
            Message::system("Be brief."),
            Message::user("6*7 twice?"),
            Message::assistant_with_calls("", vec![call.clone(), second.clone()]),
            Message::tool_result(ToolResult::success(&call, "42")),
            Message::tool_result(ToolResult::failure(&second, "boom")),
        ];

        let api = serde_json::to_value(AnthropicBackend::messages_to_api(&messages)).unwrap();

        assert_eq!(api.as_array().unwrap().len(), 3);
        assert_eq!(api[1]["role"], "assistant");
        assert_eq!(api[1]["content"].as_array().unwrap().len(), 2);
        assert_eq!(api[1]["content"][0]["type"], "tool_use");
        assert_eq!(api[2]["role"], "user");
        assert_eq!(
            api[2]["content"],
            json!([
                { "type": "tool_result", "tool_use_id": "toolu_1", "content": "42" },
                { "type": "tool_result", "tool_use_id": "toolu_2", "content": "boom", "is_error": true }
            ])
        );
    }

    #[test]
    fn system_turns_become_system_prompt() {
        let backend = AnthropicBackend::builder(AnthropicAuth::ApiKey("k".into()), "m")
            .system("Configured.")
            .build();
        let prompt = backend.system_prompt(&[Message::system("From history."), Message::user("hi")]);
        assert_eq!(prompt.as_deref(), Some("Configured.\n\nFrom history."));
        assert_eq!(backend.system_prompt(&[Message::user("hi")]).as_deref(), Some("Configured."));
    }

    #[tokio::test]
    async fn call_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "secret"))
            .and(body_partial_json(json!({
                "model": "claude-test",
                "tool_choice": { "type": "auto" },
                "tools": [{ "name": "calculator" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    { "type": "text", "text": "Let me compute." },
                    { "type": "tool_use", "id": "toolu_9", "name": "calculator",
                      "input": { "operation": "add", "a": 1, "b": 2 } },
                    { "type": "thinking", "thinking": "..." }
                ],
                "usage": { "input_tokens": 12, "output_tokens": 7 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = AnthropicBackend::builder(AnthropicAuth::ApiKey("secret".into()), "claude-test")
            .base_url(server.uri())
            .build();
        let messages = [Message::user("1+2?")];
        let tools = [ToolSpec {
            name: "calculator".into(),
            description: "Arithmetic".into(),
            schema: json!({ "type": "object", "properties": {}, "required": [] }),
        }];

        let response = backend
            .call(ModelRequest::with_tools(&messages, &tools))
            .await
            .unwrap();

        assert_eq!(response.message.text(), "Let me compute.");
        let calls = response.message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "toolu_9");
        assert_eq!(response.usage.input_tokens, 12);
    }

    #[tokio::test]
    async fn api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let backend = AnthropicBackend::builder(AnthropicAuth::ApiKey("k".into()), "m")
            .base_url(server.uri())
            .build();
        let messages = [Message::user("hi")];
        let err = backend
            .call(ModelRequest::plain(&messages))
            .await
            .unwrap_err();

        match err {
            ModelError::Api(msg) => assert!(msg.contains("overloaded")),
            other => panic!("expected api error, got {other:?}"),
        }
    }
}
