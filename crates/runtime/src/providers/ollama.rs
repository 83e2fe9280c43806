//! Ollama `/api/chat` backend.

use std::time::Duration;

use crate::model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, Part, Role, ToolCall, ToolChoice,
    ToolSpec, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.1";

// Wire types

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: Role,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ApiFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    message: ApiResponseMessage,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

/// Builder for creating an Ollama backend.
#[derive(Debug, Clone)]
pub struct OllamaBackendBuilder {
    base_url: String,
    model: String,
    system: Option<String>,
    timeout: Duration,
}

impl OllamaBackendBuilder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            system: None,
            timeout: super::DEFAULT_TIMEOUT,
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> OllamaBackend {
        OllamaBackend {
            client: reqwest::Client::new(),
            endpoint: format!("{}/api/chat", self.base_url.trim_end_matches('/')),
            model: self.model,
            system: self.system,
            timeout: self.timeout,
        }
    }
}

/// Ollama chat backend. Non-streaming.
pub struct OllamaBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    system: Option<String>,
    timeout: Duration,
}

impl OllamaBackend {
    pub fn builder(base_url: impl Into<String>, model: impl Into<String>) -> OllamaBackendBuilder {
        OllamaBackendBuilder::new(base_url, model)
    }

    fn message_to_api(msg: &Message) -> Vec<ApiMessage> {
        // One API message per tool result; Ollama has no multi-result turn.
        if msg.role == Role::Tool {
            return msg
                .tool_results()
                .map(|result| ApiMessage {
                    role: Role::Tool,
                    content: result.content.clone(),
                    tool_calls: Vec::new(),
                    tool_name: Some(result.name.clone()),
                })
                .collect();
        }

        let tool_calls = msg
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::ToolCall(call) => Some(ApiToolCall {
                    id: Some(call.id.clone()),
                    function: ApiFunctionCall {
                        name: call.name.clone(),
                        arguments: call.input.clone(),
                    },
                }),
                _ => None,
            })
            .collect();

        vec![ApiMessage {
            role: msg.role,
            content: msg.text(),
            tool_calls,
            tool_name: None,
        }]
    }

    fn tool_to_api(spec: &ToolSpec) -> ApiTool<'_> {
        ApiTool {
            tool_type: "function",
            function: ApiFunction {
                name: &spec.name,
                description: &spec.description,
                parameters: &spec.schema,
            },
        }
    }

    fn response_to_message(message: ApiResponseMessage) -> Message {
        let mut parts = vec![Part::Text(message.content)];
        parts.extend(message.tool_calls.into_iter().map(|call| {
            Part::ToolCall(ToolCall {
                id: call
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple())),
                name: call.function.name,
                input: parse_arguments(call.function.arguments),
            })
        }));
        Message {
            role: Role::Assistant,
            parts,
        }
    }
}

/// Some models send arguments as a JSON-encoded string.
fn parse_arguments(arguments: Value) -> Value {
    match arguments {
        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        other => other,
    }
}

impl std::fmt::Display for OllamaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ollama({}, {})", self.model, self.endpoint)
    }
}

impl Backend for OllamaBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let system = self.system.as_ref().map(|s| ApiMessage {
            role: Role::System,
            content: s.clone(),
            tool_calls: Vec::new(),
            tool_name: None,
        });
        let messages = system
            .into_iter()
            .chain(request.messages.iter().flat_map(Self::message_to_api))
            .collect();

        let tools = match request.tool_choice {
            ToolChoice::Auto => request.tools.iter().map(Self::tool_to_api).collect(),
            ToolChoice::None => Vec::new(),
        };

        let api_request = ApiRequest {
            model: &self.model,
            messages,
            tools,
            stream: false,
        };
        debug!(
            model = %self.model,
            messages = api_request.messages.len(),
            tools = api_request.tools.len(),
            "ollama request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&api_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response.json().await?;

        Ok(ModelResponse {
            usage: Usage {
                input_tokens: api_response.prompt_eval_count,
                output_tokens: api_response.eval_count,
            },
            message: Self::response_to_message(api_response.message),
        })
    }
}
