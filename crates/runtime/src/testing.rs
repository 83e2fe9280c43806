//! Scripted fakes for the session's three seams.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::Mutex;

use mcp::{CallToolResult, ReadResourceResult, ResourceContents, Tool, ToolContent};
use serde_json::{Map, Value, json};

use crate::capability::{CapabilityTransport, ResourceListing};
use crate::model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, ToolCall, ToolChoice, Usage,
};
use crate::sink::Sink;

pub fn calculator_tool() -> Tool {
    Tool {
        name: "calculator".into(),
        description: Some("Perform basic arithmetic operations".into()),
        input_schema: json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["add", "subtract", "multiply", "divide"]
                },
                "a": { "type": "number", "description": "The first number" },
                "b": { "type": "number", "description": "The second number" }
            },
            "required": ["operation", "a", "b"]
        }),
    }
}

pub fn store_knowledge_tool() -> Tool {
    Tool {
        name: "store-knowledge".into(),
        description: Some("Store knowledge about a topic".into()),
        input_schema: json!({
            "type": "object",
            "properties": {
                "topic": { "type": "string" },
                "content": { "type": "string" }
            },
            "required": ["topic", "content"]
        }),
    }
}

pub fn knowledge_template() -> ResourceListing {
    ResourceListing {
        name: "knowledge-for-topic".into(),
        description: Some("Knowledge stored for a topic".into()),
        uri: None,
        uri_template: Some("knowledge://{topic}".into()),
    }
}

pub fn text_result(text: Option<&str>) -> CallToolResult {
    CallToolResult {
        content: text
            .map(|t| ToolContent::Text { text: t.to_string() })
            .into_iter()
            .collect(),
        is_error: false,
    }
}

fn calculate(args: &Map<String, Value>) -> CallToolResult {
    let a = args.get("a").and_then(Value::as_f64).unwrap_or_default();
    let b = args.get("b").and_then(Value::as_f64).unwrap_or_default();
    let value = match args.get("operation").and_then(Value::as_str) {
        Some("add") => a + b,
        Some("subtract") => a - b,
        Some("multiply") => a * b,
        Some("divide") if b != 0.0 => a / b,
        _ => {
            let mut result = text_result(Some("Division by zero"));
            result.is_error = true;
            return result;
        }
    };
    text_result(Some(&value.to_string()))
}

type ToolHandler = Box<dyn Fn(&Map<String, Value>) -> CallToolResult + Send + Sync>;

/// In-memory capability host. Records every transport call it receives.
pub struct FakeTransport {
    tools: Vec<Tool>,
    resources: Vec<ResourceListing>,
    handlers: HashMap<String, ToolHandler>,
    failing: HashSet<String>,
    documents: HashMap<String, String>,
    unreachable: bool,
    log: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new(tools: Vec<Tool>, resources: Vec<ResourceListing>) -> Self {
        Self {
            tools,
            resources,
            handlers: HashMap::new(),
            failing: HashSet::new(),
            documents: HashMap::new(),
            unreachable: false,
            log: Mutex::new(Vec::new()),
        }
    }

    /// A calculator, a knowledge store and a knowledge resource holding
    /// notes about rust.
    pub fn demo() -> Self {
        Self::new(
            vec![calculator_tool(), store_knowledge_tool()],
            vec![knowledge_template()],
        )
        .with_tool_handler("calculator", calculate)
        .with_tool_handler("store-knowledge", |args| {
            let topic = args.get("topic").and_then(Value::as_str).unwrap_or_default();
            text_result(Some(&format!("Stored knowledge about {topic}")))
        })
        .with_document("knowledge://rust", "Notes about rust")
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::new(Vec::new(), Vec::new())
        }
    }

    pub fn with_tool_handler(
        mut self,
        name: &str,
        handler: impl Fn(&Map<String, Value>) -> CallToolResult + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(name.to_string(), Box::new(handler));
        self
    }

    pub fn with_document(mut self, uri: &str, text: &str) -> Self {
        self.documents.insert(uri.to_string(), text.to_string());
        self
    }

    pub fn failing_tool(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Transport calls so far, as `tool <name>` or `read <uri>`.
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn check_reachable(&self) -> Result<(), mcp::Error> {
        if self.unreachable {
            Err(mcp::Error::ServerExited)
        } else {
            Ok(())
        }
    }
}

impl CapabilityTransport for FakeTransport {
    async fn list_tools(&self) -> Result<Vec<Tool>, mcp::Error> {
        self.check_reachable()?;
        Ok(self.tools.clone())
    }

    async fn list_resources(&self) -> Result<Vec<ResourceListing>, mcp::Error> {
        self.check_reachable()?;
        Ok(self.resources.clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, mcp::Error> {
        self.check_reachable()?;
        self.log.lock().unwrap().push(format!("tool {name}"));
        if self.failing.contains(name) {
            return Err(mcp::Error::Timeout);
        }
        Ok(self
            .handlers
            .get(name)
            .map(|handler| handler(&arguments))
            .unwrap_or_else(|| text_result(None)))
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, mcp::Error> {
        self.check_reachable()?;
        self.log.lock().unwrap().push(format!("read {uri}"));
        let contents = self
            .documents
            .get(uri)
            .map(|text| ResourceContents {
                uri: uri.to_string(),
                mime_type: Some("text/plain".into()),
                text: Some(text.clone()),
                blob: None,
            })
            .into_iter()
            .collect();
        Ok(ReadResourceResult { contents })
    }
}

/// What a backend was asked.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
    pub tool_choice: ToolChoice,
}

/// Backend that replays canned responses in order.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<Message, ModelError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedBackend {
    pub fn new(script: impl IntoIterator<Item = Result<Message, ModelError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::default(),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Backend for ScriptedBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: request.messages.to_vec(),
            tools: request.tools.iter().map(|t| t.name.clone()).collect(),
            tool_choice: request.tool_choice,
        });
        let message = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Api("script exhausted".into())))?;
        Ok(ModelResponse {
            message,
            usage: Usage::default(),
        })
    }
}

pub fn reply(text: &str) -> Result<Message, ModelError> {
    Ok(Message::assistant(text))
}

pub fn invoke(text: &str, calls: &[(&str, Value)]) -> Result<Message, ModelError> {
    let calls = calls
        .iter()
        .enumerate()
        .map(|(i, (name, input))| ToolCall {
            id: format!("call_{i}"),
            name: name.to_string(),
            input: input.clone(),
        })
        .collect();
    Ok(Message::assistant_with_calls(text, calls))
}

pub fn outage() -> Result<Message, ModelError> {
    Err(ModelError::Network("connection refused".into()))
}

/// Sink that records every line per channel and answers prompts from a
/// queue. An empty queue reads as end of input.
#[derive(Debug, Default)]
pub struct Recorder {
    pub system: Vec<String>,
    pub llm: Vec<String>,
    pub tool: Vec<String>,
    pub progress: Vec<String>,
    pub error: Vec<String>,
    pub prompts: Vec<String>,
    pub input: VecDeque<String>,
}

impl Recorder {
    pub fn with_input<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            input: lines.into_iter().map(str::to_string).collect(),
            ..Self::default()
        }
    }
}

impl Sink for Recorder {
    fn system(&mut self, text: &str) {
        self.system.push(text.to_string());
    }

    fn llm(&mut self, text: &str) {
        self.llm.push(text.to_string());
    }

    fn tool(&mut self, text: &str) {
        self.tool.push(text.to_string());
    }

    fn progress(&mut self, text: &str) {
        self.progress.push(text.to_string());
    }

    fn error(&mut self, text: &str) {
        self.error.push(text.to_string());
    }

    fn question(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.prompts.push(prompt.to_string());
        Ok(self.input.pop_front())
    }
}
