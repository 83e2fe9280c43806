//! Resolves model-proposed invocations against the directory and runs them.

use serde_json::Value;
use tracing::{debug, warn};

use super::directory::{Capability, CapabilityKind, Directory, Handler};
use super::errors::DispatchError;
use super::transport::CapabilityTransport;
use crate::model::{ToolCall, ToolResult};
use crate::sink::Sink;

/// Result text when a tool answers with no text content.
pub const NO_TOOL_RESPONSE: &str = "No response from the tool.";

/// Result text when a resource read yields no text content.
pub const NO_RESOURCE_CONTENT: &str = "No content found in the resource.";

/// Result text for a name that is neither a tool nor a resource.
pub const TOOL_NOT_FOUND: &str = "Tool not found.";

/// Runs invocations one at a time.
///
/// Every dispatch produces exactly one [`ToolResult`]; failures are folded
/// into its text so the model can read them.
pub struct Dispatcher<'a, T: ?Sized> {
    directory: &'a Directory,
    transport: &'a T,
}

impl<'a, T> Dispatcher<'a, T>
where
    T: CapabilityTransport + ?Sized,
{
    pub fn new(directory: &'a Directory, transport: &'a T) -> Self {
        Self {
            directory,
            transport,
        }
    }

    pub async fn dispatch<S: Sink + ?Sized>(&self, call: &ToolCall, sink: &mut S) -> ToolResult {
        let Some(capability) = self.directory.lookup(&call.name) else {
            warn!(name = %call.name, "model proposed an unknown capability");
            sink.tool(&format!("Tool result: {TOOL_NOT_FOUND}"));
            return ToolResult::success(call, TOOL_NOT_FOUND);
        };

        sink.progress(&format!("Calling tool: {}", call.name));
        sink.progress(&format!("Arguments: {}", render_arguments(&call.input)));

        let result = match self.invoke(capability, &call.input, sink).await {
            Ok(text) => ToolResult::success(call, text),
            Err(err) => {
                warn!(name = %call.name, error = %err, "capability dispatch failed");
                ToolResult::failure(call, failure_text(capability, &err))
            }
        };

        debug!(
            name = %call.name,
            id = %call.id,
            is_error = result.is_error,
            "capability dispatched"
        );
        sink.tool(&format!("Tool result: {}", result.content));
        result
    }

    /// Validate, then make exactly one transport call.
    async fn invoke<S: Sink + ?Sized>(
        &self,
        capability: &Capability,
        input: &Value,
        sink: &mut S,
    ) -> Result<String, DispatchError> {
        let args = capability.schema.validate(input)?;

        match &capability.handler {
            Handler::CallTool => {
                let result = self.transport.call_tool(&capability.name, args).await?;
                let text = result.first_text().unwrap_or(NO_TOOL_RESPONSE).to_string();
                if result.is_error {
                    return Err(DispatchError::Transport(mcp::Error::ToolCallFailed(text)));
                }
                Ok(text)
            }
            Handler::ReadResource { uri_prefix } => {
                let topic = args.get("topic").and_then(Value::as_str).unwrap_or_default();
                let uri = format!("{uri_prefix}{topic}");
                debug!(%uri, "reading resource");
                sink.progress(&format!("Reading resource: {uri}"));
                let result = self.transport.read_resource(&uri).await?;
                Ok(result
                    .first_text()
                    .unwrap_or(NO_RESOURCE_CONTENT)
                    .to_string())
            }
        }
    }
}

fn failure_text(capability: &Capability, err: &DispatchError) -> String {
    match (err, capability.kind()) {
        (DispatchError::InvalidArguments(reason), _) => {
            format!("Invalid arguments for {}: {reason}", capability.name)
        }
        (_, CapabilityKind::Tool) => format!("Tool {} failed: {err}", capability.name),
        (_, CapabilityKind::Resource) => format!("Resource {} failed: {err}", capability.name),
    }
}

fn render_arguments(input: &Value) -> String {
    match input {
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}
