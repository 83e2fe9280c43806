//! MCP server management (spawn, communicate, lifecycle).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, Incoming, InitializeParams, InitializeResult, JsonRpcRequest,
    JsonRpcResponse, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult,
    ReadResourceParams, ReadResourceResult, RequestId, Resource, ResourceTemplate, Tool,
};

/// Default timeout for MCP operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum output size (1MB).
/// Sized for large tool outputs (file reads, search results).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Configuration for an MCP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// Upper bound on a single request/response exchange.
    pub timeout: Duration,
}

impl ServerConfig {
    /// Config for `command` with no arguments and the default timeout.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Handle to a running MCP server.
pub struct Server {
    config: ServerConfig,
    process: Mutex<Child>,
    stdin: Mutex<tokio::process::ChildStdin>,
    stdout: Mutex<BufReader<tokio::process::ChildStdout>>,
    next_id: AtomicI64,
    initialized: Mutex<bool>,
    server_info: Mutex<Option<InitializeResult>>,
    tools: Mutex<Vec<Tool>>,
}

impl Server {
    /// Spawn a new MCP server process.
    pub async fn spawn(config: ServerConfig) -> Result<Self> {
        debug!(server = %config.name, command = %config.command, args = ?config.args, "spawning MCP server");

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd.spawn()?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("failed to capture stdin")))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("failed to capture stdout")))?;

        Ok(Self {
            config,
            process: Mutex::new(process),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            next_id: AtomicI64::new(1),
            initialized: Mutex::new(false),
            server_info: Mutex::new(None),
            tools: Mutex::new(Vec::new()),
        })
    }

    /// Spawn and run the handshake in one step.
    pub async fn connect(config: ServerConfig) -> Result<Self> {
        let server = Self::spawn(config).await?;
        server.initialize().await?;
        Ok(server)
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Initialize the server (must be called before other operations).
    pub async fn initialize(&self) -> Result<&Self> {
        let params = InitializeParams::default();
        let result: InitializeResult = self.request("initialize", Some(params)).await?;

        self.notify("notifications/initialized", None::<()>).await?;

        debug!(
            server = %self.config.name,
            remote = %result.server_info.name,
            protocol = %result.protocol_version,
            "MCP handshake complete"
        );

        *self.server_info.lock().await = Some(result);
        *self.initialized.lock().await = true;

        self.refresh_tools().await?;

        Ok(self)
    }

    /// Check if the server is initialized.
    pub async fn is_initialized(&self) -> bool {
        *self.initialized.lock().await
    }

    /// Get server info (after initialization).
    pub async fn server_info(&self) -> Option<InitializeResult> {
        self.server_info.lock().await.clone()
    }

    /// Refresh the list of available tools.
    pub async fn refresh_tools(&self) -> Result<()> {
        let result: ListToolsResult = self.request("tools/list", None::<()>).await?;
        *self.tools.lock().await = result.tools;
        Ok(())
    }

    /// Get the list of available tools.
    pub async fn tools(&self) -> Vec<Tool> {
        self.tools.lock().await.clone()
    }

    /// Whether the server advertised the resources capability.
    async fn supports_resources(&self) -> bool {
        self.server_info
            .lock()
            .await
            .as_ref()
            .is_some_and(|info| info.capabilities.resources.is_some())
    }

    /// List concrete resources. Empty when the server has no resources
    /// capability.
    pub async fn list_resources(&self) -> Result<Vec<Resource>> {
        self.ensure_initialized().await?;
        if !self.supports_resources().await {
            return Ok(Vec::new());
        }
        let result: ListResourcesResult = self.request("resources/list", None::<()>).await?;
        Ok(result.resources)
    }

    /// List resource templates. Empty when the server has no resources
    /// capability.
    pub async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>> {
        self.ensure_initialized().await?;
        if !self.supports_resources().await {
            return Ok(Vec::new());
        }
        let result: ListResourceTemplatesResult = self
            .request("resources/templates/list", None::<()>)
            .await?;
        Ok(result.resource_templates)
    }

    /// Call a tool by name.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResult> {
        self.ensure_initialized().await?;

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };

        let result: CallToolResult = self.request("tools/call", Some(params)).await?;

        if result.is_error {
            let error_text = result
                .content
                .iter()
                .filter_map(|c| c.as_text())
                .collect::<Vec<_>>()
                .join("\n");
            return Err(Error::ToolCallFailed(error_text));
        }

        Ok(result)
    }

    /// Read a resource by URI.
    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        self.ensure_initialized().await?;

        let params = ReadResourceParams {
            uri: uri.to_string(),
        };
        self.request("resources/read", Some(params)).await
    }

    /// Check if the server process is still running.
    pub async fn is_running(&self) -> bool {
        let mut process = self.process.lock().await;
        matches!(process.try_wait(), Ok(None))
    }

    /// Shut down the server gracefully.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.notify("shutdown", None::<()>).await;

        let mut process = self.process.lock().await;
        let _ = process.kill().await;

        Ok(())
    }

    // --- Internal methods ---

    async fn ensure_initialized(&self) -> Result<()> {
        if *self.initialized.lock().await {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p);
        }

        trace!(server = %self.config.name, ?id, method, "sending request");
        let request_json = serde_json::to_string(&request)?;
        self.write_line(&request_json).await?;

        let response = timeout(self.config.timeout, self.read_response(&id))
            .await
            .map_err(|_| Error::Timeout)??;

        let result_value = response.into_result()?;
        let result: R = serde_json::from_value(result_value)?;

        Ok(result)
    }

    async fn notify<P>(&self, method: &str, params: Option<P>) -> Result<()>
    where
        P: serde::Serialize,
    {
        // Notifications have no ID
        let notification = match params {
            Some(p) => serde_json::json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": serde_json::to_value(p)?,
            }),
            None => serde_json::json!({ "jsonrpc": "2.0", "method": method }),
        };

        let notification_json = serde_json::to_string(&notification)?;
        self.write_line(&notification_json).await
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Read lines until the response carrying `id` arrives.
    async fn read_response(&self, id: &RequestId) -> Result<JsonRpcResponse> {
        let mut stdout = self.stdout.lock().await;

        loop {
            let mut line = String::new();
            let bytes_read = stdout.read_line(&mut line).await?;
            if bytes_read == 0 {
                return Err(Error::ServerExited);
            }

            if line.len() > MAX_OUTPUT_SIZE {
                return Err(Error::OutputTooLarge {
                    size: line.len(),
                    max: MAX_OUTPUT_SIZE,
                });
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match Incoming::parse(line) {
                Incoming::Response(response) if &response.id == id => return Ok(response),
                Incoming::Response(response) => {
                    warn!(server = %self.config.name, expected = ?id, got = ?response.id, "discarding response with unexpected id");
                }
                Incoming::Message { method } => {
                    debug!(server = %self.config.name, %method, "ignoring server message");
                }
                Incoming::Noise => {
                    debug!(server = %self.config.name, output = line, "ignoring non JSON-RPC output");
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// A server scripted in `sh`: it answers requests in the order our
    /// client sends them, which makes the ids predictable.
    fn scripted(script: &str) -> ServerConfig {
        ServerConfig::new("scripted", "sh").args(["-c", script])
    }

    const HANDSHAKE: &str = r#"
        read line
        echo 'Starting server'
        echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{},"resources":{}},"serverInfo":{"name":"demo"}}}'
        read line
        read line
        echo '{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info"}}'
        echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"calculator","inputSchema":{"type":"object"}}]}}'
    "#;

    #[test]
    fn server_config_builder() {
        let config = ServerConfig::new("test", "node").args(["server.js"]);
        assert_eq!(config.args, vec!["server.js".to_string()]);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn handshake_skips_noise_and_lists_tools() {
        let server = Server::connect(scripted(HANDSHAKE)).await.unwrap();

        assert!(server.is_initialized().await);
        let tools = server.tools().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "calculator");
    }

    #[tokio::test]
    async fn call_tool_and_read_resource() {
        let script = format!(
            "{HANDSHAKE}
            read line
            echo '{{\"jsonrpc\":\"2.0\",\"id\":3,\"result\":{{\"content\":[{{\"type\":\"text\",\"text\":\"Result: 42\"}}]}}}}'
            read line
            echo '{{\"jsonrpc\":\"2.0\",\"id\":4,\"result\":{{\"contents\":[{{\"uri\":\"knowledge://rust\",\"text\":\"Knowledge for topic: rust\"}}]}}}}'
            "
        );
        let server = Server::connect(scripted(&script)).await.unwrap();

        let result = server
            .call_tool("calculator", Some(serde_json::json!({"a": 6, "b": 7})))
            .await
            .unwrap();
        assert_eq!(result.first_text(), Some("Result: 42"));

        let read = server.read_resource("knowledge://rust").await.unwrap();
        assert_eq!(read.first_text(), Some("Knowledge for topic: rust"));
    }

    #[tokio::test]
    async fn tool_error_flag_becomes_error() {
        let script = format!(
            "{HANDSHAKE}
            read line
            echo '{{\"jsonrpc\":\"2.0\",\"id\":3,\"result\":{{\"isError\":true,\"content\":[{{\"type\":\"text\",\"text\":\"division by zero\"}}]}}}}'
            "
        );
        let server = Server::connect(scripted(&script)).await.unwrap();

        let err = server.call_tool("calculator", None).await.unwrap_err();
        assert!(matches!(err, Error::ToolCallFailed(ref text) if text == "division by zero"));
    }

    #[tokio::test]
    async fn exited_server_is_reported() {
        let err = Server::connect(scripted("exit 0")).await.err().unwrap();
        assert!(matches!(err, Error::ServerExited | Error::Io(_)));
    }

    #[tokio::test]
    async fn calls_before_initialize_are_rejected() {
        let server = Server::spawn(scripted("sleep 5")).await.unwrap();
        let err = server.call_tool("calculator", None).await.unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
    }
}
