//! MCP (Model Context Protocol) client library.
//!
//! This crate provides a client for communicating with MCP servers via stdio:
//! the handshake, tool listing and invocation, and resource listing and
//! reading.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{Server, ServerConfig};
//!
//! # async fn example() -> mcp::Result<()> {
//! let config = ServerConfig::new("demo", "node").args(["../server/dist/server.js"]);
//!
//! let server = Server::connect(config).await?;
//!
//! for tool in server.tools().await {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let result = server.call_tool("calculator", Some(serde_json::json!({
//!     "operation": "multiply", "a": 6, "b": 7
//! }))).await?;
//! println!("{:?}", result.first_text());
//!
//! let topic = server.read_resource("knowledge://rust").await?;
//! println!("{:?}", topic.first_text());
//!
//! server.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod protocol;
mod server;

pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, Incoming, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ListResourceTemplatesResult, ListResourcesResult,
    ListToolsResult, PROTOCOL_VERSION, ReadResourceParams, ReadResourceResult, RequestId,
    Resource, ResourceContents, ResourceTemplate, ServerCapabilities, ServerInfo, Tool,
    ToolContent,
};
pub use server::{DEFAULT_TIMEOUT, MAX_OUTPUT_SIZE, Server, ServerConfig};
