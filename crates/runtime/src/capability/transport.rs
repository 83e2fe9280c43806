//! The seam between the orchestrator and whatever hosts the capabilities.

use std::future::Future;

use mcp::{CallToolResult, ReadResourceResult, Server, Tool};
use serde_json::{Map, Value};

/// A readable resource as reported by the transport.
///
/// Servers describe resources either as concrete URIs or as URI templates;
/// whichever is present tells the directory how to build read URIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceListing {
    pub name: String,
    pub description: Option<String>,
    pub uri: Option<String>,
    pub uri_template: Option<String>,
}

/// Request/response access to remotely hosted tools and resources.
///
/// Implementations hold a live session; each method is one round trip.
pub trait CapabilityTransport: Send + Sync {
    fn list_tools(&self) -> impl Future<Output = Result<Vec<Tool>, mcp::Error>> + Send;

    fn list_resources(
        &self,
    ) -> impl Future<Output = Result<Vec<ResourceListing>, mcp::Error>> + Send;

    fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> impl Future<Output = Result<CallToolResult, mcp::Error>> + Send;

    fn read_resource(
        &self,
        uri: &str,
    ) -> impl Future<Output = Result<ReadResourceResult, mcp::Error>> + Send;
}

impl CapabilityTransport for Server {
    async fn list_tools(&self) -> Result<Vec<Tool>, mcp::Error> {
        self.refresh_tools().await?;
        Ok(self.tools().await)
    }

    /// Templates first, then concrete resources.
    async fn list_resources(&self) -> Result<Vec<ResourceListing>, mcp::Error> {
        let templates = Server::list_resource_templates(self).await?;
        let resources = Server::list_resources(self).await?;

        let listings = templates
            .into_iter()
            .map(|t| ResourceListing {
                name: t.name,
                description: t.description,
                uri: None,
                uri_template: Some(t.uri_template),
            })
            .chain(resources.into_iter().map(|r| ResourceListing {
                name: r.name,
                description: r.description,
                uri: Some(r.uri),
                uri_template: None,
            }))
            .collect();

        Ok(listings)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, mcp::Error> {
        Server::call_tool(self, name, Some(Value::Object(arguments))).await
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, mcp::Error> {
        Server::read_resource(self, uri).await
    }
}
