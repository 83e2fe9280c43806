//! The capability catalog.

use std::collections::HashMap;

use mcp::Tool;
use tracing::{debug, warn};

use super::schema::ArgumentSchema;
use super::transport::{CapabilityTransport, ResourceListing};
use crate::model::ToolSpec;
use crate::{Error, Result};

/// Scheme used to build resource URIs when a listing does not carry one.
pub const DEFAULT_RESOURCE_SCHEME: &str = "knowledge://";

const NO_DESCRIPTION: &str = "No description provided";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Tool,
    Resource,
}

/// How an invocation of a capability reaches the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handler {
    /// `call_tool` with the validated arguments.
    CallTool,
    /// `read_resource` on `uri_prefix` followed by the topic argument.
    ReadResource { uri_prefix: String },
}

/// One entry of the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub schema: ArgumentSchema,
    pub handler: Handler,
}

impl Capability {
    pub fn kind(&self) -> CapabilityKind {
        match self.handler {
            Handler::CallTool => CapabilityKind::Tool,
            Handler::ReadResource { .. } => CapabilityKind::Resource,
        }
    }

    fn from_tool(tool: Tool) -> Self {
        Self {
            schema: ArgumentSchema::normalize(&tool.input_schema),
            description: non_empty(tool.description).unwrap_or_else(|| NO_DESCRIPTION.to_string()),
            name: tool.name,
            handler: Handler::CallTool,
        }
    }

    fn from_resource(listing: ResourceListing, default_scheme: &str) -> Self {
        let uri_prefix = uri_prefix(&listing).unwrap_or_else(|| default_scheme.to_string());
        let description = non_empty(listing.description)
            .unwrap_or_else(|| format!("Read {} content for a topic", listing.name));
        Self {
            name: listing.name,
            description,
            schema: ArgumentSchema::topic(),
            handler: Handler::ReadResource { uri_prefix },
        }
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            schema: self.schema.to_json(),
        }
    }
}

/// All capabilities known to a session: tools first, then resources.
///
/// Names are unique across both kinds. Immutable once built, so it can be
/// shared between sessions behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Directory {
    entries: Vec<Capability>,
    index: HashMap<String, usize>,
    specs: Vec<ToolSpec>,
}

impl Directory {
    /// Query the transport for its tools and resources.
    ///
    /// Fails with [`Error::DirectoryUnavailable`] if either listing fails;
    /// a session cannot run without a catalog.
    pub async fn load<T>(transport: &T, default_scheme: &str) -> Result<Self>
    where
        T: CapabilityTransport + ?Sized,
    {
        let tools = transport
            .list_tools()
            .await
            .map_err(Error::DirectoryUnavailable)?;
        let resources = transport
            .list_resources()
            .await
            .map_err(Error::DirectoryUnavailable)?;

        let directory = Self::from_listings(tools, resources, default_scheme);
        debug!(
            tools = directory.tools().count(),
            resources = directory.resources().count(),
            "capability directory loaded"
        );
        Ok(directory)
    }

    /// Build a directory from listings already in hand.
    ///
    /// On a name collision the first entry wins, and tools are inserted
    /// before resources, so a tool always shadows a resource of the same
    /// name.
    pub fn from_listings(
        tools: Vec<Tool>,
        resources: Vec<ResourceListing>,
        default_scheme: &str,
    ) -> Self {
        let mut directory = Self::default();

        let candidates = tools.into_iter().map(Capability::from_tool).chain(
            resources
                .into_iter()
                .map(|listing| Capability::from_resource(listing, default_scheme)),
        );

        for capability in candidates {
            if let Some(&existing) = directory.index.get(&capability.name) {
                warn!(
                    name = %capability.name,
                    kept = ?directory.entries[existing].kind(),
                    dropped = ?capability.kind(),
                    "duplicate capability name"
                );
                continue;
            }
            directory
                .index
                .insert(capability.name.clone(), directory.entries.len());
            directory.specs.push(capability.spec());
            directory.entries.push(capability);
        }

        directory
    }

    pub fn lookup(&self, name: &str) -> Option<&Capability> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn is_tool(&self, name: &str) -> bool {
        self.lookup(name)
            .is_some_and(|c| c.kind() == CapabilityKind::Tool)
    }

    pub fn is_resource(&self, name: &str) -> bool {
        self.lookup(name)
            .is_some_and(|c| c.kind() == CapabilityKind::Resource)
    }

    /// The catalog in the form attached to model requests.
    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.entries.iter()
    }

    pub fn tools(&self) -> impl Iterator<Item = &Capability> {
        self.iter().filter(|c| c.kind() == CapabilityKind::Tool)
    }

    pub fn resources(&self) -> impl Iterator<Item = &Capability> {
        self.iter().filter(|c| c.kind() == CapabilityKind::Resource)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

/// `knowledge://{topic}` gives `knowledge://`; a concrete
/// `knowledge://rust` keeps only its scheme.
fn uri_prefix(listing: &ResourceListing) -> Option<String> {
    if let Some(template) = &listing.uri_template {
        let prefix = template.split('{').next().unwrap_or_default();
        if !prefix.is_empty() {
            return Some(prefix.to_string());
        }
    }
    let uri = listing.uri.as_deref()?;
    let end = uri.find("://")? + "://".len();
    Some(uri[..end].to_string())
}
