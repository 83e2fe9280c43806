//! Capability catalog and dispatch.
//!
//! A capability is either a tool (invoked with arguments) or a resource
//! (read by topic). The [`Directory`] is loaded once from a
//! [`CapabilityTransport`]; the [`Dispatcher`] resolves model-proposed
//! invocations against it.

pub mod directory;
pub mod dispatcher;
pub mod errors;
pub mod schema;
pub mod transport;

pub use directory::{Capability, CapabilityKind, DEFAULT_RESOURCE_SCHEME, Directory, Handler};
pub use dispatcher::{Dispatcher, NO_RESOURCE_CONTENT, NO_TOOL_RESPONSE, TOOL_NOT_FOUND};
pub use errors::DispatchError;
pub use schema::{ArgumentSchema, ParamType, Parameter};
pub use transport::{CapabilityTransport, ResourceListing};
