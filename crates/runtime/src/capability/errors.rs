use thiserror::Error;

/// Why a single capability dispatch failed.
///
/// These never leave the dispatcher: they are rendered into the
/// capability-result turn so the model can see them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DispatchError {
    /// The proposed arguments do not fit the capability's schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The transport call itself failed.
    #[error(transparent)]
    Transport(#[from] mcp::Error),
}
