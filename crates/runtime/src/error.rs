use crate::model::ModelError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The capability catalog could not be listed. Nothing can run
    /// without it.
    #[error("capability directory unavailable: {0}")]
    DirectoryUnavailable(#[source] mcp::Error),

    /// Reserved for embedders that drive [`Backend`](crate::Backend)
    /// directly. A session reports model failures inside the round
    /// instead of returning them.
    #[error("model call failed: {0}")]
    ModelCallFailed(#[source] ModelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
