use thiserror::Error;

/// Why a model call produced no usable response.
///
/// Every variant is an ordinary failure of that one call; nothing is
/// retried.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The endpoint could not be reached.
    #[error("network: {0}")]
    Network(String),

    /// No response within the backend's request timeout.
    #[error("model call timed out")]
    Timeout,

    /// The endpoint answered with a non-success status.
    #[error("provider api: {0}")]
    Api(String),

    /// The response body did not have the expected shape.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}
