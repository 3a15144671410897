use std::time::Duration;

/// Errors from executing a query.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
    /// The server rejected the query
    #[error("ClickHouse error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unexpected response: {0}")]
    Unexpected(String),
}
