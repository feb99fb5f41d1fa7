//! Error types for the HTTP client

use thiserror::Error;

/// Errors that can occur while talking to a receiver over HTTP
#[derive(Debug, Error)]
pub enum HttpError {
    /// Network or HTTP communication error (unreachable, timeout, reset)
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// The body could not be parsed as XML
    #[error("XML parsing error: {0}")]
    Parse(String),
}
