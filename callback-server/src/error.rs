use thiserror::Error;

/// Errors raised by the callback endpoint
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("failed to bind callback server on {0}")]
    Bind(String),
}
