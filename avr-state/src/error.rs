use thiserror::Error;

/// Errors raised by the state cache
#[derive(Debug, Error)]
pub enum StateError {
    /// The device was never inserted into the cache
    #[error("Unknown device: {0}")]
    UnknownDevice(String),
}

/// Type alias for results that can return a StateError
pub type Result<T> = std::result::Result<T, StateError>;
