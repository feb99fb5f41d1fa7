use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("API error: {0}")]
    ApiError(#[from] avr_api::ApiError),

    #[error("State error: {0}")]
    StateError(#[from] avr_state::StateError),

    #[error("Daemon error: {0}")]
    DaemonError(#[from] avr_daemon::DaemonError),

    #[error("Callback server error: {0}")]
    CallbackError(#[from] callback_server::CallbackError),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device already registered: {0}")]
    DuplicateDevice(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for SdkError {
    fn from(error: tokio::task::JoinError) -> Self {
        SdkError::Task(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SdkError>;
