use thiserror::Error;

/// Errors that can occur talking to the monitoring daemon
#[derive(Error, Debug)]
pub enum DaemonError {
    /// The daemon socket could not be reached or written
    #[error("Daemon unreachable at {addr}: {reason}")]
    Unreachable { addr: String, reason: String },

    /// A request could not be encoded
    #[error("Failed to serialize daemon request: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A callback body was not a daemon message
    #[error("Invalid daemon message: {0}")]
    InvalidMessage(String),

    /// No configured device answers to the given serial and zone
    #[error("No device for serial {serial} zone {zone}")]
    UnknownDevice { serial: String, zone: String },

    /// More than one configured device answers to the same serial and zone
    #[error("{count} devices configured for serial {serial} zone {zone}")]
    ConfigurationConflict {
        serial: String,
        zone: String,
        count: usize,
    },
}

/// Result type for daemon operations
pub type Result<T> = std::result::Result<T, DaemonError>;
