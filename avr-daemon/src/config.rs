//! Daemon connection settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the monitoring daemon listens and how it calls back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DaemonConfig {
    /// Route commands and state through the daemon at all
    /// Default: false
    pub enabled: bool,

    /// Host of the daemon's command socket
    /// Default: 127.0.0.1
    pub socket_host: String,

    /// Port of the daemon's command socket
    /// Default: 55010
    pub socket_port: u16,

    /// Pre-shared key carried by every socket message and callback
    pub api_key: String,

    /// Port the callback endpoint binds to
    /// Default: 55011
    pub callback_port: u16,

    /// Connect and write timeout for socket messages, in milliseconds
    /// Default: 2000
    pub socket_timeout_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            socket_host: "127.0.0.1".to_string(),
            socket_port: 55010,
            api_key: String::new(),
            callback_port: 55011,
            socket_timeout_ms: 2000,
        }
    }
}

impl DaemonConfig {
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    /// `host:port` of the daemon socket
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.socket_host, self.socket_port)
    }
}
