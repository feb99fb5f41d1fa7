//! Bridge to the AV receiver monitoring daemon
//!
//! In daemon-assisted mode an external, always-on process keeps a
//! connection to each receiver and pushes state changes back to the host.
//! This crate speaks both directions of that contract:
//!
//! - [`DaemonClient`]: writes `register`, `unregister` and `doDevice`
//!   requests to the daemon socket
//! - [`CallbackMessage`]: decodes the JSON bodies the daemon posts back
//! - [`DaemonBridge`]: registers devices, forwards commands, and applies
//!   pushed values to the [`avr_state::DeviceStateCache`]
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use avr_daemon::{DaemonBridge, DaemonClient, DaemonConfig};
//!
//! let config = DaemonConfig { enabled: true, api_key: "secret".into(), ..Default::default() };
//! let bridge = DaemonBridge::new(
//!     Arc::new(DaemonClient::from_config(&config)),
//!     directory,
//!     cache.clone(),
//!     api_config.volume_scale(),
//! );
//! let registered = bridge.register_all();
//! let report = bridge.handle_callback(&body)?;
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod message;
pub mod socket;

pub use bridge::{push_updates, DaemonBridge, DeviceDirectory, DirectoryEntry, ForwardOutcome, PushReport};
pub use config::DaemonConfig;
pub use error::{DaemonError, Result};
pub use message::{encode_request, CallbackMessage, DaemonRequest, DeviceAction, PushValue};
pub use socket::{DaemonClient, DaemonTransport};

#[cfg(any(test, feature = "test-support"))]
pub use socket::RecordingTransport;
