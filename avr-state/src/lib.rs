//! Device state for AV receivers
//!
//! This crate owns the normalized [`DeviceState`] of every device and the
//! refresh state machine that keeps it current:
//!
//! - [`DeviceStateCache`]: per-device state, written by polls and daemon
//!   pushes, with change notifications
//! - [`Refresher`]: liveness pre-flight, protocol fetch and cache update
//! - [`logging`]: subscriber setup for applications
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use avr_api::{create_protocol, ApiConfig, DeviceConfig, HttpClient, PingProbe};
//! use avr_state::{DeviceId, DeviceStateCache, Refresher};
//!
//! let cache = DeviceStateCache::new();
//! let id = DeviceId::from("living-room");
//! cache.insert_device(id.clone());
//!
//! let protocol = create_protocol(DeviceConfig::new("192.168.1.30"), &ApiConfig::default(), HttpClient::new())?;
//! let catalog = protocol.input_catalog()?;
//!
//! let refresher = Refresher::new(cache.clone(), Arc::new(PingProbe::new()));
//! refresher.refresh(&id, protocol.as_ref(), &catalog)?;
//! println!("{:?}", cache.get(&id));
//! ```

pub mod cache;
pub mod error;
pub mod logging;
pub mod model;
pub mod refresh;

pub use cache::DeviceStateCache;
pub use error::{Result, StateError};
pub use logging::{init_logging, init_logging_from_env, LoggingError, LoggingMode};
pub use model::{
    patch_updates, DeviceId, DeviceState, FieldUpdate, Reachability, StateChange, StateField,
};
pub use refresh::{RefreshOutcome, Refresher};
