//! # Denon AVR SDK
//!
//! Control network AV receivers that speak either the Standard XML API or
//! the HEOS API, through one device model.
//!
//! ```rust,no_run
//! use avr_sdk::{AvrSystem, SystemConfig};
//! use avr_api::{CommandCategory, CommandOptions, DeviceConfig, ProtocolMode};
//! use avr_state::DeviceId;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), avr_sdk::SdkError> {
//!     let mut system = AvrSystem::new(SystemConfig::default());
//!     system.start().await?;
//!
//!     let id = DeviceId::from("living-room");
//!     system
//!         .add_device(id.clone(), DeviceConfig::new("192.168.1.30").with_mode(ProtocolMode::Heos))
//!         .await?;
//!
//!     system.execute(&id, "on", CommandCategory::Power, &CommandOptions::default()).await?;
//!     println!("{:?}", system.state(&id));
//!
//!     system.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! avr-sdk (AvrSystem, registry, dispatcher, scheduler)
//!     ↓                         ↓
//! avr-state (cache, refresh)   avr-daemon (socket, push bridge) ← callback-server
//!     ↓
//! avr-api (Standard / HEOS adapters)
//!     ↓
//! http-client (blocking HTTP, XML flatten)
//! ```
//!
//! Devices with daemon push enabled get their state from the daemon and
//! are skipped by the poll scheduler; every other device is polled.

pub use config::{NamedDevice, SchedulerConfig, SystemConfig};
pub use dispatcher::{CommandDispatcher, DispatchOutcome, SendResult};
pub use error::{Result, SdkError};
pub use registry::{DeviceRegistry, RegisteredDevice};
pub use scheduler::{PollScheduler, PollSummary};
pub use system::AvrSystem;

pub use avr_daemon::DaemonConfig;
pub use avr_state::{DeviceId, DeviceState, StateChange, StateField};

pub mod config;
mod dispatcher;
mod error;
mod registry;
mod scheduler;
mod system;
