//! Protocol adapters for network AV receivers
//!
//! This crate normalizes the two vendor HTTP control protocols behind one
//! [`AvrProtocol`] trait. It uses the private `http-client` crate for the
//! transport and the shared XML flattening.
//!
//! ```rust,no_run
//! use avr_api::{
//!     create_protocol, ApiConfig, AvrCommand, CommandCategory, CommandOptions, DeviceConfig, HttpClient,
//! };
//!
//! let device = DeviceConfig::new("192.168.1.30");
//! let protocol = create_protocol(device, &ApiConfig::default(), HttpClient::new())?;
//!
//! let catalog = protocol.input_catalog()?;
//! let state = protocol.fetch_state(&catalog)?;
//! println!("power: {:?}, volume: {:?}", state.power, state.volume);
//!
//! let command = AvrCommand::resolve(CommandCategory::Volume, "volume_set", &CommandOptions::slider(-40.0))?;
//! protocol.execute(&command, state.muted)?;
//! # Ok::<(), avr_api::ApiError>(())
//! ```

pub mod catalog;
pub mod command;
pub mod config;
pub mod error;
pub mod heos;
pub mod liveness;
pub mod patch;
pub mod protocol;
pub mod standard;
pub mod volume;

pub use catalog::{InputCatalog, InputEntry};
pub use command::{
    default_descriptors, input_descriptors, AvrCommand, CommandCategory, CommandDescriptor,
    CommandKind, CommandOptions, CommandSubtype,
};
pub use config::{ApiConfig, DeviceConfig, ProtocolMode, Zone};
pub use error::{ApiError, Result};
pub use http_client::HttpClient;
pub use heos::{ExtendedInfo, HeosApiClient, DEFAULT_EXTENDED_QUERIES};
pub use liveness::{LivenessProbe, PingProbe, StaticProbe};
pub use patch::StatePatch;
pub use protocol::{create_protocol, AvrProtocol, RequestPlan};
pub use standard::StandardApiClient;
pub use volume::VolumeScale;
