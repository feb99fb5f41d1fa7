//! The adapter contract shared by both receiver protocols

use http_client::HttpClient;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::catalog::InputCatalog;
use crate::command::AvrCommand;
use crate::config::{ApiConfig, DeviceConfig, ProtocolMode};
use crate::error::Result;
use crate::heos::HeosApiClient;
use crate::patch::StatePatch;
use crate::standard::StandardApiClient;

/// Characters escaped when a vendor code is embedded in a query string.
/// `/` is kept as-is since input codes such as `SAT/CBL` carry it.
const QUERY_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'>')
    .add(b'?');

/// Escape a vendor code for use in a query string
pub(crate) fn encode_value(value: &str) -> String {
    utf8_percent_encode(value, QUERY_VALUE).to_string()
}

/// The request a command translates to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPlan {
    /// A GET of the given path and query, relative to the device base URL
    Get(String),
    /// Nothing is sent; the reason is logged
    NoOp(&'static str),
}

/// One receiver protocol bound to one device
pub trait AvrProtocol: Send + Sync {
    fn mode(&self) -> ProtocolMode;

    fn device(&self) -> &DeviceConfig;

    /// Fetch and normalize the current device state
    fn fetch_state(&self, catalog: &InputCatalog) -> Result<StatePatch>;

    /// Resolve the input catalog of the device
    fn input_catalog(&self) -> Result<InputCatalog>;

    /// Translate a command into a request without sending it.
    ///
    /// `known_muted` is the cached mute state, used to pick the direction
    /// of a mute toggle where the protocol has no toggle verb.
    fn plan(&self, command: &AvrCommand, known_muted: Option<bool>) -> RequestPlan;

    /// Translate and send a command, returning what was sent
    fn execute(&self, command: &AvrCommand, known_muted: Option<bool>) -> Result<RequestPlan>;
}

/// Build the adapter selected by the device configuration
pub fn create_protocol(
    device: DeviceConfig,
    api: &ApiConfig,
    http: HttpClient,
) -> Result<Box<dyn AvrProtocol>> {
    device.validate()?;
    Ok(match device.mode {
        ProtocolMode::Standard => Box::new(StandardApiClient::new(device, api.clone(), http)),
        ProtocolMode::Heos => Box::new(HeosApiClient::new(device, api.clone(), http)),
    })
}
