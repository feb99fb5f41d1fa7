//! Wire messages exchanged with the monitoring daemon
//!
//! Requests go out over the daemon socket as one JSON document each.
//! Callbacks come back over HTTP as a JSON body with any of three
//! top-level sections (`daemon`, `devices`, `infos`).

use std::collections::BTreeMap;

use avr_api::volume::{round_half_step, MAX_ABSOLUTE_VOLUME};
use avr_api::{AvrCommand, VolumeScale, Zone};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DaemonError, Result};

/// Operation the daemon performs on one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceAction {
    TurnOn,
    TurnOff,
    SetVolume,
    MuteVolume,
    SelectSource,
    SelectSoundMode,
    TunerPreset,
}

impl DeviceAction {
    /// Map a command to a daemon action and its value.
    ///
    /// Returns `None` when the daemon has no equivalent: refresh, and sound
    /// mode or tuner preset outside the main zone. Volume is sent as the
    /// absolute device level.
    pub fn for_command(
        command: &AvrCommand,
        zone: Zone,
        known_muted: Option<bool>,
        scale: &VolumeScale,
    ) -> Option<(DeviceAction, Option<Value>)> {
        let mapped = match command {
            AvrCommand::PowerOn => (DeviceAction::TurnOn, None),
            AvrCommand::PowerOff => (DeviceAction::TurnOff, None),
            AvrCommand::SetVolume(relative) => {
                let absolute =
                    round_half_step(scale.to_absolute(*relative)).clamp(0.0, MAX_ABSOLUTE_VOLUME);
                (DeviceAction::SetVolume, Some(Value::from(absolute)))
            }
            AvrCommand::MuteToggle => {
                let mute = !known_muted.unwrap_or(false);
                (DeviceAction::MuteVolume, Some(Value::Bool(mute)))
            }
            AvrCommand::MuteOn => (DeviceAction::MuteVolume, Some(Value::Bool(true))),
            AvrCommand::MuteOff => (DeviceAction::MuteVolume, Some(Value::Bool(false))),
            AvrCommand::SelectInput(code) => {
                (DeviceAction::SelectSource, Some(Value::from(code.as_str())))
            }
            AvrCommand::SelectSoundMode(mode) if zone == Zone::Main => {
                (DeviceAction::SelectSoundMode, Some(Value::from(mode.as_str())))
            }
            AvrCommand::TunerPreset(preset) if zone == Zone::Main => {
                (DeviceAction::TunerPreset, Some(Value::from(*preset)))
            }
            _ => return None,
        };
        Some(mapped)
    }
}

/// Request written to the daemon socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum DaemonRequest {
    /// Start monitoring a device
    Register {
        serial: String,
        ip: String,
        name: String,
    },
    /// Stop monitoring a device
    Unregister { serial: String },
    /// Stop monitoring every device
    UnregisterAll,
    /// Perform an action on a device
    DoDevice {
        serial: String,
        #[serde(rename = "deviceAction")]
        device_action: DeviceAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        zone: Option<Zone>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
}

impl DaemonRequest {
    /// Registration under the daemon's naming convention
    pub fn register(serial: &str, ip: &str) -> Self {
        let serial = serial.trim().to_lowercase();
        DaemonRequest::Register {
            name: format!("Device #{}", serial),
            ip: ip.to_string(),
            serial,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            DaemonRequest::Register { .. } => "register",
            DaemonRequest::Unregister { .. } => "unregister",
            DaemonRequest::UnregisterAll => "unregisterAll",
            DaemonRequest::DoDevice { .. } => "doDevice",
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    apikey: &'a str,
    #[serde(flatten)]
    request: &'a DaemonRequest,
}

/// Encode a request with its API key as one JSON document
pub fn encode_request(api_key: &str, request: &DaemonRequest) -> Result<String> {
    Ok(serde_json::to_string(&Envelope {
        apikey: api_key,
        request,
    })?)
}

/// `daemon` section of a callback
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DaemonNotice {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// One reported value inside the `devices` section
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PushValue {
    #[serde(default)]
    pub value: Value,
    #[serde(default, rename = "cmdLabel")]
    pub cmd_label: Option<String>,
}

/// One entry of the `infos` section
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub serial: Option<String>,
}

/// serial -> zone key -> command name -> value
pub type DevicePushes = BTreeMap<String, BTreeMap<String, BTreeMap<String, PushValue>>>;

/// Decoded callback body
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CallbackMessage {
    #[serde(default)]
    pub daemon: Option<DaemonNotice>,
    #[serde(default)]
    pub devices: DevicePushes,
    /// ip -> reported device information
    #[serde(default)]
    pub infos: BTreeMap<String, DeviceInfo>,
}

impl CallbackMessage {
    pub fn parse(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| DaemonError::InvalidMessage(e.to_string()))?;
        if !value.is_object() {
            return Err(DaemonError::InvalidMessage(
                "callback body is not a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| DaemonError::InvalidMessage(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.daemon.is_none() && self.devices.is_empty() && self.infos.is_empty()
    }
}

/// Render a pushed value as text
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Read a pushed value as a number
pub fn value_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a pushed value as a flag; the daemon sends booleans, numbers or
/// strings depending on the field
pub fn value_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => {
            let s = s.trim();
            !(s.is_empty()
                || s == "0"
                || s.eq_ignore_ascii_case("false")
                || s.eq_ignore_ascii_case("off"))
        }
        _ => false,
    }
}
