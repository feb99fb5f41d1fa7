//! Canonical device state model

use std::fmt;

use avr_api::StatePatch;
use serde::{Deserialize, Serialize};

/// Unique identifier of a configured device
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Result of the last liveness check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Reachability {
    #[default]
    Unknown,
    Unreachable,
    Reachable,
}

/// Names of the individually tracked state fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateField {
    Power,
    Input,
    Volume,
    Muted,
    SoundMode,
    TunerPreset,
    StationName,
    LastEvent,
    LastMessage,
    Reachability,
}

impl StateField {
    /// Logical id of the info command mirroring this field
    pub fn logical_id(&self) -> &'static str {
        match self {
            StateField::Power => "power_state",
            StateField::Input => "input",
            StateField::Volume => "volume",
            StateField::Muted => "mute_state",
            StateField::SoundMode => "sound_mode",
            StateField::TunerPreset => "preset",
            StateField::StationName => "station_name",
            StateField::LastEvent => "lastEvent",
            StateField::LastMessage => "lastMessage",
            StateField::Reachability => "reachability",
        }
    }
}

/// A single-field write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldUpdate {
    Power(bool),
    Input(String),
    /// Relative volume
    Volume(f64),
    Muted(bool),
    SoundMode(String),
    TunerPreset(u8),
    StationName(String),
    LastEvent(String),
    LastMessage(String),
}

impl FieldUpdate {
    pub fn field(&self) -> StateField {
        match self {
            FieldUpdate::Power(_) => StateField::Power,
            FieldUpdate::Input(_) => StateField::Input,
            FieldUpdate::Volume(_) => StateField::Volume,
            FieldUpdate::Muted(_) => StateField::Muted,
            FieldUpdate::SoundMode(_) => StateField::SoundMode,
            FieldUpdate::TunerPreset(_) => StateField::TunerPreset,
            FieldUpdate::StationName(_) => StateField::StationName,
            FieldUpdate::LastEvent(_) => StateField::LastEvent,
            FieldUpdate::LastMessage(_) => StateField::LastMessage,
        }
    }
}

/// Normalized state of one device.
///
/// Every field is `None` until a poll or push first reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub power: Option<bool>,
    /// Display name of the selected input
    pub input: Option<String>,
    /// Relative volume
    pub volume: Option<f64>,
    pub muted: Option<bool>,
    pub sound_mode: Option<String>,
    pub tuner_preset: Option<u8>,
    pub station_name: Option<String>,
    pub last_event: Option<String>,
    /// Timestamp of the last daemon message, as reported by the daemon
    pub last_message: Option<String>,
    pub reachability: Reachability,
}

fn replace<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
    if slot.as_ref() == Some(&value) {
        false
    } else {
        *slot = Some(value);
        true
    }
}

impl DeviceState {
    /// Write one field, returning whether its value changed
    pub fn apply(&mut self, update: FieldUpdate) -> bool {
        match update {
            FieldUpdate::Power(v) => replace(&mut self.power, v),
            FieldUpdate::Input(v) => replace(&mut self.input, v),
            FieldUpdate::Volume(v) => replace(&mut self.volume, v),
            FieldUpdate::Muted(v) => replace(&mut self.muted, v),
            FieldUpdate::SoundMode(v) => replace(&mut self.sound_mode, v),
            FieldUpdate::TunerPreset(v) => replace(&mut self.tuner_preset, v),
            FieldUpdate::StationName(v) => replace(&mut self.station_name, v),
            FieldUpdate::LastEvent(v) => replace(&mut self.last_event, v),
            FieldUpdate::LastMessage(v) => replace(&mut self.last_message, v),
        }
    }

    /// Write every field present in the patch, returning the changed fields
    pub fn apply_patch(&mut self, patch: &StatePatch) -> Vec<StateField> {
        patch_updates(patch)
            .into_iter()
            .filter_map(|update| {
                let field = update.field();
                self.apply(update).then_some(field)
            })
            .collect()
    }
}

/// Split a patch into single-field updates
pub fn patch_updates(patch: &StatePatch) -> Vec<FieldUpdate> {
    let mut updates = Vec::new();
    if let Some(power) = patch.power {
        updates.push(FieldUpdate::Power(power));
    }
    if let Some(input) = &patch.input {
        updates.push(FieldUpdate::Input(input.clone()));
    }
    if let Some(volume) = patch.volume {
        updates.push(FieldUpdate::Volume(volume));
    }
    if let Some(muted) = patch.muted {
        updates.push(FieldUpdate::Muted(muted));
    }
    if let Some(mode) = &patch.sound_mode {
        updates.push(FieldUpdate::SoundMode(mode.clone()));
    }
    if let Some(preset) = patch.tuner_preset {
        updates.push(FieldUpdate::TunerPreset(preset));
    }
    if let Some(station) = &patch.station_name {
        updates.push(FieldUpdate::StationName(station.clone()));
    }
    updates
}

/// Notification that one field of one device changed value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub device_id: DeviceId,
    pub field: StateField,
}
