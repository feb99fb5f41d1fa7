//! Abstract command model
//!
//! A command invocation arrives as a `(category, logical id, options)`
//! triple. [`AvrCommand::resolve`] turns it into a closed enum so that the
//! protocol adapters can match exhaustively: every valid triple maps to
//! exactly one request or to a defined no-op, and everything else is
//! rejected with [`ApiError::InvalidParameter`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::InputCatalog;
use crate::error::{ApiError, Result};

/// Lowest tuner preset slot
pub const MIN_TUNER_PRESET: u8 = 1;
/// Highest tuner preset slot
pub const MAX_TUNER_PRESET: u8 = 56;

/// Functional group of a command, used to select the request builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandCategory {
    Power,
    Volume,
    Input,
    Sound,
    Tuner,
    Other,
}

impl CommandCategory {
    pub fn name(&self) -> &'static str {
        match self {
            CommandCategory::Power => "power",
            CommandCategory::Volume => "volume",
            CommandCategory::Input => "input",
            CommandCategory::Sound => "sound",
            CommandCategory::Tuner => "tuner",
            CommandCategory::Other => "other",
        }
    }
}

impl fmt::Display for CommandCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CommandCategory {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "power" => Ok(CommandCategory::Power),
            "volume" => Ok(CommandCategory::Volume),
            "input" => Ok(CommandCategory::Input),
            "sound" => Ok(CommandCategory::Sound),
            "tuner" => Ok(CommandCategory::Tuner),
            "other" | "" => Ok(CommandCategory::Other),
            other => Err(ApiError::InvalidParameter(format!(
                "unknown command category '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Info,
    Action,
}

/// Value shape of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandSubtype {
    Binary,
    Numeric,
    String,
    Slider,
    Select,
    Other,
}

/// Static description of one command exposed for a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDescriptor {
    pub logical_id: String,
    pub name: String,
    pub category: CommandCategory,
    pub kind: CommandKind,
    pub subtype: CommandSubtype,
    /// Info command whose value this action mirrors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub visible: bool,
}

impl CommandDescriptor {
    fn info(logical_id: &str, name: &str, category: CommandCategory, subtype: CommandSubtype) -> Self {
        Self {
            logical_id: logical_id.to_string(),
            name: name.to_string(),
            category,
            kind: CommandKind::Info,
            subtype,
            value: None,
            visible: true,
        }
    }

    fn action(
        logical_id: &str,
        name: &str,
        category: CommandCategory,
        subtype: CommandSubtype,
        value: Option<&str>,
    ) -> Self {
        Self {
            logical_id: logical_id.to_string(),
            name: name.to_string(),
            category,
            kind: CommandKind::Action,
            subtype,
            value: value.map(str::to_string),
            visible: true,
        }
    }
}

/// Options carried by a command invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandOptions {
    /// Numeric value of a slider command (relative volume, preset number)
    pub slider: Option<f64>,
    /// Chosen entry of a select command (sound mode)
    pub select: Option<String>,
}

impl CommandOptions {
    pub fn slider(value: f64) -> Self {
        Self {
            slider: Some(value),
            ..Default::default()
        }
    }

    pub fn select(value: impl Into<String>) -> Self {
        Self {
            select: Some(value.into()),
            ..Default::default()
        }
    }
}

/// A validated abstract command
#[derive(Debug, Clone, PartialEq)]
pub enum AvrCommand {
    PowerOn,
    PowerOff,
    /// Relative slider volume
    SetVolume(f64),
    /// Flip the mute state based on the last known value
    MuteToggle,
    MuteOn,
    MuteOff,
    /// Raw vendor input code
    SelectInput(String),
    SelectSoundMode(String),
    TunerPreset(u8),
    /// Re-read the device state without sending anything
    Refresh,
}

impl AvrCommand {
    /// Resolve a command invocation.
    ///
    /// `refresh` is accepted in any category. Input actions carry the raw
    /// vendor input code as their logical id.
    pub fn resolve(
        category: CommandCategory,
        logical_id: &str,
        opts: &CommandOptions,
    ) -> Result<Self> {
        if logical_id == "refresh" {
            return Ok(AvrCommand::Refresh);
        }

        let command = match (category, logical_id) {
            (CommandCategory::Power, "on") => AvrCommand::PowerOn,
            (CommandCategory::Power, "off") => AvrCommand::PowerOff,
            (CommandCategory::Volume, "volume_set") => {
                AvrCommand::SetVolume(required_slider(logical_id, opts)?)
            }
            (CommandCategory::Volume, "mute") => AvrCommand::MuteToggle,
            (CommandCategory::Volume, "mute_on") => AvrCommand::MuteOn,
            (CommandCategory::Volume, "mute_off") => AvrCommand::MuteOff,
            (CommandCategory::Input, code) if !code.trim().is_empty() => {
                AvrCommand::SelectInput(code.to_string())
            }
            (CommandCategory::Sound, "sound_mode_set") => match opts.select.as_deref() {
                Some(mode) if !mode.trim().is_empty() => {
                    AvrCommand::SelectSoundMode(mode.trim().to_string())
                }
                _ => {
                    return Err(ApiError::InvalidParameter(
                        "sound_mode_set requires a select value".to_string(),
                    ))
                }
            },
            (CommandCategory::Tuner, "tuner_preset") => {
                let preset = required_slider(logical_id, opts)?.round();
                AvrCommand::TunerPreset(clamp_preset(preset))
            }
            (category, id) => {
                return Err(ApiError::InvalidParameter(format!(
                    "no command '{}' in category '{}'",
                    id, category
                )))
            }
        };

        Ok(command)
    }

    pub fn category(&self) -> CommandCategory {
        match self {
            AvrCommand::PowerOn | AvrCommand::PowerOff => CommandCategory::Power,
            AvrCommand::SetVolume(_)
            | AvrCommand::MuteToggle
            | AvrCommand::MuteOn
            | AvrCommand::MuteOff => CommandCategory::Volume,
            AvrCommand::SelectInput(_) => CommandCategory::Input,
            AvrCommand::SelectSoundMode(_) => CommandCategory::Sound,
            AvrCommand::TunerPreset(_) => CommandCategory::Tuner,
            AvrCommand::Refresh => CommandCategory::Other,
        }
    }

    pub fn logical_id(&self) -> String {
        match self {
            AvrCommand::PowerOn => "on".to_string(),
            AvrCommand::PowerOff => "off".to_string(),
            AvrCommand::SetVolume(_) => "volume_set".to_string(),
            AvrCommand::MuteToggle => "mute".to_string(),
            AvrCommand::MuteOn => "mute_on".to_string(),
            AvrCommand::MuteOff => "mute_off".to_string(),
            AvrCommand::SelectInput(code) => code.clone(),
            AvrCommand::SelectSoundMode(_) => "sound_mode_set".to_string(),
            AvrCommand::TunerPreset(_) => "tuner_preset".to_string(),
            AvrCommand::Refresh => "refresh".to_string(),
        }
    }
}

fn required_slider(logical_id: &str, opts: &CommandOptions) -> Result<f64> {
    match opts.slider {
        Some(value) if value.is_finite() => Ok(value),
        _ => Err(ApiError::InvalidParameter(format!(
            "{} requires a slider value",
            logical_id
        ))),
    }
}

fn clamp_preset(preset: f64) -> u8 {
    preset.clamp(f64::from(MIN_TUNER_PRESET), f64::from(MAX_TUNER_PRESET)) as u8
}

/// The commands every device exposes regardless of its input catalog
pub fn default_descriptors() -> Vec<CommandDescriptor> {
    use CommandCategory as C;
    use CommandSubtype as S;

    vec![
        CommandDescriptor::info("power_state", "Power", C::Power, S::Binary),
        CommandDescriptor::info("input", "Input", C::Input, S::String),
        CommandDescriptor::info("volume", "Volume", C::Volume, S::Numeric),
        CommandDescriptor::info("sound_mode", "Sound mode", C::Sound, S::String),
        CommandDescriptor::info("mute_state", "Mute", C::Volume, S::Binary),
        CommandDescriptor::info("station_name", "Station", C::Tuner, S::String),
        CommandDescriptor::info("preset", "Preset", C::Tuner, S::Numeric),
        CommandDescriptor::info("lastEvent", "Last event", C::Other, S::String),
        CommandDescriptor::info("lastMessage", "Last message", C::Other, S::String),
        CommandDescriptor::action("on", "On", C::Power, S::Other, Some("power_state")),
        CommandDescriptor::action("off", "Off", C::Power, S::Other, Some("power_state")),
        CommandDescriptor::action("volume_set", "Volume level", C::Volume, S::Slider, Some("volume")),
        CommandDescriptor::action("mute", "Mute toggle", C::Volume, S::Other, Some("mute_state")),
        CommandDescriptor::action("mute_on", "Mute on", C::Volume, S::Other, Some("mute_state")),
        CommandDescriptor::action("mute_off", "Mute off", C::Volume, S::Other, Some("mute_state")),
        CommandDescriptor::action("refresh", "Refresh", C::Other, S::Other, None),
        CommandDescriptor::action("sound_mode_set", "Sound mode", C::Sound, S::Select, Some("sound_mode")),
        CommandDescriptor::action("tuner_preset", "Tuner preset", C::Tuner, S::Slider, Some("preset")),
    ]
}

/// One input action per catalog entry, hidden when the receiver marks the
/// source as deleted
pub fn input_descriptors(catalog: &InputCatalog) -> Vec<CommandDescriptor> {
    catalog
        .entries()
        .iter()
        .map(|entry| CommandDescriptor {
            visible: entry.visible,
            ..CommandDescriptor::action(
                &entry.code,
                &entry.name,
                CommandCategory::Input,
                CommandSubtype::Other,
                Some("input"),
            )
        })
        .collect()
}
