//! Normalized partial state produced by a fetch

use http_client::FlatFields;
use serde::{Deserialize, Serialize};

use crate::catalog::InputCatalog;
use crate::volume::{parse_level, OFFLINE_VOLUME};

/// Fields read from a receiver in one fetch.
///
/// `None` means the receiver did not report the field; applying the patch
/// leaves the cached value untouched for those fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatePatch {
    pub power: Option<bool>,
    pub input: Option<String>,
    /// Relative volume
    pub volume: Option<f64>,
    pub muted: Option<bool>,
    pub sound_mode: Option<String>,
    pub tuner_preset: Option<u8>,
    pub station_name: Option<String>,
}

impl StatePatch {
    /// The sentinel applied to a device that failed the liveness check
    pub fn offline() -> Self {
        Self {
            power: Some(false),
            input: Some(String::new()),
            volume: Some(OFFLINE_VOLUME),
            sound_mode: Some(String::new()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Element names of the fields a protocol reports
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldKeys {
    pub power: &'static str,
    pub input: &'static str,
    pub volume: &'static str,
    pub mute: &'static str,
    pub sound_mode: Option<&'static str>,
}

/// Read the known fields out of a flattened document.
///
/// The input code is translated to its display name when the catalog knows
/// it, otherwise the raw value is kept.
pub(crate) fn normalize(fields: &FlatFields, keys: FieldKeys, catalog: &InputCatalog) -> StatePatch {
    let text = |key: &str| fields.get(key).and_then(|v| v.as_text()).map(str::trim);

    StatePatch {
        power: text(keys.power).map(|raw| !raw.eq_ignore_ascii_case("off") && !raw.eq_ignore_ascii_case("standby")),
        input: text(keys.input).map(|raw| {
            catalog
                .display_name(raw)
                .map(str::to_string)
                .unwrap_or_else(|| raw.to_string())
        }),
        volume: text(keys.volume).and_then(parse_level),
        muted: text(keys.mute).and_then(parse_switch),
        sound_mode: keys.sound_mode.and_then(text).map(str::to_string),
        ..Default::default()
    }
}

/// Parse an `on`/`off` switch value in any case
pub fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "1" | "true" => Some(true),
        "off" | "0" | "false" | "standby" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_client::FieldValue;

    const KEYS: FieldKeys = FieldKeys {
        power: "ZonePower",
        input: "InputFuncSelect",
        volume: "MasterVolume",
        mute: "Mute",
        sound_mode: Some("selectSurround"),
    };

    fn fields(pairs: &[(&str, &str)]) -> FlatFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::Text(v.to_string())))
            .collect()
    }

    #[test]
    fn test_offline_sentinel() {
        let patch = StatePatch::offline();
        assert_eq!(patch.power, Some(false));
        assert_eq!(patch.input.as_deref(), Some(""));
        assert_eq!(patch.sound_mode.as_deref(), Some(""));
        assert_eq!(patch.volume, Some(-99.0));
        assert_eq!(patch.muted, None);
    }

    #[test]
    fn test_normalize_reads_known_fields() {
        let catalog = InputCatalog::from_pairs([("TV", "TV Audio")]);
        let patch = normalize(
            &fields(&[
                ("ZonePower", "ON"),
                ("InputFuncSelect", "TV"),
                ("MasterVolume", "-40.5"),
                ("Mute", "off"),
                ("selectSurround", "STEREO "),
            ]),
            KEYS,
            &catalog,
        );

        assert_eq!(patch.power, Some(true));
        assert_eq!(patch.input.as_deref(), Some("TV Audio"));
        assert_eq!(patch.volume, Some(-40.5));
        assert_eq!(patch.muted, Some(false));
        assert_eq!(patch.sound_mode.as_deref(), Some("STEREO"));
    }

    #[test]
    fn test_normalize_leaves_missing_fields_empty() {
        let patch = normalize(&fields(&[("ZonePower", "OFF"), ("InputFuncSelect", "Online Music")]), KEYS, &InputCatalog::new());
        assert_eq!(patch.power, Some(false));
        assert_eq!(patch.input.as_deref(), Some("Online Music"));
        assert_eq!(patch.volume, None);
        assert_eq!(patch.sound_mode, None);
        assert!(StatePatch::default().is_empty());
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_parse_switch() {
        assert_eq!(parse_switch("ON"), Some(true));
        assert_eq!(parse_switch("off"), Some(false));
        assert_eq!(parse_switch("STANDBY"), Some(false));
        assert_eq!(parse_switch("maybe"), None);
    }
}
