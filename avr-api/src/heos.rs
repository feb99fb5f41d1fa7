//! Client for the HEOS-generation control API

use std::collections::BTreeMap;

use http_client::xml::element_text;
use http_client::{FlatFields, HttpClient, XmlReply};
use tracing::{debug, info, warn};
use xmltree::Element;

use crate::catalog::{live_catalog, InputCatalog};
use crate::command::AvrCommand;
use crate::config::{ApiConfig, DeviceConfig, ProtocolMode, Zone};
use crate::error::{ApiError, Result};
use crate::patch::{normalize, parse_switch, FieldKeys, StatePatch};
use crate::protocol::{encode_value, AvrProtocol, RequestPlan};
use crate::volume::heos_level;

const DEVICE_INFO_PATH: &str = "/goform/Deviceinfo.xml";
const APP_COMMAND_PATH: &str = "/goform/AppCommand.xml";
const DIRECT_COMMAND_PATH: &str = "/goform/formiPhoneAppDirect.xml";

/// Extended queries issued when no explicit list is given
pub const DEFAULT_EXTENDED_QUERIES: &[&str] = &[
    "GetZoneName",
    "GetAllZonePowerStatus",
    "GetAllZoneSource",
    "GetAllZoneVolume",
    "GetAllZoneMuteStatus",
    "GetRenameSource",
    "GetDeletedSource",
    "GetSurroundModeStatus",
    "GetToneControl",
    "GetSourceStatus",
    "GetNetAudioStatus",
];

const STATE_KEYS: FieldKeys = FieldKeys {
    power: "Power",
    input: "InputFuncSelect",
    volume: "MasterVolume",
    mute: "Mute",
    sound_mode: None,
};

/// Answers of an extended query batch, keyed by query name.
///
/// Each value is the `cmd` element of the answer.
pub type ExtendedInfo = BTreeMap<String, Element>;

/// Body of one `AppCommand.xml` query
pub fn app_command_body(name: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<tx>\n<cmd id=\"1\">{}</cmd>\n</tx>",
        name
    )
}

/// Adapter for receivers speaking the HEOS protocol
#[derive(Debug, Clone)]
pub struct HeosApiClient {
    device: DeviceConfig,
    api: ApiConfig,
    http: HttpClient,
}

impl HeosApiClient {
    pub fn new(device: DeviceConfig, api: ApiConfig, http: HttpClient) -> Self {
        Self { device, api, http }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.device.ip, self.api.heos_port, path)
    }

    fn light_status_path(&self) -> &'static str {
        match self.device.zone {
            Zone::Main => "/goform/formMainZone_MainZoneXmlStatusLite.xml",
            Zone::Zone2 => "/goform/formZone2_Zone2XmlStatusLite.xml",
            Zone::Zone3 => "/goform/formZone3_Zone3XmlStatusLite.xml",
        }
    }

    /// Fetch the static device description
    pub fn fetch_device_info(&self) -> Result<FlatFields> {
        let reply = self
            .http
            .get_xml(&self.url(DEVICE_INFO_PATH), self.api.fetch_timeout())?;
        Ok(reply.flatten())
    }

    /// Fetch the short status of the configured zone
    pub fn fetch_light(&self) -> Result<FlatFields> {
        let reply = self
            .http
            .get_xml(&self.url(self.light_status_path()), self.api.fetch_timeout())?;
        Ok(reply.flatten())
    }

    /// Run a batch of extended queries.
    ///
    /// Queries run in order. The batch stops at the first unsupported
    /// answer or transport failure; answers collected so far are returned.
    pub fn fetch_extended(&self, queries: &[&str]) -> ExtendedInfo {
        let url = self.url(APP_COMMAND_PATH);
        let mut results = ExtendedInfo::new();

        for query in queries {
            let reply = self
                .http
                .post_xml(&url, &app_command_body(query), self.api.fetch_timeout());
            match reply {
                Ok(XmlReply::Document(root)) => {
                    let cmd = root.get_child("cmd").cloned().unwrap_or(root);
                    results.insert(query.to_string(), cmd);
                }
                Ok(XmlReply::Unsupported) => {
                    info!("{} unsupported on {}, stopping batch", query, self.device.ip);
                    break;
                }
                Err(e) => {
                    warn!("{} failed on {}: {}", query, self.device.ip, e);
                    break;
                }
            }
        }

        results
    }

    /// Current mute state as reported by the light status
    pub fn fetch_mute(&self) -> Option<bool> {
        match self.fetch_light() {
            Ok(fields) => fields
                .get(STATE_KEYS.mute)
                .and_then(|v| v.as_text())
                .and_then(parse_switch),
            Err(e) => {
                warn!("cannot read mute state of {}: {}", self.device.ip, e);
                None
            }
        }
    }

    fn direct(&self, code: String) -> RequestPlan {
        RequestPlan::Get(format!("{}?{}", DIRECT_COMMAND_PATH, code))
    }

    /// `Z<n>` prefix of secondary zones
    fn zone_prefix(&self) -> Option<String> {
        self.device.zone.number().map(|n| format!("Z{}", n))
    }
}

impl AvrProtocol for HeosApiClient {
    fn mode(&self) -> ProtocolMode {
        ProtocolMode::Heos
    }

    fn device(&self) -> &DeviceConfig {
        &self.device
    }

    fn fetch_state(&self, catalog: &InputCatalog) -> Result<StatePatch> {
        let fields = self.fetch_light()?;
        if fields.is_empty() {
            warn!("HEOS API answered without zone status on {}", self.device.ip);
            return Err(ApiError::FeatureUnsupported("HEOS zone status".to_string()));
        }
        let mut patch = normalize(&fields, STATE_KEYS, catalog);

        let extended = self.fetch_extended(&["GetSurroundModeStatus"]);
        patch.sound_mode = extended
            .get("GetSurroundModeStatus")
            .and_then(|cmd| cmd.get_child("surround"))
            .map(element_text);

        Ok(patch)
    }

    fn input_catalog(&self) -> Result<InputCatalog> {
        let extended = self.fetch_extended(&["GetRenameSource", "GetDeletedSource"]);
        let catalog = live_catalog(
            extended.get("GetRenameSource"),
            extended.get("GetDeletedSource"),
        );
        info!("{} reports {} sources", self.device.ip, catalog.len());
        Ok(catalog)
    }

    fn plan(&self, command: &AvrCommand, known_muted: Option<bool>) -> RequestPlan {
        let zone = self.zone_prefix();

        match command {
            AvrCommand::PowerOn => self.direct(match zone {
                Some(z) => format!("{}ON", z),
                None => "ZMON".to_string(),
            }),
            AvrCommand::PowerOff => self.direct(match zone {
                Some(z) => format!("{}OFF", z),
                None => "ZMOFF".to_string(),
            }),
            AvrCommand::SetVolume(relative) => {
                let level = heos_level(self.api.volume_scale().to_absolute(*relative));
                self.direct(format!("{}{}", zone.as_deref().unwrap_or("MV"), level))
            }
            AvrCommand::MuteToggle => {
                // Unknown state mutes.
                let action = if known_muted == Some(true) { "MUOFF" } else { "MUON" };
                self.direct(format!("{}{}", zone.unwrap_or_default(), action))
            }
            AvrCommand::MuteOn => self.direct(format!("{}MUON", zone.unwrap_or_default())),
            AvrCommand::MuteOff => self.direct(format!("{}MUOFF", zone.unwrap_or_default())),
            AvrCommand::SelectInput(code) => self.direct(format!(
                "{}{}",
                zone.as_deref().unwrap_or("SI"),
                encode_value(code)
            )),
            AvrCommand::SelectSoundMode(mode) => match zone {
                None => self.direct(format!("MS{}", encode_value(mode))),
                Some(_) => RequestPlan::NoOp("sound mode applies to the main zone only"),
            },
            AvrCommand::TunerPreset(preset) => self.direct(format!("TPAN{:02}", preset)),
            AvrCommand::Refresh => RequestPlan::NoOp("refresh sends no request"),
        }
    }

    fn execute(&self, command: &AvrCommand, known_muted: Option<bool>) -> Result<RequestPlan> {
        let known_muted = match (command, known_muted) {
            (AvrCommand::MuteToggle, None) => self.fetch_mute(),
            (_, known) => known,
        };

        let plan = self.plan(command, known_muted);
        match &plan {
            RequestPlan::Get(path) => {
                let url = self.url(path);
                debug!("HEOS command {} -> {}", command.logical_id(), url);
                self.http.get_text(&url, self.api.send_timeout())?;
            }
            RequestPlan::NoOp(reason) => debug!("{}: {}", command.logical_id(), reason),
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn client(zone: Zone, offset: f64) -> HeosApiClient {
        HeosApiClient::new(
            DeviceConfig::new("192.168.1.40")
                .with_mode(ProtocolMode::Heos)
                .with_zone(zone),
            ApiConfig {
                volume_offset: offset,
                ..Default::default()
            },
            HttpClient::new(),
        )
    }

    fn code(plan: RequestPlan) -> String {
        match plan {
            RequestPlan::Get(path) => path
                .strip_prefix("/goform/formiPhoneAppDirect.xml?")
                .map(str::to_string)
                .unwrap_or(path),
            RequestPlan::NoOp(reason) => panic!("unexpected no-op: {}", reason),
        }
    }

    #[test]
    fn test_volume_set_with_offset() {
        let plan = client(Zone::Main, 10.0).plan(&AvrCommand::SetVolume(20.0), None);
        assert_eq!(code(plan), "MV30");
    }

    #[rstest]
    #[case(Zone::Main, AvrCommand::PowerOn, "ZMON")]
    #[case(Zone::Main, AvrCommand::PowerOff, "ZMOFF")]
    #[case(Zone::Zone2, AvrCommand::PowerOn, "Z2ON")]
    #[case(Zone::Zone3, AvrCommand::PowerOff, "Z3OFF")]
    #[case(Zone::Main, AvrCommand::SetVolume(-75.0), "MV05")]
    #[case(Zone::Main, AvrCommand::SetVolume(-39.5), "MV405")]
    #[case(Zone::Zone2, AvrCommand::SetVolume(-40.0), "Z240")]
    #[case(Zone::Main, AvrCommand::MuteOn, "MUON")]
    #[case(Zone::Zone2, AvrCommand::MuteOff, "Z2MUOFF")]
    #[case(Zone::Main, AvrCommand::SelectInput("SAT/CBL".into()), "SISAT/CBL")]
    #[case(Zone::Zone3, AvrCommand::SelectInput("TUNER".into()), "Z3TUNER")]
    #[case(Zone::Main, AvrCommand::SelectSoundMode("MOVIE".into()), "MSMOVIE")]
    #[case(Zone::Main, AvrCommand::TunerPreset(7), "TPAN07")]
    fn test_direct_codes(#[case] zone: Zone, #[case] command: AvrCommand, #[case] expected: &str) {
        assert_eq!(code(client(zone, 80.0).plan(&command, None)), expected);
    }

    #[rstest]
    #[case(Some(true), "MUOFF")]
    #[case(Some(false), "MUON")]
    #[case(None, "MUON")]
    fn test_mute_toggle_direction(#[case] known: Option<bool>, #[case] expected: &str) {
        assert_eq!(code(client(Zone::Main, 80.0).plan(&AvrCommand::MuteToggle, known)), expected);
    }

    #[test]
    fn test_sound_mode_on_secondary_zone_is_noop() {
        let plan = client(Zone::Zone2, 80.0).plan(&AvrCommand::SelectSoundMode("MOVIE".into()), None);
        assert!(matches!(plan, RequestPlan::NoOp(_)));
    }

    #[test]
    fn test_app_command_body() {
        assert_eq!(
            app_command_body("GetZoneName"),
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<tx>\n<cmd id=\"1\">GetZoneName</cmd>\n</tx>"
        );
    }
}
