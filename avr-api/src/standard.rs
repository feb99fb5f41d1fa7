//! Client for the legacy "Standard" XML control API

use http_client::{indexed_values, FieldValue, FlatFields, HttpClient, XmlReply};
use tracing::{debug, info, warn};

use crate::catalog::{catalog_for_model, InputCatalog};
use crate::command::AvrCommand;
use crate::config::{ApiConfig, DeviceConfig, ProtocolMode, Zone};
use crate::error::{ApiError, Result};
use crate::patch::{normalize, FieldKeys, StatePatch};
use crate::protocol::{encode_value, AvrProtocol, RequestPlan};
use crate::volume::standard_level;

const FULL_STATUS_PATH: &str = "/goform/formMainZone_MainZoneXml.xml";
const LITE_STATUS_PATH: &str = "/goform/formMainZone_MainZoneXmlStatusLite.xml";
const COMMAND_PATH: &str = "/MainZone/index.put.asp";

const STATE_KEYS: FieldKeys = FieldKeys {
    power: "ZonePower",
    input: "InputFuncSelect",
    volume: "MasterVolume",
    mute: "Mute",
    sound_mode: Some("selectSurround"),
};

/// Adapter for receivers speaking the Standard protocol.
///
/// This protocol knows the main zone and zone 2; zone 2 requests carry a
/// `ZoneName=ZONE2` parameter.
#[derive(Debug, Clone)]
pub struct StandardApiClient {
    device: DeviceConfig,
    api: ApiConfig,
    http: HttpClient,
}

impl StandardApiClient {
    pub fn new(device: DeviceConfig, api: ApiConfig, http: HttpClient) -> Self {
        Self { device, api, http }
    }

    fn base_url(&self) -> String {
        format!("http://{}:{}", self.device.ip, self.api.standard_port)
    }

    fn zone_query(&self) -> &'static str {
        match self.device.zone {
            Zone::Zone2 => "?ZoneName=ZONE2",
            _ => "",
        }
    }

    fn zone_param(&self) -> &'static str {
        match self.device.zone {
            Zone::Zone2 => "&ZoneName=ZONE2",
            _ => "",
        }
    }

    fn get(&self, path: &str) -> Result<XmlReply> {
        let url = format!("{}{}{}", self.base_url(), path, self.zone_query());
        Ok(self.http.get_xml(&url, self.api.fetch_timeout())?)
    }

    /// Fetch the full zone status.
    ///
    /// Wrapped fields are flattened and `VideoSelectLists` is keyed by the
    /// `index` attribute of its entries. An unsupported answer yields an
    /// empty map.
    pub fn fetch_full(&self) -> Result<FlatFields> {
        let reply = self.get(FULL_STATUS_PATH)?;
        let mut fields = reply.flatten();
        if let XmlReply::Document(root) = &reply {
            fields.insert(
                "VideoSelectLists".to_string(),
                FieldValue::Indexed(indexed_values(root, "VideoSelectLists")),
            );
        }
        debug!("standard status of {}: {} fields", self.device.ip, fields.len());
        Ok(fields)
    }

    /// Fetch the short zone status
    pub fn fetch_light(&self) -> Result<FlatFields> {
        Ok(self.get(LITE_STATUS_PATH)?.flatten())
    }

    /// Raw `ModelId` reported by the receiver
    pub fn model_id(&self) -> Result<Option<String>> {
        let fields = self.fetch_full()?;
        Ok(fields
            .get("ModelId")
            .and_then(FieldValue::as_text)
            .map(str::to_string))
    }

    fn command_path(&self, verb: &str, value: &str) -> String {
        format!("{}?cmd0={}%2F{}{}", COMMAND_PATH, verb, value, self.zone_param())
    }
}

impl AvrProtocol for StandardApiClient {
    fn mode(&self) -> ProtocolMode {
        ProtocolMode::Standard
    }

    fn device(&self) -> &DeviceConfig {
        &self.device
    }

    fn fetch_state(&self, catalog: &InputCatalog) -> Result<StatePatch> {
        let fields = self.fetch_full()?;
        if !fields.contains_key(STATE_KEYS.power) && !fields.contains_key(STATE_KEYS.input) {
            warn!("standard API answered without zone status on {}", self.device.ip);
            return Err(ApiError::FeatureUnsupported("standard zone status".to_string()));
        }
        Ok(normalize(&fields, STATE_KEYS, catalog))
    }

    fn input_catalog(&self) -> Result<InputCatalog> {
        match self.model_id()? {
            Some(model) => {
                let catalog = catalog_for_model(&model);
                info!("model {} of {} has {} inputs", model, self.device.ip, catalog.len());
                Ok(catalog)
            }
            None => {
                info!("no ModelId reported by {}", self.device.ip);
                Ok(InputCatalog::new())
            }
        }
    }

    fn plan(&self, command: &AvrCommand, _known_muted: Option<bool>) -> RequestPlan {
        match command {
            AvrCommand::PowerOn => RequestPlan::Get(self.command_path("PutZone_OnOff", "ON")),
            AvrCommand::PowerOff => RequestPlan::Get(self.command_path("PutZone_OnOff", "OFF")),
            AvrCommand::SetVolume(relative) => {
                let relative = relative.clamp(self.api.min_volume, self.api.max_volume);
                RequestPlan::Get(self.command_path("PutMasterVolumeSet", &standard_level(relative)))
            }
            AvrCommand::MuteToggle => RequestPlan::Get(self.command_path("PutVolumeMute", "TOGGLE")),
            AvrCommand::MuteOn => RequestPlan::Get(self.command_path("PutVolumeMute", "ON")),
            AvrCommand::MuteOff => RequestPlan::Get(self.command_path("PutVolumeMute", "OFF")),
            AvrCommand::SelectInput(code) => {
                RequestPlan::Get(self.command_path("PutZone_InputFunction", &encode_value(code)))
            }
            AvrCommand::SelectSoundMode(_) => {
                RequestPlan::NoOp("sound mode selection is not available on the standard protocol")
            }
            AvrCommand::TunerPreset(_) => {
                RequestPlan::NoOp("tuner presets are not available on the standard protocol")
            }
            AvrCommand::Refresh => RequestPlan::NoOp("refresh sends no request"),
        }
    }

    fn execute(&self, command: &AvrCommand, known_muted: Option<bool>) -> Result<RequestPlan> {
        let plan = self.plan(command, known_muted);
        match &plan {
            RequestPlan::Get(path) => {
                let url = format!("{}{}", self.base_url(), path);
                debug!("standard command {} -> {}", command.logical_id(), url);
                self.http.get_text(&url, self.api.send_timeout())?;
            }
            RequestPlan::NoOp(reason) => debug!("{}: {}", command.logical_id(), reason),
        }
        Ok(plan)
    }
}
