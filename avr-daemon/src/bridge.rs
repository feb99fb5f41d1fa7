//! Push channel between the daemon and the device state cache
//!
//! The [`DaemonBridge`] registers daemon-enabled devices over the socket,
//! forwards commands for registered devices, and applies callback messages
//! to the [`DeviceStateCache`] one field at a time.

use std::collections::HashSet;
use std::sync::Arc;

use avr_api::{AvrCommand, DeviceConfig, VolumeScale, Zone};
use avr_state::{DeviceId, DeviceStateCache, FieldUpdate};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{DaemonError, Result};
use crate::message::{
    value_flag, value_number, value_text, CallbackMessage, DaemonRequest, DeviceAction, PushValue,
};
use crate::socket::DaemonTransport;

/// A configured device as seen by the bridge
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub id: DeviceId,
    pub config: DeviceConfig,
}

/// Read access to the configured devices, plus the one write the daemon
/// can trigger (serial discovery)
pub trait DeviceDirectory: Send + Sync {
    fn entries(&self) -> Vec<DirectoryEntry>;

    /// Display name of a raw input code in the device's catalog
    fn input_name(&self, id: &DeviceId, code: &str) -> Option<String>;

    /// Replace the configured serial, returning whether it changed
    fn set_serial(&self, id: &DeviceId, serial: &str) -> bool;
}

/// Result of offering a command to the daemon
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardOutcome {
    /// The daemon took the command
    Forwarded(DeviceAction),
    /// The daemon has no action for this command
    NoMapping,
    /// The device is not served by the daemon
    NotRegistered,
    /// The socket could not be reached
    Unreachable,
}

impl ForwardOutcome {
    pub fn is_forwarded(&self) -> bool {
        matches!(self, ForwardOutcome::Forwarded(_))
    }
}

/// What one callback message did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Devices registered in response to a daemon `Listening` event
    pub registered: usize,
    /// Cache fields whose value changed
    pub fields_changed: usize,
    /// Devices whose serial was updated from `infos`
    pub serials_updated: usize,
    /// Zones that matched no configured device
    pub unmatched: usize,
    /// Zones that matched more than one configured device
    pub conflicts: usize,
}

/// Bridge between the monitoring daemon and the local device state
pub struct DaemonBridge {
    transport: Arc<dyn DaemonTransport>,
    directory: Arc<dyn DeviceDirectory>,
    cache: DeviceStateCache,
    scale: VolumeScale,
    translate_sources: bool,
    registered: Mutex<HashSet<String>>,
}

impl DaemonBridge {
    pub fn new(
        transport: Arc<dyn DaemonTransport>,
        directory: Arc<dyn DeviceDirectory>,
        cache: DeviceStateCache,
        scale: VolumeScale,
    ) -> Self {
        Self {
            transport,
            directory,
            cache,
            scale,
            translate_sources: true,
            registered: Mutex::new(HashSet::new()),
        }
    }

    /// Report pushed sources as raw codes instead of catalog display names
    pub fn with_source_translation(mut self, enabled: bool) -> Self {
        self.translate_sources = enabled;
        self
    }

    /// Register every daemon-enabled device, once per serial.
    ///
    /// A failed registration is logged and the remaining serials are still
    /// tried. Returns the number of serials registered.
    pub fn register_all(&self) -> usize {
        let mut seen = HashSet::new();
        let mut count = 0;

        for entry in self.directory.entries() {
            if !entry.config.daemon_enabled {
                continue;
            }
            let serial = entry.config.normalized_serial();
            if serial.is_empty() || !seen.insert(serial.clone()) {
                continue;
            }

            info!("registering serial #{} with daemon", serial);
            match self
                .transport
                .send(&DaemonRequest::register(&serial, &entry.config.ip))
            {
                Ok(()) => {
                    self.registered.lock().insert(serial);
                    count += 1;
                }
                Err(e) => warn!("registration of serial #{} failed: {}", serial, e),
            }
        }

        count
    }

    /// Register one device if it is daemon-enabled and its serial is not
    /// registered yet. Returns whether a registration was sent.
    pub fn register(&self, config: &DeviceConfig) -> Result<bool> {
        let serial = config.normalized_serial();
        if !config.daemon_enabled || serial.is_empty() || self.registered.lock().contains(&serial) {
            return Ok(false);
        }

        self.transport
            .send(&DaemonRequest::register(&serial, &config.ip))?;
        self.registered.lock().insert(serial);
        Ok(true)
    }

    /// Drop the registration of a removed device.
    ///
    /// Other zones of the same receiver keep the serial registered; the
    /// daemon is only told once no daemon-enabled device uses it.
    pub fn unregister(&self, config: &DeviceConfig) -> Result<bool> {
        let serial = config.normalized_serial();
        if !self.registered.lock().contains(&serial) {
            return Ok(false);
        }

        let still_used = self
            .directory
            .entries()
            .iter()
            .any(|e| e.config.daemon_enabled && e.config.normalized_serial() == serial);
        if still_used {
            return Ok(false);
        }

        self.transport
            .send(&DaemonRequest::Unregister { serial: serial.clone() })?;
        self.registered.lock().remove(&serial);
        Ok(true)
    }

    /// Whether the device gets its state by push
    pub fn is_served(&self, config: &DeviceConfig) -> bool {
        config.daemon_enabled && self.registered.lock().contains(&config.normalized_serial())
    }

    pub fn registered_serials(&self) -> Vec<String> {
        let mut serials: Vec<String> = self.registered.lock().iter().cloned().collect();
        serials.sort();
        serials
    }

    /// Offer a command to the daemon instead of the direct protocol path
    pub fn forward(
        &self,
        config: &DeviceConfig,
        command: &AvrCommand,
        known_muted: Option<bool>,
    ) -> ForwardOutcome {
        if !self.is_served(config) {
            return ForwardOutcome::NotRegistered;
        }
        let Some((action, value)) =
            DeviceAction::for_command(command, config.zone, known_muted, &self.scale)
        else {
            return ForwardOutcome::NoMapping;
        };

        let request = DaemonRequest::DoDevice {
            serial: config.normalized_serial(),
            device_action: action,
            zone: Some(config.zone),
            value,
        };
        match self.transport.send(&request) {
            Ok(()) => ForwardOutcome::Forwarded(action),
            Err(e) => {
                warn!("daemon forward failed: {}", e);
                ForwardOutcome::Unreachable
            }
        }
    }

    /// Decode and apply one callback body
    pub fn handle_callback(&self, body: &str) -> Result<PushReport> {
        let message = CallbackMessage::parse(body)?;
        debug!("callback from daemon");
        Ok(self.apply_message(&message))
    }

    /// Apply every section of a decoded callback
    pub fn apply_message(&self, message: &CallbackMessage) -> PushReport {
        let mut report = PushReport::default();

        if let Some(notice) = &message.daemon {
            match notice.event.as_deref() {
                Some("Ping") => debug!("daemon event: Ping"),
                Some(event) => info!("daemon event: {}", event),
                None => info!("daemon message: {:?}", notice.other),
            }
            if notice.event.as_deref() == Some("Listening") {
                report.registered = self.register_all();
            }
        }

        for (serial, zones) in &message.devices {
            for (zone_key, values) in zones {
                let Some(zone) = Zone::from_daemon_key(zone_key) else {
                    debug!("ignoring unknown zone '{}' for {}", zone_key, serial);
                    continue;
                };
                let entry = match self.resolve(serial, zone) {
                    Ok(entry) => entry,
                    Err(e @ DaemonError::ConfigurationConflict { .. }) => {
                        warn!("{}", e);
                        report.conflicts += 1;
                        continue;
                    }
                    Err(e) => {
                        debug!("{}", e);
                        report.unmatched += 1;
                        continue;
                    }
                };

                let undefined_zone = zone_key == "UNDEFINED";
                for (name, push) in values {
                    let updates = push_updates(name, push, undefined_zone, &self.scale, |code| {
                        if self.translate_sources {
                            self.directory.input_name(&entry.id, code)
                        } else {
                            None
                        }
                    });
                    for update in updates {
                        match self.cache.apply_push_field(&entry.id, update) {
                            Ok(true) => report.fields_changed += 1,
                            Ok(false) => {}
                            Err(e) => debug!("push for {} dropped: {}", entry.id, e),
                        }
                    }
                }
            }
        }

        for (ip, info) in &message.infos {
            let Some(serial) = info.serial.as_deref() else {
                continue;
            };
            for entry in self.directory.entries() {
                if entry.config.ip == *ip
                    && entry.config.serial != serial
                    && self.directory.set_serial(&entry.id, serial)
                {
                    info!("serial of {} updated to {}", ip, serial);
                    report.serials_updated += 1;
                    if self.rekey(&entry.config, serial) {
                        report.registered += 1;
                    }
                }
            }
        }

        report
    }

    /// Move the registration of a device whose serial changed. The old
    /// serial is forgotten once no daemon-enabled device uses it; the new
    /// one is registered. Returns whether a registration was sent.
    fn rekey(&self, previous: &DeviceConfig, serial: &str) -> bool {
        if !previous.daemon_enabled {
            return false;
        }

        let old = previous.normalized_serial();
        let old_in_use = self
            .directory
            .entries()
            .iter()
            .any(|e| e.config.daemon_enabled && e.config.normalized_serial() == old);
        if !old_in_use {
            self.registered.lock().remove(&old);
        }

        let mut updated = previous.clone();
        updated.serial = serial.to_string();
        match self.register(&updated) {
            Ok(sent) => sent,
            Err(e) => {
                warn!("registration of serial #{} failed: {}", updated.normalized_serial(), e);
                false
            }
        }
    }

    /// Find the single configured device for a serial and zone
    pub fn resolve(&self, serial: &str, zone: Zone) -> Result<DirectoryEntry> {
        let serial = serial.trim().to_lowercase();
        let mut matches: Vec<DirectoryEntry> = self
            .directory
            .entries()
            .into_iter()
            .filter(|e| e.config.zone == zone && e.config.normalized_serial() == serial)
            .collect();

        match matches.len() {
            0 => Err(DaemonError::UnknownDevice {
                serial,
                zone: zone.to_string(),
            }),
            1 => Ok(matches.remove(0)),
            count => Err(DaemonError::ConfigurationConflict {
                serial,
                zone: zone.to_string(),
                count,
            }),
        }
    }
}

impl std::fmt::Debug for DaemonBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonBridge")
            .field("registered", &self.registered_serials())
            .field("scale", &self.scale)
            .finish()
    }
}

/// Translate one pushed value into cache writes.
///
/// `name` is the daemon's command name; `event` and `lastMessageDate` are
/// special, every other value is dispatched on its label. `Main Power`
/// only counts for zone-less messages and `Power` only for real zones.
pub fn push_updates(
    name: &str,
    push: &PushValue,
    undefined_zone: bool,
    scale: &VolumeScale,
    input_name: impl Fn(&str) -> Option<String>,
) -> Vec<FieldUpdate> {
    match name {
        "event" => {
            let event = value_text(&push.value);
            if event != "Ping" {
                info!("device event: {}", event);
            }
            let mut updates = Vec::new();
            if event == "Close" {
                updates.push(FieldUpdate::Power(false));
                updates.push(FieldUpdate::StationName(String::new()));
            }
            updates.push(FieldUpdate::LastEvent(event));
            updates
        }
        "lastMessageDate" => vec![FieldUpdate::LastMessage(value_text(&push.value))],
        _ => {
            let label = push.cmd_label.as_deref().unwrap_or_default();
            let update = match label {
                "Main Power" if undefined_zone => {
                    Some(FieldUpdate::Power(value_text(&push.value) == "ON"))
                }
                "Power" if !undefined_zone => {
                    Some(FieldUpdate::Power(value_text(&push.value) == "ON"))
                }
                "Muted" => Some(FieldUpdate::Muted(value_flag(&push.value))),
                "Volume" => value_number(&push.value)
                    .map(|absolute| FieldUpdate::Volume(scale.to_relative(absolute))),
                "Source" => {
                    let raw = value_text(&push.value);
                    Some(FieldUpdate::Input(input_name(&raw).unwrap_or(raw)))
                }
                "Surround Mode" => Some(FieldUpdate::SoundMode(value_text(&push.value))),
                "Tuner Station Name" => Some(FieldUpdate::StationName(value_text(&push.value))),
                "Tuner Preset" => value_number(&push.value)
                    .map(|preset| FieldUpdate::TunerPreset(preset.round() as u8)),
                _ => None,
            };
            if let Some(update) = &update {
                debug!("push {} ({}) -> {:?}", label, name, update);
            }
            update.into_iter().collect()
        }
    }
}
