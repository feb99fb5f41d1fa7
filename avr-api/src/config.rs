//! Device and protocol configuration
//!
//! Configuration is explicit and enumerated: every field that used to be a
//! free-form string (zone, protocol mode) is a closed enum here, and
//! [`DeviceConfig::validate`] rejects illegal combinations at registration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};
use crate::volume::VolumeScale;

/// An independently controllable output area of a receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Zone {
    #[default]
    #[serde(rename = "main")]
    Main,
    #[serde(rename = "2")]
    Zone2,
    #[serde(rename = "3")]
    Zone3,
}

impl Zone {
    /// Configuration key of the zone (`main`, `2`, `3`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Main => "main",
            Zone::Zone2 => "2",
            Zone::Zone3 => "3",
        }
    }

    /// Zone number used in `Z<n>` command prefixes, `None` for the main zone
    pub fn number(&self) -> Option<u8> {
        match self {
            Zone::Main => None,
            Zone::Zone2 => Some(2),
            Zone::Zone3 => Some(3),
        }
    }

    /// Map a zone key of a daemon push message to a zone.
    ///
    /// The daemon reports the main zone as `"1"` and zone-less values as
    /// `"UNDEFINED"`; both belong to the main zone.
    pub fn from_daemon_key(key: &str) -> Option<Zone> {
        match key {
            "1" | "UNDEFINED" | "main" => Some(Zone::Main),
            "2" => Some(Zone::Zone2),
            "3" => Some(Zone::Zone3),
            _ => None,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "main" | "1" | "" => Ok(Zone::Main),
            "2" => Ok(Zone::Zone2),
            "3" => Ok(Zone::Zone3),
            other => Err(ApiError::ConfigurationError(format!("unknown zone '{}'", other))),
        }
    }
}

/// Vendor control protocol spoken by a receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolMode {
    /// Legacy XML API on the standard web port
    #[default]
    Standard,
    /// HEOS-generation API
    Heos,
}

impl fmt::Display for ProtocolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolMode::Standard => f.write_str("standard"),
            ProtocolMode::Heos => f.write_str("heos"),
        }
    }
}

/// Per-device descriptor, immutable for the duration of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceConfig {
    pub ip: String,
    pub zone: Zone,
    pub mode: ProtocolMode,
    pub serial: String,
    /// Receive state by daemon push instead of polling
    pub daemon_enabled: bool,
    /// The device is expected to be switched off at times; fetch failures
    /// are then logged quietly
    pub can_be_shutdown: bool,
}

impl DeviceConfig {
    /// Create a configuration for the main zone of a Standard-protocol device
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            ..Default::default()
        }
    }

    pub fn with_zone(mut self, zone: Zone) -> Self {
        self.zone = zone;
        self
    }

    pub fn with_mode(mut self, mode: ProtocolMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = serial.into();
        self
    }

    pub fn with_daemon(mut self, enabled: bool) -> Self {
        self.daemon_enabled = enabled;
        self
    }

    pub fn with_can_be_shutdown(mut self, can_be_shutdown: bool) -> Self {
        self.can_be_shutdown = can_be_shutdown;
        self
    }

    /// Serial normalized the way the daemon keys devices
    pub fn normalized_serial(&self) -> String {
        self.serial.trim().to_lowercase()
    }

    /// Validate the configuration before it reaches an adapter.
    ///
    /// # Errors
    ///
    /// - empty IP address
    /// - zone 3 on the Standard protocol, which only knows the main zone and zone 2
    /// - daemon push enabled without a serial to key push messages on
    pub fn validate(&self) -> Result<()> {
        if self.ip.trim().is_empty() {
            return Err(ApiError::ConfigurationError(
                "IP address cannot be empty".to_string(),
            ));
        }
        if self.mode == ProtocolMode::Standard && self.zone == Zone::Zone3 {
            return Err(ApiError::ConfigurationError(
                "zone 3 is not available on the standard protocol".to_string(),
            ));
        }
        if self.daemon_enabled && self.serial.trim().is_empty() {
            return Err(ApiError::ConfigurationError(
                "daemon push requires a serial".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            ip: String::new(),
            zone: Zone::Main,
            mode: ProtocolMode::Standard,
            serial: String::new(),
            daemon_enabled: false,
            can_be_shutdown: false,
        }
    }
}

/// Protocol-wide settings shared by every device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiConfig {
    /// Port of the Standard XML API
    /// Default: 80
    pub standard_port: u16,

    /// Port of the HEOS API
    /// Default: 8080
    pub heos_port: u16,

    /// Offset between absolute device volume and relative slider volume
    /// Default: 80
    pub volume_offset: f64,

    /// Timeout for state fetches
    /// Default: 10 seconds
    pub fetch_timeout_secs: u64,

    /// Timeout for command sends
    /// Default: 60 seconds
    pub send_timeout_secs: u64,

    /// Lowest relative volume exposed on the volume slider
    /// Default: -80
    pub min_volume: f64,

    /// Highest relative volume exposed on the volume slider
    /// Default: 18
    pub max_volume: f64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            standard_port: 80,
            heos_port: 8080,
            volume_offset: 80.0,
            fetch_timeout_secs: 10,
            send_timeout_secs: 60,
            min_volume: -80.0,
            max_volume: 18.0,
        }
    }
}

impl ApiConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn volume_scale(&self) -> VolumeScale {
        VolumeScale::new(self.volume_offset)
    }

    /// Port for the given protocol
    pub fn port_for(&self, mode: ProtocolMode) -> u16 {
        match mode {
            ProtocolMode::Standard => self.standard_port,
            ProtocolMode::Heos => self.heos_port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_parsing() {
        assert_eq!("main".parse::<Zone>().unwrap(), Zone::Main);
        assert_eq!("2".parse::<Zone>().unwrap(), Zone::Zone2);
        assert_eq!("3".parse::<Zone>().unwrap(), Zone::Zone3);
        assert!("4".parse::<Zone>().is_err());
    }

    #[test]
    fn test_zone_from_daemon_key() {
        assert_eq!(Zone::from_daemon_key("1"), Some(Zone::Main));
        assert_eq!(Zone::from_daemon_key("UNDEFINED"), Some(Zone::Main));
        assert_eq!(Zone::from_daemon_key("2"), Some(Zone::Zone2));
        assert_eq!(Zone::from_daemon_key("3"), Some(Zone::Zone3));
        assert_eq!(Zone::from_daemon_key("9"), None);
    }

    #[test]
    fn test_validate_rejects_empty_ip() {
        let config = DeviceConfig::new("  ");
        assert!(matches!(config.validate(), Err(ApiError::ConfigurationError(_))));
    }

    #[test]
    fn test_validate_rejects_zone3_on_standard() {
        let config = DeviceConfig::new("192.168.1.20").with_zone(Zone::Zone3);
        assert!(config.validate().is_err());

        let heos = config.with_mode(ProtocolMode::Heos);
        assert!(heos.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_serial_for_daemon() {
        let config = DeviceConfig::new("192.168.1.20").with_daemon(true);
        assert!(config.validate().is_err());
        assert!(config.with_serial("ABC123").validate().is_ok());
    }

    #[test]
    fn test_device_config_deserialize() {
        let json = r#"{"ip":"10.0.0.5","zone":"2","mode":"heos","serial":"ABC","daemonEnabled":true}"#;
        let config: DeviceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.zone, Zone::Zone2);
        assert_eq!(config.mode, ProtocolMode::Heos);
        assert!(config.daemon_enabled);
        assert!(!config.can_be_shutdown);
        assert_eq!(config.normalized_serial(), "abc");
    }

    #[test]
    fn test_api_config_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.port_for(ProtocolMode::Standard), 80);
        assert_eq!(config.port_for(ProtocolMode::Heos), 8080);
        assert_eq!(config.send_timeout(), Duration::from_secs(60));
    }
}
