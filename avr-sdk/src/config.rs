//! File configuration for a receiver system

use std::path::{Path, PathBuf};
use std::time::Duration;

use avr_api::{ApiConfig, DeviceConfig};
use avr_daemon::DaemonConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SdkError};

/// Polling and command timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Interval between two polls of every non-daemon device
    /// Default: 900 (15 minutes)
    pub poll_interval_secs: u64,

    /// Pause between sending a command and re-reading the device
    /// Default: 1000
    pub settle_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 15 * 60,
            settle_delay_ms: 1000,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// A configured device and the id it is known by
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedDevice {
    pub id: String,
    #[serde(flatten)]
    pub config: DeviceConfig,
}

/// Everything needed to build an [`AvrSystem`](crate::AvrSystem)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub api: ApiConfig,
    pub daemon: DaemonConfig,
    pub scheduler: SchedulerConfig,
    pub devices: Vec<NamedDevice>,
}

impl SystemConfig {
    /// `<config dir>/denon-avr/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("denon-avr").join("config.json"))
    }

    /// Load a JSON configuration file. Missing sections take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SdkError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Load from [`SystemConfig::default_path`], or defaults when the file
    /// does not exist
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| SdkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every device and the daemon settings
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.id.as_str()) {
                return Err(SdkError::DuplicateDevice(device.id.clone()));
            }
            device.config.validate()?;
        }
        if self.scheduler.poll_interval_secs == 0 {
            return Err(SdkError::Config(
                "pollIntervalSecs must be at least 1".to_string(),
            ));
        }
        if self.daemon.enabled && self.daemon.api_key.is_empty() {
            return Err(SdkError::Config(
                "daemon mode requires an API key".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avr_api::{ProtocolMode, Zone};
    use std::io::Write;

    #[test]
    fn test_scheduler_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(900));
        assert_eq!(config.settle_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "api": {{"volumeOffset": 70}},
                "daemon": {{"enabled": true, "apiKey": "secret"}},
                "devices": [
                    {{"id": "living", "ip": "192.168.1.30", "mode": "heos", "zone": "2", "serial": "ABC", "daemonEnabled": true}},
                    {{"id": "kitchen", "ip": "192.168.1.31"}}
                ]
            }}"#
        )
        .unwrap();

        let config = SystemConfig::load(file.path()).unwrap();
        assert_eq!(config.api.volume_offset, 70.0);
        assert_eq!(config.api.heos_port, 8080);
        assert!(config.daemon.enabled);
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[0].config.mode, ProtocolMode::Heos);
        assert_eq!(config.devices[0].config.zone, Zone::Zone2);
        assert!(config.devices[0].config.daemon_enabled);
        assert_eq!(config.devices[1].config.mode, ProtocolMode::Standard);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            SystemConfig::load("/nonexistent/denon-avr.json"),
            Err(SdkError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_devices() {
        let empty_ip = r#"{"devices":[{"id":"a","ip":""}]}"#;
        assert!(matches!(SystemConfig::from_json(empty_ip), Err(SdkError::ApiError(_))));

        let duplicate = r#"{"devices":[{"id":"a","ip":"1.2.3.4"},{"id":"a","ip":"1.2.3.5"}]}"#;
        assert!(matches!(SystemConfig::from_json(duplicate), Err(SdkError::DuplicateDevice(_))));

        let keyless = r#"{"daemon":{"enabled":true}}"#;
        assert!(matches!(SystemConfig::from_json(keyless), Err(SdkError::Config(_))));

        let zero_interval = r#"{"scheduler":{"pollIntervalSecs":0}}"#;
        assert!(matches!(SystemConfig::from_json(zero_interval), Err(SdkError::Config(_))));
    }

    proptest::proptest! {
        #[test]
        fn test_ids_must_be_unique(ids in proptest::collection::vec("[a-c]{1,2}", 0..6)) {
            let config = SystemConfig {
                devices: ids
                    .iter()
                    .map(|id| NamedDevice {
                        id: id.clone(),
                        config: DeviceConfig::new("192.168.1.30"),
                    })
                    .collect(),
                ..Default::default()
            };
            let unique: std::collections::HashSet<_> = ids.iter().collect();
            proptest::prop_assert_eq!(config.validate().is_ok(), unique.len() == ids.len());
        }
    }
}
