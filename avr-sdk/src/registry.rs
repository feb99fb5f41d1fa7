//! Registry of configured devices
//!
//! Each registered device owns its protocol adapter, its resolved input
//! catalog, and a lock that keeps refreshes and commands for that device
//! one at a time.

use std::collections::BTreeMap;
use std::sync::Arc;

use avr_api::{create_protocol, ApiConfig, AvrProtocol, DeviceConfig, HttpClient, InputCatalog};
use avr_daemon::{DeviceDirectory, DirectoryEntry};
use avr_state::DeviceId;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{Result, SdkError};

/// One configured device
pub struct RegisteredDevice {
    id: DeviceId,
    config: RwLock<DeviceConfig>,
    protocol: Arc<dyn AvrProtocol>,
    catalog: RwLock<InputCatalog>,
    busy: tokio::sync::Mutex<()>,
}

impl RegisteredDevice {
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn config(&self) -> DeviceConfig {
        self.config.read().clone()
    }

    pub fn protocol(&self) -> Arc<dyn AvrProtocol> {
        Arc::clone(&self.protocol)
    }

    pub fn catalog(&self) -> InputCatalog {
        self.catalog.read().clone()
    }

    pub fn set_catalog(&self, catalog: InputCatalog) {
        *self.catalog.write() = catalog;
    }

    /// Hold this while talking to the device
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.busy.lock().await
    }
}

impl std::fmt::Debug for RegisteredDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredDevice")
            .field("id", &self.id)
            .field("config", &*self.config.read())
            .field("inputs", &self.catalog.read().len())
            .finish()
    }
}

/// All configured devices, keyed by id
pub struct DeviceRegistry {
    api: ApiConfig,
    http: HttpClient,
    devices: RwLock<BTreeMap<DeviceId, Arc<RegisteredDevice>>>,
}

impl DeviceRegistry {
    pub fn new(api: ApiConfig) -> Self {
        Self {
            api,
            http: HttpClient::new(),
            devices: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn api_config(&self) -> &ApiConfig {
        &self.api
    }

    /// Validate the configuration and register the device with the
    /// protocol adapter its mode selects
    pub fn register(&self, id: DeviceId, config: DeviceConfig) -> Result<Arc<RegisteredDevice>> {
        let protocol: Arc<dyn AvrProtocol> =
            Arc::from(create_protocol(config.clone(), &self.api, self.http.clone())?);
        self.insert(id, config, protocol)
    }

    /// Register a device with a caller-supplied adapter
    pub fn register_with_protocol(
        &self,
        id: DeviceId,
        protocol: Arc<dyn AvrProtocol>,
    ) -> Result<Arc<RegisteredDevice>> {
        let config = protocol.device().clone();
        config.validate()?;
        self.insert(id, config, protocol)
    }

    fn insert(
        &self,
        id: DeviceId,
        config: DeviceConfig,
        protocol: Arc<dyn AvrProtocol>,
    ) -> Result<Arc<RegisteredDevice>> {
        let mut devices = self.devices.write();
        if devices.contains_key(&id) {
            return Err(SdkError::DuplicateDevice(id.to_string()));
        }

        info!("registered {} ({} API at {}, zone {})", id, config.mode, config.ip, config.zone);
        let device = Arc::new(RegisteredDevice {
            id: id.clone(),
            config: RwLock::new(config),
            protocol,
            catalog: RwLock::new(InputCatalog::new()),
            busy: tokio::sync::Mutex::new(()),
        });
        devices.insert(id, Arc::clone(&device));
        Ok(device)
    }

    pub fn remove(&self, id: &DeviceId) -> Option<Arc<RegisteredDevice>> {
        self.devices.write().remove(id)
    }

    pub fn get(&self, id: &DeviceId) -> Result<Arc<RegisteredDevice>> {
        self.devices
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SdkError::DeviceNotFound(id.to_string()))
    }

    pub fn ids(&self) -> Vec<DeviceId> {
        self.devices.read().keys().cloned().collect()
    }

    pub fn devices(&self) -> Vec<Arc<RegisteredDevice>> {
        self.devices.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    /// Resolve the input catalog of a device from the device itself.
    ///
    /// Blocking: the Standard protocol reads the model id, HEOS queries
    /// the rename and delete lists. Returns the number of inputs.
    pub fn resolve_catalog(&self, id: &DeviceId) -> Result<usize> {
        let device = self.get(id)?;
        let catalog = device.protocol.input_catalog()?;
        debug!("{}: {} inputs", id, catalog.len());
        let count = catalog.len();
        device.set_catalog(catalog);
        Ok(count)
    }
}

impl DeviceDirectory for DeviceRegistry {
    fn entries(&self) -> Vec<DirectoryEntry> {
        self.devices
            .read()
            .values()
            .map(|device| DirectoryEntry {
                id: device.id.clone(),
                config: device.config(),
            })
            .collect()
    }

    fn input_name(&self, id: &DeviceId, code: &str) -> Option<String> {
        let device = self.devices.read().get(id).cloned()?;
        let catalog = device.catalog.read();
        catalog.display_name(code).map(str::to_string)
    }

    /// Updates the registry's configuration, which is what the daemon path
    /// reads. The protocol adapter keeps its own copy; it only uses the
    /// address, zone and mode, none of which change here.
    fn set_serial(&self, id: &DeviceId, serial: &str) -> bool {
        let Some(device) = self.devices.read().get(id).cloned() else {
            return false;
        };
        let mut config = device.config.write();
        if config.serial == serial {
            return false;
        }
        config.serial = serial.to_string();
        true
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avr_api::{ProtocolMode, Zone};

    #[test]
    fn test_register_validates() {
        let registry = DeviceRegistry::new(ApiConfig::default());

        let result = registry.register(DeviceId::from("bad"), DeviceConfig::new(""));
        assert!(matches!(result, Err(SdkError::ApiError(_))));

        let zone3 = DeviceConfig::new("192.168.1.30").with_zone(Zone::Zone3);
        assert!(registry.register(DeviceId::from("z3"), zone3).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_id() {
        let registry = DeviceRegistry::new(ApiConfig::default());
        let config = DeviceConfig::new("192.168.1.30").with_mode(ProtocolMode::Heos);

        registry.register(DeviceId::from("avr"), config.clone()).unwrap();
        assert!(matches!(
            registry.register(DeviceId::from("avr"), config),
            Err(SdkError::DuplicateDevice(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_directory_view() {
        let registry = DeviceRegistry::new(ApiConfig::default());
        let id = DeviceId::from("avr");
        let device = registry
            .register(id.clone(), DeviceConfig::new("192.168.1.30").with_serial("old"))
            .unwrap();
        device.set_catalog(InputCatalog::from_pairs([("TUNER", "Radio")]));

        assert_eq!(registry.input_name(&id, "TUNER").as_deref(), Some("Radio"));
        assert_eq!(registry.input_name(&id, "DVD"), None);

        assert!(registry.set_serial(&id, "new"));
        assert!(!registry.set_serial(&id, "new"));
        assert_eq!(registry.entries()[0].config.serial, "new");
    }

    #[test]
    fn test_get_unknown() {
        let registry = DeviceRegistry::new(ApiConfig::default());
        assert!(matches!(
            registry.get(&DeviceId::from("ghost")),
            Err(SdkError::DeviceNotFound(_))
        ));
    }
}
