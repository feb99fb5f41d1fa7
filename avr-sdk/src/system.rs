//! AvrSystem - composition root of the SDK

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{mpsc, Arc};

use avr_api::{
    default_descriptors, input_descriptors, CommandCategory, CommandDescriptor, CommandOptions,
    DeviceConfig, LivenessProbe, PingProbe,
};
use avr_daemon::{DaemonBridge, DaemonClient, DaemonTransport, DeviceDirectory};
use avr_state::{DeviceId, DeviceState, DeviceStateCache, RefreshOutcome, Refresher, StateChange};
use callback_server::{CallbackPayload, CallbackServer};
use tokio::sync::mpsc as async_mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SystemConfig;
use crate::dispatcher::{CommandDispatcher, DispatchOutcome};
use crate::error::{Result, SdkError};
use crate::registry::DeviceRegistry;
use crate::scheduler::{PollScheduler, PollSummary};

/// Entry point: owns the registry, the state cache, the dispatcher, the
/// poll scheduler and, in daemon mode, the daemon bridge and its callback
/// endpoint.
///
/// # Example
///
/// ```rust,no_run
/// use avr_sdk::{AvrSystem, SystemConfig};
/// use avr_api::{CommandCategory, CommandOptions};
/// use avr_state::DeviceId;
///
/// #[tokio::main]
/// async fn main() -> Result<(), avr_sdk::SdkError> {
///     let mut system = AvrSystem::new(SystemConfig::load_default()?);
///     system.start().await?;
///
///     let id = DeviceId::from("living-room");
///     system
///         .execute(&id, "volume_set", CommandCategory::Volume, &CommandOptions::slider(-35.0))
///         .await?;
///     println!("{:?}", system.state(&id));
///
///     system.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct AvrSystem {
    config: SystemConfig,
    cache: DeviceStateCache,
    registry: Arc<DeviceRegistry>,
    dispatcher: Arc<CommandDispatcher>,
    scheduler: Arc<PollScheduler>,
    bridge: Option<Arc<DaemonBridge>>,
    callback: Option<CallbackServer>,
    tasks: Vec<JoinHandle<()>>,
}

impl AvrSystem {
    /// Build the system with ICMP liveness probing and, when enabled, the
    /// daemon socket client
    pub fn new(config: SystemConfig) -> Self {
        let transport = config.daemon.enabled.then(|| {
            Arc::new(DaemonClient::from_config(&config.daemon)) as Arc<dyn DaemonTransport>
        });
        Self::with_parts(config, Arc::new(PingProbe::new()), transport)
    }

    /// Build the system from explicit collaborators.
    ///
    /// A `transport` enables the daemon bridge regardless of
    /// `config.daemon.enabled`.
    pub fn with_parts(
        config: SystemConfig,
        probe: Arc<dyn LivenessProbe>,
        transport: Option<Arc<dyn DaemonTransport>>,
    ) -> Self {
        let cache = DeviceStateCache::new();
        let registry = Arc::new(DeviceRegistry::new(config.api.clone()));
        let refresher = Refresher::new(cache.clone(), probe);

        let bridge = transport.map(|transport| {
            let directory: Arc<dyn DeviceDirectory> = registry.clone();
            Arc::new(DaemonBridge::new(
                transport,
                directory,
                cache.clone(),
                config.api.volume_scale(),
            ))
        });

        let mut dispatcher = CommandDispatcher::new(
            Arc::clone(&registry),
            refresher,
            config.scheduler.settle_delay(),
        );
        if let Some(bridge) = &bridge {
            dispatcher = dispatcher.with_bridge(Arc::clone(bridge));
        }
        let dispatcher = Arc::new(dispatcher);

        let mut scheduler = PollScheduler::new(
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            config.scheduler.poll_interval(),
        );
        if let Some(bridge) = &bridge {
            scheduler = scheduler.with_bridge(Arc::clone(bridge));
        }

        Self {
            config,
            cache,
            registry,
            dispatcher,
            scheduler: Arc::new(scheduler),
            bridge,
            callback: None,
            tasks: Vec::new(),
        }
    }

    /// Register the configured devices, bring up the daemon channel and
    /// start polling.
    ///
    /// A device that fails to register is logged and skipped. An
    /// unreachable daemon leaves every device on the polling path.
    pub async fn start(&mut self) -> Result<()> {
        if let Some(bridge) = self.bridge.clone() {
            let (tx, rx) = async_mpsc::unbounded_channel();
            let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.config.daemon.callback_port));
            let server = CallbackServer::bind(addr, self.config.daemon.api_key.clone(), tx).await?;
            info!("daemon callbacks on {}", server.base_url());
            self.callback = Some(server);
            self.tasks.push(spawn_callback_consumer(bridge, rx));
        }

        for device in self.config.devices.clone() {
            if let Err(e) = self.add_device(DeviceId::from(device.id.as_str()), device.config).await {
                warn!("device {} not registered: {}", device.id, e);
            }
        }

        self.tasks.push(self.scheduler.start());
        Ok(())
    }

    /// Register a device, resolve its input catalog and, in daemon mode,
    /// register it with the daemon
    pub async fn add_device(&self, id: DeviceId, config: DeviceConfig) -> Result<()> {
        self.registry.register(id.clone(), config.clone())?;
        self.cache.insert_device(id.clone());

        let registry = Arc::clone(&self.registry);
        let catalog_id = id.clone();
        match tokio::task::spawn_blocking(move || registry.resolve_catalog(&catalog_id)).await? {
            Ok(count) => debug!("{}: catalog with {} inputs", id, count),
            Err(e) => warn!("{}: input catalog unavailable: {}", id, e),
        }

        if let Some(bridge) = self.bridge.clone() {
            match tokio::task::spawn_blocking(move || bridge.register(&config)).await? {
                Ok(true) => info!("{} registered with daemon", id),
                Ok(false) => {}
                Err(e) => warn!("{}: daemon registration failed: {}", id, e),
            }
        }
        Ok(())
    }

    /// Forget a device; its daemon registration is dropped when no other
    /// device shares the serial
    pub async fn remove_device(&self, id: &DeviceId) -> Result<()> {
        let device = self
            .registry
            .remove(id)
            .ok_or_else(|| SdkError::DeviceNotFound(id.to_string()))?;
        self.cache.remove_device(id);

        if let Some(bridge) = self.bridge.clone() {
            let config = device.config();
            if let Err(e) = tokio::task::spawn_blocking(move || bridge.unregister(&config)).await? {
                warn!("{}: daemon unregistration failed: {}", id, e);
            }
        }
        Ok(())
    }

    /// Re-resolve the input catalog of a device
    pub async fn reload_catalog(&self, id: &DeviceId) -> Result<usize> {
        let registry = Arc::clone(&self.registry);
        let id = id.clone();
        tokio::task::spawn_blocking(move || registry.resolve_catalog(&id)).await?
    }

    /// Execute a command invocation
    pub async fn execute(
        &self,
        id: &DeviceId,
        logical_id: &str,
        category: CommandCategory,
        opts: &CommandOptions,
    ) -> Result<DispatchOutcome> {
        self.dispatcher.execute(id, logical_id, category, opts).await
    }

    pub async fn refresh(&self, id: &DeviceId) -> Result<RefreshOutcome> {
        self.dispatcher.refresh(id).await
    }

    /// Refresh every polled device now
    pub async fn poll_now(&self) -> PollSummary {
        self.scheduler.poll_once().await
    }

    /// Apply a daemon callback body directly, without the HTTP endpoint
    pub fn handle_callback(&self, body: &str) -> Result<Option<avr_daemon::PushReport>> {
        match &self.bridge {
            Some(bridge) => Ok(Some(bridge.handle_callback(body)?)),
            None => Ok(None),
        }
    }

    pub fn state(&self, id: &DeviceId) -> Option<DeviceState> {
        self.cache.get(id)
    }

    /// Receive every state change from now on
    pub fn subscribe(&self) -> mpsc::Receiver<StateChange> {
        self.cache.subscribe()
    }

    /// Command descriptors of a device: the fixed set plus one input
    /// action per visible catalog entry
    pub fn descriptors(&self, id: &DeviceId) -> Result<Vec<CommandDescriptor>> {
        let device = self.registry.get(id)?;
        let mut descriptors = default_descriptors();
        descriptors.extend(input_descriptors(&device.catalog()));
        Ok(descriptors)
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.registry.ids()
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn bridge(&self) -> Option<&Arc<DaemonBridge>> {
        self.bridge.as_ref()
    }

    /// Port of the daemon callback endpoint, once started
    pub fn callback_port(&self) -> Option<u16> {
        self.callback.as_ref().map(CallbackServer::port)
    }

    /// Stop polling and the callback endpoint
    pub async fn shutdown(mut self) {
        self.scheduler.stop();
        if let Some(server) = self.callback.take() {
            server.shutdown().await;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("receiver system stopped");
    }
}

fn spawn_callback_consumer(
    bridge: Arc<DaemonBridge>,
    mut rx: async_mpsc::UnboundedReceiver<CallbackPayload>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            let bridge = Arc::clone(&bridge);
            let handled = tokio::task::spawn_blocking(move || bridge.handle_callback(&payload.body)).await;
            match handled {
                Ok(Ok(report)) => debug!("callback applied: {:?}", report),
                Ok(Err(e)) => warn!("callback dropped: {}", e),
                Err(e) => warn!("callback task failed: {}", e),
            }
        }
    })
}

impl std::fmt::Debug for AvrSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvrSystem")
            .field("registry", &self.registry)
            .field("daemon", &self.bridge.is_some())
            .field("callback_port", &self.callback_port())
            .finish()
    }
}
