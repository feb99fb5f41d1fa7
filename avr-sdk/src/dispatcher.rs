//! Command dispatch
//!
//! A command runs in three steps: resolve the invocation to an
//! [`AvrCommand`], deliver it (through the daemon when the device is
//! served by push, otherwise over the device's own protocol), then wait
//! the settle delay and refresh the device once so the cache reflects
//! what the receiver actually did.

use std::sync::Arc;
use std::time::Duration;

use avr_api::{AvrCommand, CommandCategory, CommandOptions, RequestPlan};
use avr_daemon::{DaemonBridge, DeviceAction, ForwardOutcome};
use avr_state::{DeviceId, RefreshOutcome, Refresher};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::registry::{DeviceRegistry, RegisteredDevice};

/// Result of the direct protocol send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendResult {
    /// The request was sent (or the command is a defined no-op)
    Sent(RequestPlan),
    /// The request failed; the error is logged
    Failed(String),
    /// The device failed the liveness check; nothing was sent
    DeviceOffline,
}

/// What executing a command did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// `refresh`: the device was re-read, nothing was sent
    Refreshed(RefreshOutcome),
    /// The daemon took the command; state comes back by push
    Forwarded(DeviceAction),
    /// The command went over the device protocol, followed by one refresh
    Direct {
        send: SendResult,
        refresh: RefreshOutcome,
    },
}

/// Turns command invocations into protocol requests
pub struct CommandDispatcher {
    registry: Arc<DeviceRegistry>,
    refresher: Refresher,
    bridge: Option<Arc<DaemonBridge>>,
    settle_delay: Duration,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<DeviceRegistry>, refresher: Refresher, settle_delay: Duration) -> Self {
        Self {
            registry,
            refresher,
            bridge: None,
            settle_delay,
        }
    }

    /// Forward commands for daemon-served devices through `bridge`
    pub fn with_bridge(mut self, bridge: Arc<DaemonBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Execute one command invocation on a device
    pub async fn execute(
        &self,
        id: &DeviceId,
        logical_id: &str,
        category: CommandCategory,
        opts: &CommandOptions,
    ) -> Result<DispatchOutcome> {
        let command = AvrCommand::resolve(category, logical_id, opts)?;
        self.execute_command(id, command).await
    }

    /// Execute an already resolved command
    pub async fn execute_command(&self, id: &DeviceId, command: AvrCommand) -> Result<DispatchOutcome> {
        let device = self.registry.get(id)?;
        let _busy = device.lock().await;

        if command == AvrCommand::Refresh {
            let outcome = self.refresh_locked(&device).await?;
            return Ok(DispatchOutcome::Refreshed(outcome));
        }

        let known_muted = self.refresher.cache().get(id).and_then(|state| state.muted);

        if let Some(bridge) = &self.bridge {
            let bridge = Arc::clone(bridge);
            let config = device.config();
            let forwarded = command.clone();
            let outcome =
                tokio::task::spawn_blocking(move || bridge.forward(&config, &forwarded, known_muted))
                    .await?;
            match outcome {
                ForwardOutcome::Forwarded(action) => {
                    info!("{}: {} forwarded to daemon as {:?}", id, command.logical_id(), action);
                    return Ok(DispatchOutcome::Forwarded(action));
                }
                ForwardOutcome::NoMapping => {
                    debug!("{}: daemon has no action for {}", id, command.logical_id())
                }
                ForwardOutcome::Unreachable => {
                    warn!("{}: daemon unreachable, sending {} directly", id, command.logical_id())
                }
                ForwardOutcome::NotRegistered => {}
            }
        }

        let send = self.send_direct(&device, command, known_muted).await?;

        tokio::time::sleep(self.settle_delay).await;
        let refresh = self.refresh_locked(&device).await?;

        Ok(DispatchOutcome::Direct { send, refresh })
    }

    /// Refresh one device, waiting for any command in flight on it
    pub async fn refresh(&self, id: &DeviceId) -> Result<RefreshOutcome> {
        let device = self.registry.get(id)?;
        let _busy = device.lock().await;
        self.refresh_locked(&device).await
    }

    async fn refresh_locked(&self, device: &RegisteredDevice) -> Result<RefreshOutcome> {
        let refresher = self.refresher.clone();
        let id = device.id().clone();
        let protocol = device.protocol();
        let catalog = device.catalog();

        let outcome = tokio::task::spawn_blocking(move || {
            refresher.refresh(&id, protocol.as_ref(), &catalog)
        })
        .await??;
        Ok(outcome)
    }

    async fn send_direct(
        &self,
        device: &RegisteredDevice,
        command: AvrCommand,
        known_muted: Option<bool>,
    ) -> Result<SendResult> {
        let refresher = self.refresher.clone();
        let protocol = device.protocol();
        let id = device.id().clone();

        let result = tokio::task::spawn_blocking(move || {
            if !refresher.is_live(protocol.as_ref()) {
                return SendResult::DeviceOffline;
            }
            match protocol.execute(&command, known_muted) {
                Ok(plan) => SendResult::Sent(plan),
                Err(e) => {
                    warn!("{}: {} failed: {}", id, command.logical_id(), e);
                    SendResult::Failed(e.to_string())
                }
            }
        })
        .await?;
        Ok(result)
    }
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("settle_delay", &self.settle_delay)
            .field("daemon", &self.bridge.is_some())
            .finish()
    }
}
