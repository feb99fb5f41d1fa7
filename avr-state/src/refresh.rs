//! Refresh and liveness state machine
//!
//! A refresh walks `Unknown → Unreachable | Reachable`:
//!
//! 1. the liveness probe runs first; a silent device is marked
//!    [`Reachability::Unreachable`] and reset to the offline sentinel
//!    without any protocol call,
//! 2. otherwise the device is marked [`Reachability::Reachable`] and the
//!    protocol fetch result is applied to the cache.
//!
//! A failed fetch never propagates: the previous cached values stay.

use std::sync::Arc;

use avr_api::{AvrProtocol, InputCatalog, LivenessProbe};
use tracing::{debug, warn};

use crate::cache::DeviceStateCache;
use crate::error::Result;
use crate::model::{DeviceId, Reachability, StateField};

/// What a refresh did to the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The device failed the liveness check and was reset to the offline sentinel
    Offline,
    /// The fetch succeeded; the listed fields changed
    Updated(Vec<StateField>),
    /// The device was live but the fetch failed; cached values are unchanged
    FetchFailed,
}

/// Runs refreshes against the shared cache
#[derive(Clone)]
pub struct Refresher {
    cache: DeviceStateCache,
    probe: Arc<dyn LivenessProbe>,
}

impl Refresher {
    pub fn new(cache: DeviceStateCache, probe: Arc<dyn LivenessProbe>) -> Self {
        Self { cache, probe }
    }

    pub fn cache(&self) -> &DeviceStateCache {
        &self.cache
    }

    /// Check whether the device answers the liveness probe
    pub fn is_live(&self, protocol: &dyn AvrProtocol) -> bool {
        self.probe.is_live(&protocol.device().ip)
    }

    /// Refresh one device.
    ///
    /// Fails only when the device is not tracked by the cache.
    pub fn refresh(
        &self,
        id: &DeviceId,
        protocol: &dyn AvrProtocol,
        catalog: &InputCatalog,
    ) -> Result<RefreshOutcome> {
        let device = protocol.device();

        if !self.probe.is_live(&device.ip) {
            debug!("{} ({}) is not live", id, device.ip);
            self.cache.apply_offline(id)?;
            return Ok(RefreshOutcome::Offline);
        }

        self.cache.set_reachability(id, Reachability::Reachable)?;

        match protocol.fetch_state(catalog) {
            Ok(patch) => {
                let changed = self.cache.apply_poll_result(id, &patch)?;
                Ok(RefreshOutcome::Updated(changed))
            }
            Err(e) => {
                if device.can_be_shutdown {
                    debug!("refresh of {} failed: {}", id, e);
                } else {
                    warn!("refresh of {} ({} API) failed: {}", id, protocol.mode(), e);
                }
                Ok(RefreshOutcome::FetchFailed)
            }
        }
    }
}

impl std::fmt::Debug for Refresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refresher").field("cache", &self.cache).finish()
    }
}
