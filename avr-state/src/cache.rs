//! In-memory device state cache
//!
//! The cache holds one [`DeviceState`] per device behind a `parking_lot`
//! lock. Poll results and daemon pushes write through the same per-field
//! path, so concurrent writers resolve as last write wins per field. Every
//! write that actually changes a value emits a [`StateChange`] to all
//! subscribers.

use std::collections::HashMap;
use std::sync::{mpsc, Arc};

use avr_api::StatePatch;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{Result, StateError};
use crate::model::{DeviceId, DeviceState, FieldUpdate, Reachability, StateChange, StateField};

/// Shared, cloneable handle to the device state of all devices
#[derive(Clone, Default)]
pub struct DeviceStateCache {
    states: Arc<RwLock<HashMap<DeviceId, DeviceState>>>,
    subscribers: Arc<Mutex<Vec<mpsc::Sender<StateChange>>>>,
}

impl DeviceStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a device. Existing state is kept.
    pub fn insert_device(&self, id: DeviceId) {
        self.states.write().entry(id).or_default();
    }

    /// Stop tracking a device, returning its last state
    pub fn remove_device(&self, id: &DeviceId) -> Option<DeviceState> {
        self.states.write().remove(id)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.states.read().contains_key(id)
    }

    /// Snapshot of one device's state
    pub fn get(&self, id: &DeviceId) -> Option<DeviceState> {
        self.states.read().get(id).cloned()
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.states.read().keys().cloned().collect()
    }

    /// Receive a [`StateChange`] for every field that changes from now on
    pub fn subscribe(&self) -> mpsc::Receiver<StateChange> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Apply a normalized poll result.
    ///
    /// Only fields present in the patch are written. Returns the fields
    /// whose value changed.
    pub fn apply_poll_result(&self, id: &DeviceId, patch: &StatePatch) -> Result<Vec<StateField>> {
        let changed = {
            let mut states = self.states.write();
            let state = states
                .get_mut(id)
                .ok_or_else(|| StateError::UnknownDevice(id.to_string()))?;
            state.apply_patch(patch)
        };
        self.notify(id, &changed);
        Ok(changed)
    }

    /// Reset a device to the offline sentinel and mark it unreachable
    pub fn apply_offline(&self, id: &DeviceId) -> Result<Vec<StateField>> {
        let mut changed = self.apply_poll_result(id, &StatePatch::offline())?;
        if self.set_reachability(id, Reachability::Unreachable)? {
            changed.push(StateField::Reachability);
        }
        Ok(changed)
    }

    /// Write exactly one field, returning whether it changed
    pub fn apply_push_field(&self, id: &DeviceId, update: FieldUpdate) -> Result<bool> {
        let field = update.field();
        let changed = {
            let mut states = self.states.write();
            let state = states
                .get_mut(id)
                .ok_or_else(|| StateError::UnknownDevice(id.to_string()))?;
            state.apply(update)
        };
        if changed {
            self.notify(id, &[field]);
        }
        Ok(changed)
    }

    /// Record the result of a liveness check, returning whether it changed
    pub fn set_reachability(&self, id: &DeviceId, reachability: Reachability) -> Result<bool> {
        let changed = {
            let mut states = self.states.write();
            let state = states
                .get_mut(id)
                .ok_or_else(|| StateError::UnknownDevice(id.to_string()))?;
            let changed = state.reachability != reachability;
            state.reachability = reachability;
            changed
        };
        if changed {
            self.notify(id, &[StateField::Reachability]);
        }
        Ok(changed)
    }

    fn notify(&self, id: &DeviceId, fields: &[StateField]) {
        if fields.is_empty() {
            return;
        }
        debug!("{} changed: {:?}", id, fields);

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| {
            fields.iter().all(|field| {
                tx.send(StateChange {
                    device_id: id.clone(),
                    field: *field,
                })
                .is_ok()
            })
        });
    }
}

impl std::fmt::Debug for DeviceStateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStateCache")
            .field("device_count", &self.states.read().len())
            .field("subscriber_count", &self.subscribers.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(id: &str) -> (DeviceStateCache, DeviceId) {
        let cache = DeviceStateCache::new();
        let id = DeviceId::from(id);
        cache.insert_device(id.clone());
        (cache, id)
    }

    fn full_patch() -> StatePatch {
        StatePatch {
            power: Some(true),
            input: Some("TV Audio".into()),
            volume: Some(-40.0),
            muted: Some(false),
            sound_mode: Some("STEREO".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_unknown_device_is_rejected() {
        let cache = DeviceStateCache::new();
        let result = cache.apply_push_field(&DeviceId::from("ghost"), FieldUpdate::Power(true));
        assert!(matches!(result, Err(StateError::UnknownDevice(_))));
    }

    #[test]
    fn test_poll_result_is_idempotent() {
        let (cache, id) = cache_with("avr");

        let first = cache.apply_poll_result(&id, &full_patch()).unwrap();
        let snapshot = cache.get(&id).unwrap();
        let second = cache.apply_poll_result(&id, &full_patch()).unwrap();

        assert_eq!(first.len(), 5);
        assert!(second.is_empty());
        assert_eq!(cache.get(&id).unwrap(), snapshot);
    }

    #[test]
    fn test_offline_resets_sentinels() {
        let (cache, id) = cache_with("avr");
        cache.apply_poll_result(&id, &full_patch()).unwrap();

        cache.apply_offline(&id).unwrap();

        let state = cache.get(&id).unwrap();
        assert_eq!(state.power, Some(false));
        assert_eq!(state.input.as_deref(), Some(""));
        assert_eq!(state.sound_mode.as_deref(), Some(""));
        assert_eq!(state.volume, Some(-99.0));
        assert_eq!(state.muted, Some(false));
        assert_eq!(state.reachability, Reachability::Unreachable);
    }

    #[test]
    fn test_push_changes_only_one_field() {
        let (cache, id) = cache_with("avr");
        cache.apply_poll_result(&id, &full_patch()).unwrap();
        let before = cache.get(&id).unwrap();

        assert!(cache.apply_push_field(&id, FieldUpdate::Volume(-20.0)).unwrap());

        let after = cache.get(&id).unwrap();
        assert_eq!(after.volume, Some(-20.0));
        assert_eq!(
            DeviceState {
                volume: before.volume,
                ..after
            },
            before
        );
    }

    #[test]
    fn test_subscribers_receive_changes() {
        let (cache, id) = cache_with("avr");
        let rx = cache.subscribe();

        cache.apply_push_field(&id, FieldUpdate::Muted(true)).unwrap();
        cache.apply_push_field(&id, FieldUpdate::Muted(true)).unwrap();
        cache.set_reachability(&id, Reachability::Reachable).unwrap();

        let events: Vec<StateChange> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                StateChange { device_id: id.clone(), field: StateField::Muted },
                StateChange { device_id: id, field: StateField::Reachability },
            ]
        );
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let (cache, id) = cache_with("avr");
        drop(cache.subscribe());

        cache.apply_push_field(&id, FieldUpdate::Power(true)).unwrap();

        assert_eq!(cache.subscribers.lock().len(), 0);
    }

    #[test]
    fn test_remove_device() {
        let (cache, id) = cache_with("avr");
        assert!(cache.contains(&id));
        assert!(cache.remove_device(&id).is_some());
        assert!(cache.device_ids().is_empty());
    }
}
