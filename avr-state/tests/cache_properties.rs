//! Property tests for cache writes

use avr_api::StatePatch;
use avr_state::{DeviceId, DeviceStateCache, FieldUpdate};
use proptest::option;
use proptest::prelude::*;

fn arb_patch() -> impl Strategy<Value = StatePatch> {
    (
        option::of(any::<bool>()),
        option::of("[A-Z/ ]{0,12}"),
        option::of((-160i32..36).prop_map(|half| f64::from(half) / 2.0)),
        option::of(any::<bool>()),
        option::of("[A-Z ]{0,16}"),
        option::of(1u8..=56),
    )
        .prop_map(|(power, input, volume, muted, sound_mode, tuner_preset)| StatePatch {
            power,
            input,
            volume,
            muted,
            sound_mode,
            tuner_preset,
            station_name: None,
        })
}

proptest! {
    #[test]
    fn prop_poll_apply_is_idempotent(seed in arb_patch(), patch in arb_patch()) {
        let cache = DeviceStateCache::new();
        let id = DeviceId::from("avr");
        cache.insert_device(id.clone());
        cache.apply_poll_result(&id, &seed).unwrap();

        cache.apply_poll_result(&id, &patch).unwrap();
        let once = cache.get(&id).unwrap();
        let changed = cache.apply_poll_result(&id, &patch).unwrap();

        prop_assert!(changed.is_empty());
        prop_assert_eq!(cache.get(&id).unwrap(), once);
    }

    #[test]
    fn prop_volume_push_touches_only_volume(seed in arb_patch(), volume in -80.0f64..18.0) {
        let cache = DeviceStateCache::new();
        let id = DeviceId::from("avr");
        cache.insert_device(id.clone());
        cache.apply_poll_result(&id, &seed).unwrap();
        let before = cache.get(&id).unwrap();

        cache.apply_push_field(&id, FieldUpdate::Volume(volume)).unwrap();
        let after = cache.get(&id).unwrap();

        prop_assert_eq!(after.volume, Some(volume));
        prop_assert_eq!(after.power, before.power);
        prop_assert_eq!(after.input, before.input);
        prop_assert_eq!(after.sound_mode, before.sound_mode);
        prop_assert_eq!(after.muted, before.muted);
    }
}
