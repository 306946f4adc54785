use pipeworker_core::config::ConcurrencySettings;
use proptest::prelude::*;

/// Strategy for valid dynamic-mode concurrency settings
pub fn dynamic_settings_strategy() -> impl Strategy<Value = ConcurrencySettings> {
    (1usize..16, 0usize..16, prop::option::of(0usize..32)).prop_map(|(min, extra, max_extra)| {
        let starting = min + extra;
        ConcurrencySettings::dynamic(starting, min, 100).with_max(max_extra.map(|m| starting + m))
    })
}

/// Strategy for per-window completion counts, idle windows included
pub fn throughput_strategy() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(prop_oneof![1 => Just(0u64), 4 => 1u64..200], 1..40)
}
