#![no_main]
use libfuzzer_sys::fuzz_target;
use solarpoll::EntityKind;
use solarpoll::normalize::{ReadingSet, normalize, storage_batteries};

const KINDS: [EntityKind; 6] = [
    EntityKind::Site,
    EntityKind::Inverter,
    EntityKind::Battery,
    EntityKind::EnergyWindow,
    EntityKind::EnergyDay,
    EntityKind::Overview,
];

fuzz_target!(|data: &[u8]| {
    // First byte picks the entity kind, the rest is the response body
    let Some((&selector, body)) = data.split_first() else {
        return;
    };
    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(body) else {
        return;
    };
    let kind = KINDS[selector as usize % KINDS.len()];

    let cached = ReadingSet::new(kind);
    if let Ok(first) = normalize(kind, &payload, &cached) {
        // Same payload, same cache: same readings
        let second = normalize(kind, &payload, &cached);
        assert_eq!(Ok(first), second);
    }
    let _ = storage_batteries(&payload);
});
