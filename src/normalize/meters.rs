//! Generic meter-channel extraction
//!
//! Site power, 15-minute energy and daily energy payloads share one shape: an
//! array of typed meters, each with a time-ordered sample array. A single
//! table maps meter types onto channels; the per-kind differences are only
//! which sample is read and which base-unit divisor applies.

use super::readings::{Channel, ReadingSet};
use crate::api::types::Meter;

/// Meter type names as reported by the API, with the channel each feeds
pub const METER_CHANNELS: [(&str, Channel); 5] = [
    ("Production", Channel::Production),
    ("Consumption", Channel::Consumption),
    ("Purchased", Channel::Purchased),
    ("SelfConsumption", Channel::SelfConsumption),
    ("FeedIn", Channel::FeedIn),
];

/// Which sample of a meter's array is the current reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplePick {
    /// Most recent sample in the window
    Last,
    /// Most recent complete bucket; the last bucket of an energy window is
    /// still filling (or lies in the future for daily windows)
    LastComplete,
}

impl SamplePick {
    fn index(self, len: usize) -> Option<usize> {
        match (self, len) {
            (_, 0) => None,
            (Self::Last, n) => Some(n - 1),
            (Self::LastComplete, 1) => Some(0),
            (Self::LastComplete, n) => Some(n - 2),
        }
    }
}

/// Sample selection and scaling for one entity kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterRule {
    pub pick: SamplePick,
    /// Base-unit divisor applied before the channel's rounding
    pub divisor: f64,
}

impl MeterRule {
    pub const POWER: MeterRule = MeterRule {
        pick: SamplePick::Last,
        divisor: 1.0,
    };
    pub const ENERGY: MeterRule = MeterRule {
        pick: SamplePick::LastComplete,
        divisor: 1.0,
    };
    pub const ENERGY_KILO: MeterRule = MeterRule {
        pick: SamplePick::LastComplete,
        divisor: 1000.0,
    };
}

pub fn channel_for_meter(meter_type: &str) -> Option<Channel> {
    METER_CHANNELS
        .iter()
        .find(|(name, _)| *name == meter_type)
        .map(|(_, channel)| *channel)
}

/// Apply every recognised meter onto `readings`.
///
/// A meter missing from the payload, or one with no samples, leaves its
/// channel untouched. A selected sample without a value sets the channel to
/// zero. Returns the number of channels written.
pub fn extract_meters(meters: &[Meter], rule: MeterRule, readings: &mut ReadingSet) -> usize {
    let mut written = 0;
    for meter in meters {
        let Some(channel) = channel_for_meter(&meter.meter_type) else {
            continue;
        };
        let Some(idx) = rule.pick.index(meter.values.len()) else {
            continue;
        };
        let wrote = match meter.values[idx].value {
            Some(v) => readings.set(channel, v / rule.divisor),
            None => readings.set_absent(channel),
        };
        if wrote {
            written += 1;
        }
    }
    written
}
