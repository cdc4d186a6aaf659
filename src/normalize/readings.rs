//! Typed reading sets
//!
//! Every entity kind publishes a fixed list of channels. A channel's name,
//! unit and rounding never change at runtime; a channel the last refresh did
//! not report reads as zero with `present == false`.

use crate::entity::EntityKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// One named telemetry value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    Production,
    Consumption,
    #[serde(rename = "purchasedPower")]
    Purchased,
    SelfConsumption,
    FeedIn,
    MinutesSinceChange,
    ActivePower,
    ReactivePower,
    ApparentPower,
    Temperature,
    AcVoltage,
    DcVoltage,
    AcCurrent,
    AcFrequency,
    InverterMode,
    BatteryPower,
    BatteryLevel,
    NameplateCapacity,
    LifetimeEnergy,
    LastYearEnergy,
    LastMonthEnergy,
    LastDayEnergy,
    CurrentPower,
}

impl Channel {
    pub fn name(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Consumption => "consumption",
            Self::Purchased => "purchasedPower",
            Self::SelfConsumption => "selfConsumption",
            Self::FeedIn => "feedIn",
            Self::MinutesSinceChange => "minutesSinceChange",
            Self::ActivePower => "activePower",
            Self::ReactivePower => "reactivePower",
            Self::ApparentPower => "apparentPower",
            Self::Temperature => "temperature",
            Self::AcVoltage => "acVoltage",
            Self::DcVoltage => "dcVoltage",
            Self::AcCurrent => "acCurrent",
            Self::AcFrequency => "acFrequency",
            Self::InverterMode => "inverterMode",
            Self::BatteryPower => "batteryPower",
            Self::BatteryLevel => "batteryLevel",
            Self::NameplateCapacity => "nameplateCapacity",
            Self::LifetimeEnergy => "lifetimeEnergy",
            Self::LastYearEnergy => "lastYearEnergy",
            Self::LastMonthEnergy => "lastMonthEnergy",
            Self::LastDayEnergy => "lastDayEnergy",
            Self::CurrentPower => "currentPower",
        }
    }

    /// Channels that describe the refresh itself rather than the device
    pub fn is_bookkeeping(self) -> bool {
        matches!(self, Self::MinutesSinceChange)
    }

    /// Channels seeded from inventory and never reported by telemetry
    pub fn is_static(self) -> bool {
        matches!(self, Self::NameplateCapacity)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unit of a channel within a given entity kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Unit {
    Watts,
    WattHours,
    KilowattHours,
    VoltAmps,
    VoltAmpsReactive,
    Volts,
    Amps,
    Hertz,
    Celsius,
    Percent,
    Minutes,
    Index,
}

impl Unit {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Watts => "W",
            Self::WattHours => "Wh",
            Self::KilowattHours => "kWh",
            Self::VoltAmps => "VA",
            Self::VoltAmpsReactive => "var",
            Self::Volts => "V",
            Self::Amps => "A",
            Self::Hertz => "Hz",
            Self::Celsius => "°C",
            Self::Percent => "%",
            Self::Minutes => "min",
            Self::Index => "",
        }
    }
}

/// Fixed definition of one channel for one entity kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSpec {
    pub channel: Channel,
    pub unit: Unit,
    pub decimals: u32,
}

const fn entry(channel: Channel, unit: Unit, decimals: u32) -> ChannelSpec {
    ChannelSpec {
        channel,
        unit,
        decimals,
    }
}

const SITE: &[ChannelSpec] = &[
    entry(Channel::Production, Unit::Watts, 3),
    entry(Channel::Consumption, Unit::Watts, 3),
    entry(Channel::Purchased, Unit::Watts, 3),
    entry(Channel::SelfConsumption, Unit::Watts, 3),
    entry(Channel::FeedIn, Unit::Watts, 3),
    entry(Channel::MinutesSinceChange, Unit::Minutes, 1),
];

const ENERGY_WINDOW: &[ChannelSpec] = &[
    entry(Channel::Production, Unit::WattHours, 3),
    entry(Channel::Consumption, Unit::WattHours, 3),
    entry(Channel::Purchased, Unit::WattHours, 3),
    entry(Channel::SelfConsumption, Unit::WattHours, 3),
    entry(Channel::FeedIn, Unit::WattHours, 3),
    entry(Channel::MinutesSinceChange, Unit::Minutes, 1),
];

const ENERGY_DAY: &[ChannelSpec] = &[
    entry(Channel::Production, Unit::KilowattHours, 1),
    entry(Channel::Consumption, Unit::KilowattHours, 1),
    entry(Channel::Purchased, Unit::KilowattHours, 1),
    entry(Channel::SelfConsumption, Unit::KilowattHours, 1),
    entry(Channel::FeedIn, Unit::KilowattHours, 1),
];

const INVERTER: &[ChannelSpec] = &[
    entry(Channel::ActivePower, Unit::Watts, 3),
    entry(Channel::ReactivePower, Unit::VoltAmpsReactive, 3),
    entry(Channel::ApparentPower, Unit::VoltAmps, 3),
    entry(Channel::Temperature, Unit::Celsius, 3),
    entry(Channel::AcVoltage, Unit::Volts, 3),
    entry(Channel::DcVoltage, Unit::Volts, 3),
    entry(Channel::AcCurrent, Unit::Amps, 1),
    entry(Channel::AcFrequency, Unit::Hertz, 1),
    entry(Channel::InverterMode, Unit::Index, 0),
];

const BATTERY: &[ChannelSpec] = &[
    entry(Channel::BatteryPower, Unit::Watts, 3),
    entry(Channel::BatteryLevel, Unit::Percent, 1),
    entry(Channel::NameplateCapacity, Unit::WattHours, 1),
];

const OVERVIEW: &[ChannelSpec] = &[
    entry(Channel::LifetimeEnergy, Unit::KilowattHours, 1),
    entry(Channel::LastYearEnergy, Unit::KilowattHours, 1),
    entry(Channel::LastMonthEnergy, Unit::KilowattHours, 1),
    entry(Channel::LastDayEnergy, Unit::KilowattHours, 1),
    entry(Channel::CurrentPower, Unit::Watts, 3),
];

/// Channel table for an entity kind, in publish order
pub fn channel_specs(kind: EntityKind) -> &'static [ChannelSpec] {
    match kind {
        EntityKind::Site => SITE,
        EntityKind::EnergyWindow => ENERGY_WINDOW,
        EntityKind::EnergyDay => ENERGY_DAY,
        EntityKind::Inverter => INVERTER,
        EntityKind::Battery => BATTERY,
        EntityKind::Overview => OVERVIEW,
    }
}

/// Round to a fixed number of decimals, ties to even
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round_ties_even() / factor;
    // Huge magnitudes overflow the scaled value
    if rounded.is_finite() { rounded } else { value }
}

/// A channel's current value and whether the last refresh reported it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    pub value: f64,
    pub present: bool,
}

impl Reading {
    const ABSENT: Reading = Reading {
        value: 0.0,
        present: false,
    };
}

/// Values for every channel of one entity kind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingSet {
    kind: EntityKind,
    readings: BTreeMap<Channel, Reading>,
}

impl ReadingSet {
    /// All channels of `kind`, zero and absent
    pub fn new(kind: EntityKind) -> Self {
        let readings = channel_specs(kind)
            .iter()
            .map(|s| (s.channel, Reading::ABSENT))
            .collect();
        Self { kind, readings }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    fn spec_for(&self, channel: Channel) -> Option<&'static ChannelSpec> {
        channel_specs(self.kind)
            .iter()
            .find(|s| s.channel == channel)
    }

    /// Current value, zero when the channel is absent or foreign to this kind
    pub fn value(&self, channel: Channel) -> f64 {
        self.readings
            .get(&channel)
            .map(|r| r.value)
            .unwrap_or(0.0)
    }

    pub fn reading(&self, channel: Channel) -> Option<Reading> {
        self.readings.get(&channel).copied()
    }

    pub fn is_present(&self, channel: Channel) -> bool {
        self.readings.get(&channel).is_some_and(|r| r.present)
    }

    /// Store a raw value using the channel's rounding; non-finite values read as zero.
    /// Returns false when the channel does not belong to this kind.
    pub fn set(&mut self, channel: Channel, raw: f64) -> bool {
        let Some(spec) = self.spec_for(channel) else {
            return false;
        };
        let value = if raw.is_finite() {
            round_to(raw, spec.decimals)
        } else {
            0.0
        };
        self.readings.insert(
            channel,
            Reading {
                value,
                present: raw.is_finite(),
            },
        );
        true
    }

    /// Reset a channel to its fallback
    pub fn set_absent(&mut self, channel: Channel) -> bool {
        if self.spec_for(channel).is_none() {
            return false;
        }
        self.readings.insert(channel, Reading::ABSENT);
        true
    }

    /// Failure fallback: every telemetry channel zeroed, inventory and
    /// bookkeeping channels kept
    pub fn zeroed(&self) -> Self {
        let mut out = self.clone();
        for (channel, reading) in out.readings.iter_mut() {
            if !channel.is_static() && !channel.is_bookkeeping() {
                *reading = Reading::ABSENT;
            }
        }
        out
    }

    /// Whether any device channel's value differs from `other`
    pub fn differs_from(&self, other: &ReadingSet) -> bool {
        self.kind != other.kind
            || self
                .readings
                .iter()
                .filter(|(c, _)| !c.is_bookkeeping())
                .any(|(c, r)| other.value(*c) != r.value)
    }

    /// Channels in publish order with their definitions
    pub fn iter(&self) -> impl Iterator<Item = (&'static ChannelSpec, Reading)> + '_ {
        channel_specs(self.kind).iter().map(|s| {
            (
                s,
                self.readings
                    .get(&s.channel)
                    .copied()
                    .unwrap_or(Reading::ABSENT),
            )
        })
    }

    /// One-line `name=value unit` rendering for logs
    pub fn summary(&self) -> String {
        self.iter()
            .map(|(s, r)| {
                if s.unit.symbol().is_empty() {
                    format!("{}={}", s.channel, r.value)
                } else {
                    format!("{}={}{}", s.channel, r.value, s.unit.symbol())
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
