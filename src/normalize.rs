//! Response normalizer
//!
//! Turns a fetched JSON payload into the fixed reading set of an entity kind.
//! Normalization starts from the entity's cached readings so that data the
//! payload does not mention at all stays as it was, while data the payload
//! mentions but leaves empty falls back to zero.

pub mod meters;
pub mod readings;

use crate::api::types::{
    BatteryStorage, EnergyDetailsEnvelope, EquipmentEnvelope, OverviewEnvelope,
    PowerDetailsEnvelope, StorageEnvelope, decode,
};
use crate::entity::EntityKind;
use crate::error::{FetchError, SolarPollError};
use serde_json::Value;
use thiserror::Error;

pub use meters::{METER_CHANNELS, MeterRule, SamplePick, extract_meters};
pub use readings::{Channel, ChannelSpec, Reading, ReadingSet, Unit, channel_specs, round_to};

/// Why a payload could not be mapped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// Body lacks the expected top-level key or has the wrong shape
    #[error("Malformed response body: {message}")]
    Malformed { message: String },

    /// Inverter telemetry without a single-phase block
    #[error("telemetry has no single-phase data block")]
    UnsupportedDevice,
}

impl NormalizeError {
    fn malformed(message: String) -> Self {
        NormalizeError::Malformed { message }
    }

    /// Attach the device serial and lift into the crate error
    pub fn into_error(self, serial: &str) -> SolarPollError {
        match self {
            NormalizeError::Malformed { message } => FetchError::malformed(message).into(),
            NormalizeError::UnsupportedDevice => SolarPollError::unsupported_device(serial),
        }
    }
}

type NormalizeResult<T> = std::result::Result<T, NormalizeError>;

/// Map `payload` for an entity of `kind`, starting from `cached`
pub fn normalize(kind: EntityKind, payload: &Value, cached: &ReadingSet) -> NormalizeResult<ReadingSet> {
    let mut out = if cached.kind() == kind {
        cached.clone()
    } else {
        ReadingSet::new(kind)
    };

    match kind {
        EntityKind::Site => {
            let body: PowerDetailsEnvelope = decode(payload).map_err(NormalizeError::malformed)?;
            extract_meters(&body.power_details.meters, MeterRule::POWER, &mut out);
        }
        EntityKind::EnergyWindow => {
            let body: EnergyDetailsEnvelope = decode(payload).map_err(NormalizeError::malformed)?;
            extract_meters(&body.energy_details.meters, MeterRule::ENERGY, &mut out);
        }
        EntityKind::EnergyDay => {
            let body: EnergyDetailsEnvelope = decode(payload).map_err(NormalizeError::malformed)?;
            extract_meters(&body.energy_details.meters, MeterRule::ENERGY_KILO, &mut out);
        }
        EntityKind::Inverter => {
            let body: EquipmentEnvelope = decode(payload).map_err(NormalizeError::malformed)?;
            apply_inverter(&body, &mut out)?;
        }
        EntityKind::Battery => {
            let block: BatteryStorage = decode(payload).map_err(NormalizeError::malformed)?;
            if let Some(updated) = apply_battery(&block, &out) {
                out = updated;
            }
        }
        EntityKind::Overview => {
            let body: OverviewEnvelope = decode(payload).map_err(NormalizeError::malformed)?;
            apply_overview(&body, &mut out);
        }
    }
    Ok(out)
}

/// Battery blocks of a site's storage-data response
pub fn storage_batteries(payload: &Value) -> NormalizeResult<Vec<BatteryStorage>> {
    let body: StorageEnvelope = decode(payload).map_err(NormalizeError::malformed)?;
    Ok(body.storage_data.batteries)
}

/// Readings for one battery from its storage block; `None` when the block
/// carries no telemetry for the window
pub fn apply_battery(block: &BatteryStorage, cached: &ReadingSet) -> Option<ReadingSet> {
    if block.telemetry_count == 0 {
        return None;
    }
    let sample = block.telemetries.last()?;
    let mut out = cached.clone();
    put(&mut out, Channel::BatteryPower, sample.power);
    put(&mut out, Channel::BatteryLevel, sample.battery_percentage_state);
    if let (false, Some(nameplate)) = (out.is_present(Channel::NameplateCapacity), block.nameplate) {
        out.set(Channel::NameplateCapacity, nameplate);
    }
    Some(out)
}

/// 2 while tracking the maximum power point, 1 while starting, else 0
pub fn inverter_mode_index(mode: Option<&str>) -> f64 {
    match mode {
        Some("MPPT") => 2.0,
        Some("STARTING") => 1.0,
        _ => 0.0,
    }
}

fn apply_inverter(body: &EquipmentEnvelope, out: &mut ReadingSet) -> NormalizeResult<()> {
    // No samples in the window: nothing to change
    let Some(sample) = body.data.telemetries.last() else {
        return Ok(());
    };
    let Some(phase) = sample.l1_data.as_ref() else {
        return Err(NormalizeError::UnsupportedDevice);
    };

    put(out, Channel::ActivePower, phase.active_power);
    put(out, Channel::ReactivePower, phase.reactive_power);
    put(out, Channel::ApparentPower, phase.apparent_power);
    put(out, Channel::Temperature, sample.temperature);
    put(out, Channel::AcVoltage, phase.ac_voltage);
    if let Some(dc) = sample.dc_voltage {
        out.set(Channel::DcVoltage, dc);
    }
    put(out, Channel::AcCurrent, phase.ac_current);
    put(out, Channel::AcFrequency, phase.ac_frequency);
    out.set(
        Channel::InverterMode,
        inverter_mode_index(sample.inverter_mode.as_deref()),
    );
    Ok(())
}

fn apply_overview(body: &OverviewEnvelope, out: &mut ReadingSet) {
    let overview = &body.overview;
    let totals = [
        (Channel::LifetimeEnergy, &overview.life_time_data),
        (Channel::LastYearEnergy, &overview.last_year_data),
        (Channel::LastMonthEnergy, &overview.last_month_data),
        (Channel::LastDayEnergy, &overview.last_day_data),
    ];
    for (channel, total) in totals {
        if let Some(total) = total {
            put(out, channel, total.energy.map(|wh| wh / 1000.0));
        }
    }
    if let Some(current) = &overview.current_power {
        put(out, Channel::CurrentPower, current.power);
    }
}

fn put(out: &mut ReadingSet, channel: Channel, value: Option<f64>) {
    match value {
        Some(v) => out.set(channel, v),
        None => out.set_absent(channel),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn power_payload() -> Value {
        json!({"powerDetails": {
            "timeUnit": "QUARTER_OF_AN_HOUR",
            "unit": "W",
            "meters": [
                {"type": "Production", "values": [
                    {"date": "2024-06-01 11:00:00", "value": 4100.25},
                    {"date": "2024-06-01 11:15:00", "value": 4211.12345}
                ]},
                {"type": "Consumption", "values": [
                    {"date": "2024-06-01 11:00:00", "value": 900.0},
                    {"date": "2024-06-01 11:15:00"}
                ]},
                {"type": "FeedIn", "values": [
                    {"date": "2024-06-01 11:15:00", "value": 3311.0}
                ]}
            ]
        }})
    }

    #[test]
    fn site_power_uses_latest_sample() {
        let cached = ReadingSet::new(EntityKind::Site);
        let out = normalize(EntityKind::Site, &power_payload(), &cached).unwrap();
        assert_eq!(out.value(Channel::Production), 4211.123);
        assert_eq!(out.value(Channel::FeedIn), 3311.0);
    }

    #[test]
    fn empty_latest_entry_is_zero() {
        let mut cached = ReadingSet::new(EntityKind::Site);
        cached.set(Channel::Consumption, 777.0);
        let out = normalize(EntityKind::Site, &power_payload(), &cached).unwrap();
        assert_eq!(out.value(Channel::Consumption), 0.0);
        assert!(!out.is_present(Channel::Consumption));
    }

    #[test]
    fn absent_meter_keeps_cached_value() {
        let mut cached = ReadingSet::new(EntityKind::Site);
        cached.set(Channel::Purchased, 123.4);
        cached.set(Channel::SelfConsumption, 55.0);
        let out = normalize(EntityKind::Site, &power_payload(), &cached).unwrap();
        assert_eq!(out.value(Channel::Purchased), 123.4);
        assert_eq!(out.value(Channel::SelfConsumption), 55.0);
    }

    #[test]
    fn normalize_is_idempotent() {
        let cached = ReadingSet::new(EntityKind::Site);
        let payload = power_payload();
        let a = normalize(EntityKind::Site, &payload, &cached).unwrap();
        let b = normalize(EntityKind::Site, &payload, &cached).unwrap();
        assert_eq!(a, b);
        let c = normalize(EntityKind::Site, &payload, &a).unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn daily_energy_is_kilo_rounded() {
        let payload = json!({"energyDetails": {"timeUnit": "DAY", "unit": "Wh", "meters": [
            {"type": "Production", "values": [
                {"date": "2024-06-01 00:00:00", "value": 23456.0},
                {"date": "2024-06-02 00:00:00"}
            ]},
            {"type": "Purchased", "values": [
                {"date": "2024-06-01 00:00:00", "value": 1049.9},
                {"date": "2024-06-02 00:00:00"}
            ]}
        ]}});
        let out = normalize(EntityKind::EnergyDay, &payload, &ReadingSet::new(EntityKind::EnergyDay))
            .unwrap();
        assert_eq!(out.value(Channel::Production), round_to(23456.0 / 1000.0, 1));
        assert_eq!(out.value(Channel::Production), 23.5);
        assert_eq!(out.value(Channel::Purchased), 1.0);
    }

    #[test]
    fn window_energy_reads_last_complete_bucket() {
        let payload = json!({"energyDetails": {"meters": [
            {"type": "SelfConsumption", "values": [
                {"value": 200.5}, {"value": 180.25}, {"value": 12.0}
            ]}
        ]}});
        let out = normalize(
            EntityKind::EnergyWindow,
            &payload,
            &ReadingSet::new(EntityKind::EnergyWindow),
        )
        .unwrap();
        assert_eq!(out.value(Channel::SelfConsumption), 180.25);
    }

    #[test]
    fn missing_top_level_key_is_malformed() {
        let payload = json!({"energyDetails": {"meters": []}});
        let err = normalize(EntityKind::Site, &payload, &ReadingSet::new(EntityKind::Site))
            .unwrap_err();
        assert!(matches!(err, NormalizeError::Malformed { .. }));
        assert!(matches!(
            err.into_error("x"),
            SolarPollError::Fetch(FetchError::MalformedBody { .. })
        ));
    }

    fn inverter_payload(l1: Option<Value>, mode: &str) -> Value {
        let mut sample = json!({
            "date": "2024-06-01 11:10:00",
            "totalActivePower": 3050.0,
            "dcVoltage": 380.1234,
            "temperature": 41.23456,
            "inverterMode": mode
        });
        if let Some(l1) = l1 {
            sample["L1Data"] = l1;
        }
        json!({"data": {"count": 1, "telemetries": [sample]}})
    }

    #[test]
    fn inverter_single_phase_mapping() {
        let l1 = json!({
            "acCurrent": 12.76, "acVoltage": 240.3456, "acFrequency": 59.98,
            "apparentPower": 3100.0, "activePower": 3050.4444, "reactivePower": 120.0
        });
        let out = normalize(
            EntityKind::Inverter,
            &inverter_payload(Some(l1), "MPPT"),
            &ReadingSet::new(EntityKind::Inverter),
        )
        .unwrap();
        assert_eq!(out.value(Channel::ActivePower), 3050.444);
        assert_eq!(out.value(Channel::AcVoltage), 240.346);
        assert_eq!(out.value(Channel::DcVoltage), 380.123);
        assert_eq!(out.value(Channel::Temperature), 41.235);
        assert_eq!(out.value(Channel::AcCurrent), 12.8);
        assert_eq!(out.value(Channel::AcFrequency), 60.0);
        assert_eq!(out.value(Channel::InverterMode), 2.0);
    }

    #[test]
    fn inverter_without_phase_block_is_unsupported() {
        let mut cached = ReadingSet::new(EntityKind::Inverter);
        cached.set(Channel::ActivePower, 10.0);
        let err = normalize(
            EntityKind::Inverter,
            &inverter_payload(None, "MPPT"),
            &cached,
        )
        .unwrap_err();
        assert_eq!(err, NormalizeError::UnsupportedDevice);
        assert!(matches!(
            err.into_error("7E1234-56"),
            SolarPollError::UnsupportedDevice { serial } if serial == "7E1234-56"
        ));
    }

    #[test]
    fn inverter_without_samples_keeps_cache() {
        let mut cached = ReadingSet::new(EntityKind::Inverter);
        cached.set(Channel::ActivePower, 10.0);
        let payload = json!({"data": {"count": 0, "telemetries": []}});
        let out = normalize(EntityKind::Inverter, &payload, &cached).unwrap();
        assert_eq!(out, cached);
    }

    #[test]
    fn inverter_mode_labels() {
        assert_eq!(inverter_mode_index(Some("MPPT")), 2.0);
        assert_eq!(inverter_mode_index(Some("STARTING")), 1.0);
        assert_eq!(inverter_mode_index(Some("SLEEPING")), 0.0);
        assert_eq!(inverter_mode_index(None), 0.0);
    }

    #[test]
    fn battery_block_updates_only_with_telemetry() {
        let mut cached = ReadingSet::new(EntityKind::Battery);
        cached.set(Channel::NameplateCapacity, 9800.0);

        let empty = json!({"serialNumber": "BAT-1", "telemetryCount": 0, "telemetries": []});
        let out = normalize(EntityKind::Battery, &empty, &cached).unwrap();
        assert_eq!(out, cached);

        let full = json!({"serialNumber": "BAT-1", "nameplate": 10000.0, "telemetryCount": 2, "telemetries": [
            {"timeStamp": "2024-06-01 11:00:00", "power": 100.0, "batteryPercentageState": 40.0},
            {"timeStamp": "2024-06-01 11:05:00", "power": -250.5, "batteryPercentageState": 41.26}
        ]});
        let out = normalize(EntityKind::Battery, &full, &cached).unwrap();
        assert_eq!(out.value(Channel::BatteryPower), -250.5);
        assert_eq!(out.value(Channel::BatteryLevel), 41.3);
        assert_eq!(out.value(Channel::NameplateCapacity), 9800.0);
    }

    #[test]
    fn storage_response_lists_blocks() {
        let payload = json!({"storageData": {"batteryCount": 2, "batteries": [
            {"serialNumber": "A", "telemetryCount": 0},
            {"serialNumber": "B", "telemetryCount": 1, "telemetries": [{"power": 1.0}]}
        ]}});
        let blocks = storage_batteries(&payload).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].serial_number, "B");
        assert!(storage_batteries(&json!({"data": {}})).is_err());
    }

    #[test]
    fn overview_totals_are_kilo_rounded() {
        let payload = json!({"overview": {
            "lastUpdateTime": "2024-06-01 11:12:00",
            "lifeTimeData": {"energy": 51234567.0},
            "lastYearData": {"energy": 4321000.0},
            "lastMonthData": {"energy": 412345.0},
            "lastDayData": {"energy": 18049.0},
            "currentPower": {"power": 3050.12345}
        }});
        let out = normalize(EntityKind::Overview, &payload, &ReadingSet::new(EntityKind::Overview))
            .unwrap();
        assert_eq!(out.value(Channel::LifetimeEnergy), 51234.6);
        assert_eq!(out.value(Channel::LastYearEnergy), 4321.0);
        assert_eq!(out.value(Channel::LastMonthEnergy), 412.3);
        assert_eq!(out.value(Channel::LastDayEnergy), 18.0);
        assert_eq!(out.value(Channel::CurrentPower), 3050.123);
    }
}
