//! Typed views of monitoring API response bodies
//!
//! Only the fields the poller reads are modelled. Everything is optional or
//! defaulted except the top-level envelope key, whose absence is what marks a
//! body as malformed.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decode a raw payload into one of the envelopes below
pub fn decode<T: DeserializeOwned>(payload: &Value) -> std::result::Result<T, String> {
    T::deserialize(payload).map_err(|e| e.to_string())
}

#[derive(Debug, Clone, Deserialize)]
pub struct SitesEnvelope {
    pub sites: SiteList,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteList {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub site: Vec<SiteSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteSummary {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub location: SiteLocation,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteLocation {
    #[serde(default)]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryEnvelope {
    #[serde(rename = "Inventory")]
    pub inventory: Inventory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub inverters: Vec<InventoryInverter>,
    #[serde(default)]
    pub batteries: Vec<InventoryBattery>,
    #[serde(default)]
    pub meters: Vec<Value>,
    #[serde(default)]
    pub sensors: Vec<Value>,
    #[serde(default)]
    pub gateways: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryInverter {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(rename = "SN")]
    pub serial: String,
}

impl InventoryInverter {
    /// Model family, the part before the first `-`
    pub fn model_family(&self) -> &str {
        self.model.split('-').next().unwrap_or("").trim()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryBattery {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "SN")]
    pub serial: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub nameplate_capacity: Option<f64>,
}

/// `powerDetails` body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerDetailsEnvelope {
    pub power_details: MeterDetails,
}

/// `energyDetails` body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyDetailsEnvelope {
    pub energy_details: MeterDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterDetails {
    #[serde(default)]
    pub time_unit: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub meters: Vec<Meter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Meter {
    #[serde(rename = "type")]
    pub meter_type: String,
    #[serde(default)]
    pub values: Vec<MeterSample>,
}

/// One time-bucketed sample; `value` is missing for buckets with no data
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeterSample {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
}

/// `/equipment/{site}/{serial}/data` body
#[derive(Debug, Clone, Deserialize)]
pub struct EquipmentEnvelope {
    pub data: EquipmentData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EquipmentData {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub telemetries: Vec<InverterTelemetry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InverterTelemetry {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub total_active_power: Option<f64>,
    #[serde(default)]
    pub dc_voltage: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub inverter_mode: Option<String>,
    #[serde(rename = "L1Data", default)]
    pub l1_data: Option<PhaseData>,
}

/// Per-phase electrical block
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseData {
    #[serde(default)]
    pub ac_current: Option<f64>,
    #[serde(default)]
    pub ac_voltage: Option<f64>,
    #[serde(default)]
    pub ac_frequency: Option<f64>,
    #[serde(default)]
    pub apparent_power: Option<f64>,
    #[serde(default)]
    pub active_power: Option<f64>,
    #[serde(default)]
    pub reactive_power: Option<f64>,
}

/// `storageData` body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEnvelope {
    pub storage_data: StorageData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageData {
    #[serde(default)]
    pub battery_count: u32,
    #[serde(default)]
    pub batteries: Vec<BatteryStorage>,
}

/// Telemetry block for one battery inside a storage response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryStorage {
    #[serde(default)]
    pub nameplate: Option<f64>,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub model_number: Option<String>,
    #[serde(default)]
    pub telemetry_count: u32,
    #[serde(default)]
    pub telemetries: Vec<BatteryTelemetry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryTelemetry {
    #[serde(default)]
    pub time_stamp: Option<String>,
    #[serde(default)]
    pub power: Option<f64>,
    #[serde(default)]
    pub battery_state: Option<i64>,
    #[serde(default)]
    pub battery_percentage_state: Option<f64>,
}

/// `overview` body
#[derive(Debug, Clone, Deserialize)]
pub struct OverviewEnvelope {
    pub overview: Overview,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    #[serde(default)]
    pub last_update_time: Option<String>,
    #[serde(default)]
    pub life_time_data: Option<EnergyTotal>,
    #[serde(default)]
    pub last_year_data: Option<EnergyTotal>,
    #[serde(default)]
    pub last_month_data: Option<EnergyTotal>,
    #[serde(default)]
    pub last_day_data: Option<EnergyTotal>,
    #[serde(default)]
    pub current_power: Option<CurrentPower>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnergyTotal {
    #[serde(default)]
    pub energy: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentPower {
    #[serde(default)]
    pub power: Option<f64>,
}
