//! Monitored entities
//!
//! An entity is one thing with its own polling cadence: a site, one of its
//! devices, or one of its aggregate views. Each entity owns its throttling
//! state and its cached readings; nothing about one entity is shared with
//! another except a site's list of battery serials.

use crate::api::{ApiRequest, Resource, TimeUnit};
use crate::error::{Result, SolarPollError};
use crate::gate::RateLimitState;
use crate::normalize::{Channel, ReadingSet};
use crate::window::TimeWindow;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::fmt;

/// Kind of monitored entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EntityKind {
    Site,
    Inverter,
    Battery,
    /// Energy over the rolling lookback, in 15-minute buckets
    EnergyWindow,
    /// Energy for the current local day
    EnergyDay,
    Overview,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::Inverter => "inverter",
            Self::Battery => "battery",
            Self::EnergyWindow => "energy_window",
            Self::EnergyDay => "energy_day",
            Self::Overview => "overview",
        }
    }

    /// Whether the entity issues fetches of its own
    pub fn has_fetch_path(self) -> bool {
        !matches!(self, Self::Battery)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Address of a site entity
pub fn site_address(site_id: &str) -> String {
    site_id.to_string()
}

/// Address of a device entity: serial without dashes, lowercased, at most 14 chars
pub fn device_address(serial: &str) -> String {
    serial
        .chars()
        .filter(|c| *c != '-')
        .flat_map(char::to_lowercase)
        .take(14)
        .collect()
}

/// Address of a per-site aggregate entity
pub fn aggregate_address(kind: EntityKind, site_id: &str) -> String {
    let prefix = match kind {
        EntityKind::EnergyWindow => "en",
        EntityKind::EnergyDay => "dy",
        EntityKind::Overview => "ov",
        _ => "",
    };
    format!("{}{}", prefix, site_id)
}

/// Registration record handed to the sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityDescriptor {
    pub address: String,
    pub name: String,
    pub kind: EntityKind,
    pub site_id: String,
    pub serial: Option<String>,
}

/// One pollable entity with its own cadence and cached readings
#[derive(Debug, Clone)]
pub struct MonitoredEntity {
    address: String,
    name: String,
    kind: EntityKind,
    site_id: String,
    timezone: Tz,
    serial: Option<String>,
    gate: RateLimitState,
    readings: ReadingSet,
    last_fetch: Option<DateTime<Utc>>,
    unsupported: bool,
    /// Battery serials batched into this site's storage request
    batteries: Vec<String>,
}

impl MonitoredEntity {
    fn new(
        address: String,
        name: String,
        kind: EntityKind,
        site_id: &str,
        timezone: Tz,
        serial: Option<String>,
        threshold_minutes: f64,
    ) -> Self {
        Self {
            address,
            name,
            kind,
            site_id: site_id.to_string(),
            timezone,
            serial,
            gate: RateLimitState::new(threshold_minutes),
            readings: ReadingSet::new(kind),
            last_fetch: None,
            unsupported: false,
            batteries: Vec::new(),
        }
    }

    pub fn site(site_id: &str, name: &str, timezone: Tz, threshold_minutes: f64) -> Self {
        Self::new(
            site_address(site_id),
            name.to_string(),
            EntityKind::Site,
            site_id,
            timezone,
            None,
            threshold_minutes,
        )
    }

    pub fn inverter(
        site_id: &str,
        serial: &str,
        name: &str,
        timezone: Tz,
        threshold_minutes: f64,
    ) -> Self {
        Self::new(
            device_address(serial),
            name.to_string(),
            EntityKind::Inverter,
            site_id,
            timezone,
            Some(serial.to_string()),
            threshold_minutes,
        )
    }

    /// Battery entity seeded with its inventory nameplate capacity
    pub fn battery(
        site_id: &str,
        serial: &str,
        name: &str,
        timezone: Tz,
        nameplate_capacity: Option<f64>,
        threshold_minutes: f64,
    ) -> Self {
        let mut entity = Self::new(
            device_address(serial),
            name.to_string(),
            EntityKind::Battery,
            site_id,
            timezone,
            Some(serial.to_string()),
            threshold_minutes,
        );
        if let Some(capacity) = nameplate_capacity {
            entity.readings.set(Channel::NameplateCapacity, capacity);
        }
        entity
    }

    /// Per-site aggregate (energy window, energy day or overview)
    pub fn aggregate(kind: EntityKind, site_id: &str, timezone: Tz, threshold_minutes: f64) -> Self {
        let name = match kind {
            EntityKind::EnergyWindow => "Energy Last 15min",
            EntityKind::EnergyDay => "Energy Today",
            EntityKind::Overview => "Production Overview",
            _ => "Aggregate",
        };
        Self::new(
            aggregate_address(kind, site_id),
            name.to_string(),
            kind,
            site_id,
            timezone,
            None,
            threshold_minutes,
        )
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    pub fn gate(&self) -> &RateLimitState {
        &self.gate
    }

    pub fn readings(&self) -> &ReadingSet {
        &self.readings
    }

    pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.last_fetch
    }

    pub fn is_unsupported(&self) -> bool {
        self.unsupported
    }

    pub fn batteries(&self) -> &[String] {
        &self.batteries
    }

    pub fn descriptor(&self) -> EntityDescriptor {
        EntityDescriptor {
            address: self.address.clone(),
            name: self.name.clone(),
            kind: self.kind,
            site_id: self.site_id.clone(),
            serial: self.serial.clone(),
        }
    }

    /// Add a battery serial to a site's storage batch; no-op when already listed
    pub fn attach_battery(&mut self, serial: &str) -> bool {
        if self.kind != EntityKind::Site || self.batteries.iter().any(|s| s == serial) {
            return false;
        }
        self.batteries.push(serial.to_string());
        true
    }

    /// Whether this tick should issue network I/O for the entity
    pub fn needs_fetch(&self, now: DateTime<Utc>) -> bool {
        self.kind.has_fetch_path() && !self.unsupported && self.gate.is_due(now)
    }

    /// The entity's own fetch for this tick
    pub fn refresh_request(&self, now: DateTime<Utc>, lookback_minutes: i64) -> Result<ApiRequest> {
        let site_id = self.site_id.clone();
        let request = match self.kind {
            EntityKind::Site => ApiRequest::windowed(
                Resource::PowerDetails { site_id },
                TimeWindow::lookback_at(now, self.timezone, lookback_minutes)?,
            ),
            EntityKind::EnergyWindow => ApiRequest::windowed(
                Resource::EnergyDetails {
                    site_id,
                    time_unit: TimeUnit::QuarterOfAnHour,
                },
                TimeWindow::lookback_at(now, self.timezone, lookback_minutes)?,
            ),
            EntityKind::EnergyDay => ApiRequest::windowed(
                Resource::EnergyDetails {
                    site_id,
                    time_unit: TimeUnit::Day,
                },
                TimeWindow::midnight_at(now, self.timezone),
            ),
            EntityKind::Inverter => ApiRequest::windowed(
                Resource::EquipmentData {
                    site_id,
                    serial: self.serial.clone().unwrap_or_default(),
                },
                TimeWindow::lookback_at(now, self.timezone, lookback_minutes)?,
            ),
            EntityKind::Battery => {
                return Err(SolarPollError::generic(format!(
                    "battery {} is refreshed through its site's storage fetch",
                    self.address
                )));
            }
            EntityKind::Overview => ApiRequest::plain(Resource::Overview { site_id }),
        };
        Ok(request)
    }

    /// The site's batched storage fetch; `None` without registered batteries
    pub fn storage_request(
        &self,
        now: DateTime<Utc>,
        lookback_minutes: i64,
    ) -> Result<Option<ApiRequest>> {
        if self.kind != EntityKind::Site || self.batteries.is_empty() {
            return Ok(None);
        }
        Ok(Some(ApiRequest::windowed(
            Resource::StorageData {
                site_id: self.site_id.clone(),
                serials: self.batteries.clone(),
            },
            TimeWindow::lookback_at(now, self.timezone, lookback_minutes)?,
        )))
    }

    /// Store a successful refresh; returns whether any device channel changed
    pub fn apply_success(&mut self, now: DateTime<Utc>, readings: ReadingSet) -> bool {
        let changed = readings.differs_from(&self.readings);
        self.readings = readings;
        self.last_fetch = Some(now);
        self.gate.record_success(now, changed);
        self.stamp_elapsed(now);
        changed
    }

    /// Failure fallback for the cycle; the gate is left alone so the entity
    /// stays due
    pub fn apply_failure(&mut self, now: DateTime<Utc>) {
        self.readings = self.readings.zeroed();
        self.stamp_elapsed(now);
    }

    /// Exclude from further single-phase mapping; cached readings stay
    pub fn mark_unsupported(&mut self) {
        self.unsupported = true;
    }

    /// Refresh the minutes-since-change channel for kinds that carry it
    pub fn stamp_elapsed(&mut self, now: DateTime<Utc>) {
        let minutes = self.gate.elapsed_minutes(now).unwrap_or(0.0);
        self.readings.set(Channel::MinutesSinceChange, minutes);
    }
}
