//! Site discovery
//!
//! Walks `/sites/list` and each site's inventory and registers the entities
//! to poll. Running it again only adds what is new.

use crate::api::types::{InventoryEnvelope, SitesEnvelope, decode};
use crate::api::{ApiRequest, Resource};
use crate::config::Config;
use crate::entity::{EntityKind, MonitoredEntity, site_address};
use crate::error::{FetchError, Result, SolarPollError};
use crate::logging::get_logger;
use crate::reconciler::Reconciler;
use crate::window::{TimeWindow, parse_timezone};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Single-phase inverter families whose telemetry carries an `L1Data` block
pub const SINGLE_PHASE_MODELS: &[&str] = &[
    "SE3000", "SE3000A", "SE3800", "SE3800A", "SE3800H", "SE5000", "SE6000", "SE6000H", "SE7600",
    "SE7600A", "SE10000", "SE11400", "SE5000H", "SE7600H", "SE10000H", "SE10000A",
];

pub fn is_single_phase(model_family: &str) -> bool {
    SINGLE_PHASE_MODELS.contains(&model_family)
}

/// Site name as handed to the host: ASCII letters, digits and spaces only
pub fn site_display_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect()
}

/// What a discovery run found and added
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub sites: usize,
    pub added: usize,
    pub unsupported_models: Vec<String>,
}

/// Discover every site on the account and register its entities
pub async fn discover(
    reconciler: &mut Reconciler,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<DiscoveryReport> {
    let logger = get_logger("discovery");
    let api = std::sync::Arc::clone(reconciler.api());
    let threshold = config.rate_limit_minutes;
    let mut report = DiscoveryReport::default();

    logger.info("Discovering SolarEdge sites and equipment");
    let payload = api
        .fetch(&ApiRequest::plain(Resource::SitesList))
        .await?;
    let sites: SitesEnvelope =
        decode(&payload).map_err(|e| SolarPollError::from(FetchError::malformed(e)))?;
    if sites.sites.site.is_empty() {
        logger.warn("No sites found");
        return Ok(report);
    }

    for site in &sites.sites.site {
        let site_id = site.id.to_string();
        let name = site_display_name(&site.name);
        let site_logger = logger.for_entity(&site_id, &site_address(&site_id));
        let timezone = site_timezone(config, &site_id, site.location.time_zone.as_deref())?;
        site_logger.info(&format!(
            "Found {} site '{}', TZ {}",
            site.status,
            name,
            timezone.name()
        ));
        report.sites += 1;

        if reconciler
            .register(MonitoredEntity::site(&site_id, &name, timezone, threshold))
            .await?
        {
            report.added += 1;
        }

        let window = TimeWindow::lookback_at(now, timezone, config.lookback_minutes)?;
        let payload = api
            .fetch(&ApiRequest::windowed(
                Resource::Inventory {
                    site_id: site_id.clone(),
                },
                window,
            ))
            .await?;
        let inventory = decode::<InventoryEnvelope>(&payload)
            .map_err(|e| SolarPollError::from(FetchError::malformed(e)))?
            .inventory;
        site_logger.info(&format!(
            "Inventory: {} meters, {} sensors, {} gateways, {} batteries, {} inverters",
            inventory.meters.len(),
            inventory.sensors.len(),
            inventory.gateways.len(),
            inventory.batteries.len(),
            inventory.inverters.len()
        ));

        for inverter in &inventory.inverters {
            if !is_single_phase(inverter.model_family()) {
                site_logger.error(&format!(
                    "Model {} ({}) is not yet supported",
                    inverter.model, inverter.serial
                ));
                report.unsupported_models.push(inverter.model.clone());
                continue;
            }
            let entity = MonitoredEntity::inverter(
                &site_id,
                &inverter.serial,
                &inverter.name,
                timezone,
                threshold,
            );
            if reconciler.register(entity).await? {
                report.added += 1;
            }
        }

        for battery in &inventory.batteries {
            let entity = MonitoredEntity::battery(
                &site_id,
                &battery.serial,
                &battery.name,
                timezone,
                battery.nameplate_capacity,
                threshold,
            );
            if reconciler.register(entity).await? {
                report.added += 1;
            }
            reconciler.attach_battery(&site_address(&site_id), &battery.serial);
        }

        for kind in [
            EntityKind::EnergyWindow,
            EntityKind::EnergyDay,
            EntityKind::Overview,
        ] {
            let entity = MonitoredEntity::aggregate(kind, &site_id, timezone, threshold);
            if reconciler.register(entity).await? {
                report.added += 1;
            }
        }
    }

    logger.info(&format!(
        "Discovery complete: {} sites, {} new entities",
        report.sites, report.added
    ));
    Ok(report)
}

/// Configured override first, then the zone the site list reports
fn site_timezone(config: &Config, site_id: &str, reported: Option<&str>) -> Result<Tz> {
    if let Some(tz) = config.timezone_override(site_id)? {
        return Ok(tz);
    }
    match reported {
        Some(name) => parse_timezone(name),
        None => Err(SolarPollError::config(format!(
            "Site {} reports no timezone; set timezone_by_site",
            site_id
        ))),
    }
}
