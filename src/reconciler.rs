//! Entity reconciler
//!
//! One call to [`Reconciler::tick`] is one scheduling pass: due entities are
//! refreshed concurrently, each in its own task owning the entity by value,
//! site storage batches are fanned out to batteries once their site task has
//! joined, and every entity is published.

use crate::api::MonitoringApi;
use crate::api::types::BatteryStorage;
use crate::entity::{EntityKind, MonitoredEntity};
use crate::error::{FetchError, Result, SolarPollError};
use crate::logging::{StructuredLogger, get_logger};
use crate::normalize::{NormalizeError, ReadingSet, apply_battery, normalize, storage_batteries};
use crate::sink::TelemetrySink;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Result of one entity's refresh step
#[derive(Debug)]
pub enum RefreshOutcome {
    /// Fetched and normalized
    Updated { changed: bool },
    /// Fetch or body failure; readings were zeroed for the cycle
    Failed(SolarPollError),
    /// Payload lacks the single-phase block; the entity is now excluded
    Unsupported(SolarPollError),
}

type StorageResult = std::result::Result<Vec<BatteryStorage>, FetchError>;

struct RefreshTask {
    entity: MonitoredEntity,
    outcome: RefreshOutcome,
    storage: Option<StorageResult>,
}

/// Per-tick counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub entities: usize,
    pub due: usize,
    pub skipped: usize,
    pub fetched: usize,
    pub changed: usize,
    pub failed: usize,
    pub unsupported: usize,
    pub storage_fetches: usize,
    pub batteries_updated: usize,
    pub published: usize,
    pub publish_failures: usize,
}

impl TickReport {
    fn record(&mut self, outcome: &RefreshOutcome) {
        match outcome {
            RefreshOutcome::Updated { changed } => {
                self.fetched += 1;
                if *changed {
                    self.changed += 1;
                }
            }
            RefreshOutcome::Failed(_) => self.failed += 1,
            RefreshOutcome::Unsupported(_) => self.unsupported += 1,
        }
    }
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entities={} due={} skipped={} fetched={} changed={} failed={} unsupported={} \
             storage_fetches={} batteries_updated={} published={}",
            self.entities,
            self.due,
            self.skipped,
            self.fetched,
            self.changed,
            self.failed,
            self.unsupported,
            self.storage_fetches,
            self.batteries_updated,
            self.published
        )
    }
}

/// Refresh a single entity's own readings. Never fails the caller: every
/// error is folded into the outcome and the entity's state.
pub async fn refresh_entity(
    api: &dyn MonitoringApi,
    entity: &mut MonitoredEntity,
    now: DateTime<Utc>,
    lookback_minutes: i64,
) -> RefreshOutcome {
    let logger = get_logger("reconciler").for_entity(entity.site_id(), entity.address());

    let request = match entity.refresh_request(now, lookback_minutes) {
        Ok(request) => request,
        Err(e) => {
            logger.error(&format!("Cannot build request: {}", e));
            entity.apply_failure(now);
            return RefreshOutcome::Failed(e);
        }
    };

    let payload = match api.fetch(&request).await {
        Ok(payload) => payload,
        Err(e) => {
            logger.warn(&format!("Fetch failed ({}): {}", e.kind(), e));
            entity.apply_failure(now);
            return RefreshOutcome::Failed(e.into());
        }
    };

    match normalize(entity.kind(), &payload, entity.readings()) {
        Ok(readings) => {
            let changed = entity.apply_success(now, readings);
            logger.debug(&format!(
                "{} ({})",
                entity.readings().summary(),
                if changed { "changed" } else { "unchanged" }
            ));
            RefreshOutcome::Updated { changed }
        }
        Err(NormalizeError::UnsupportedDevice) => {
            let err =
                NormalizeError::UnsupportedDevice.into_error(entity.serial().unwrap_or(entity.address()));
            logger.error(&format!("{}; excluding from further polling", err));
            entity.mark_unsupported();
            RefreshOutcome::Unsupported(err)
        }
        Err(e) => {
            let err = e.into_error(entity.address());
            logger.warn(&err.to_string());
            entity.apply_failure(now);
            RefreshOutcome::Failed(err)
        }
    }
}

/// The site's batched storage fetch, `None` when the site has no batteries
async fn fetch_storage(
    api: &dyn MonitoringApi,
    site: &MonitoredEntity,
    now: DateTime<Utc>,
    lookback_minutes: i64,
) -> Option<StorageResult> {
    let request = match site.storage_request(now, lookback_minutes) {
        Ok(request) => request?,
        Err(e) => return Some(Err(FetchError::malformed(e.to_string()))),
    };
    let result = match api.fetch(&request).await {
        Ok(payload) => storage_batteries(&payload).map_err(|e| FetchError::malformed(e.to_string())),
        Err(e) => Err(e),
    };
    Some(result)
}

/// Owns every monitored entity and drives their refreshes
pub struct Reconciler {
    api: Arc<dyn MonitoringApi>,
    sink: Arc<dyn TelemetrySink>,
    entities: BTreeMap<String, MonitoredEntity>,
    lookback_minutes: i64,
    logger: StructuredLogger,
}

impl Reconciler {
    pub fn new(
        api: Arc<dyn MonitoringApi>,
        sink: Arc<dyn TelemetrySink>,
        lookback_minutes: i64,
    ) -> Self {
        Self {
            api,
            sink,
            entities: BTreeMap::new(),
            lookback_minutes,
            logger: get_logger("reconciler"),
        }
    }

    pub fn api(&self) -> &Arc<dyn MonitoringApi> {
        &self.api
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entities.contains_key(address)
    }

    pub fn entity(&self, address: &str) -> Option<&MonitoredEntity> {
        self.entities.get(address)
    }

    pub fn entities(&self) -> impl Iterator<Item = &MonitoredEntity> {
        self.entities.values()
    }

    /// Register an entity with the sink and start tracking it once the sink
    /// has acknowledged. Returns false for an address already tracked.
    pub async fn register(&mut self, entity: MonitoredEntity) -> Result<bool> {
        if self.entities.contains_key(entity.address()) {
            return Ok(false);
        }
        self.sink.register(&entity.descriptor()).await?;
        self.logger
            .for_entity(entity.site_id(), entity.address())
            .info(&format!("Tracking {} '{}'", entity.kind(), entity.name()));
        self.entities.insert(entity.address().to_string(), entity);
        Ok(true)
    }

    /// Add a battery serial to a tracked site's storage batch
    pub fn attach_battery(&mut self, site_address: &str, serial: &str) -> bool {
        self.entities
            .get_mut(site_address)
            .is_some_and(|site| site.attach_battery(serial))
    }

    /// Refresh one entity outside the regular tick. A due site also runs its
    /// storage batch. Returns the readings after the refresh; an excluded
    /// device surfaces as `UnsupportedDevice` with its readings left as they
    /// were.
    pub async fn refresh(&mut self, address: &str, now: DateTime<Utc>) -> Result<ReadingSet> {
        let Some(mut entity) = self.entities.remove(address) else {
            return Err(SolarPollError::generic(format!("unknown entity {}", address)));
        };
        if entity.is_unsupported() {
            let err = SolarPollError::unsupported_device(entity.serial().unwrap_or(address));
            self.entities.insert(address.to_string(), entity);
            return Err(err);
        }
        if !entity.needs_fetch(now) {
            let readings = entity.readings().clone();
            self.entities.insert(address.to_string(), entity);
            return Ok(readings);
        }

        let api = Arc::clone(&self.api);
        let outcome = refresh_entity(api.as_ref(), &mut entity, now, self.lookback_minutes).await;
        let storage = fetch_storage(api.as_ref(), &entity, now, self.lookback_minutes).await;
        let site_id = entity.site_id().to_string();
        let readings = entity.readings().clone();
        self.entities.insert(address.to_string(), entity);

        if let Some(result) = storage {
            let mut report = TickReport::default();
            self.apply_storage(&site_id, result, now, &mut report);
        }

        match outcome {
            RefreshOutcome::Updated { .. } => Ok(readings),
            RefreshOutcome::Failed(e) | RefreshOutcome::Unsupported(e) => Err(e),
        }
    }

    /// One scheduling pass across all entities
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport {
            entities: self.entities.len(),
            ..TickReport::default()
        };

        let due: Vec<String> = self
            .entities
            .values()
            .filter(|e| e.needs_fetch(now))
            .map(|e| e.address().to_string())
            .collect();
        report.due = due.len();
        report.skipped = report.entities - report.due;

        let mut in_flight: BTreeMap<String, MonitoredEntity> = BTreeMap::new();
        let mut tasks = JoinSet::new();
        for address in due {
            let Some(mut entity) = self.entities.remove(&address) else {
                continue;
            };
            in_flight.insert(address, entity.clone());
            let api = Arc::clone(&self.api);
            let lookback = self.lookback_minutes;
            tasks.spawn(async move {
                let outcome = refresh_entity(api.as_ref(), &mut entity, now, lookback).await;
                let storage = if entity.kind() == EntityKind::Site {
                    fetch_storage(api.as_ref(), &entity, now, lookback).await
                } else {
                    None
                };
                RefreshTask {
                    entity,
                    outcome,
                    storage,
                }
            });
        }

        let mut storage_results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(task) => {
                    report.record(&task.outcome);
                    if let Some(result) = task.storage {
                        report.storage_fetches += 1;
                        storage_results.push((task.entity.site_id().to_string(), result));
                    }
                    in_flight.remove(task.entity.address());
                    self.entities
                        .insert(task.entity.address().to_string(), task.entity);
                }
                Err(e) => {
                    self.logger.error(&format!("Refresh task aborted: {}", e));
                    report.failed += 1;
                }
            }
        }
        // An aborted task leaves its entity as it was before the tick
        self.entities.extend(in_flight);

        // Sites have joined; their batteries can be updated now
        for (site_id, result) in storage_results {
            self.apply_storage(&site_id, result, now, &mut report);
        }

        self.publish_all(now, &mut report).await;
        report
    }

    fn apply_storage(
        &mut self,
        site_id: &str,
        result: StorageResult,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        let batteries = self
            .entities
            .values_mut()
            .filter(|e| e.kind() == EntityKind::Battery && e.site_id() == site_id);

        match result {
            Ok(blocks) => {
                for battery in batteries {
                    let Some(block) = blocks
                        .iter()
                        .find(|b| Some(b.serial_number.as_str()) == battery.serial())
                    else {
                        continue;
                    };
                    match apply_battery(block, battery.readings()) {
                        Some(readings) => {
                            battery.apply_success(now, readings);
                            report.batteries_updated += 1;
                        }
                        None => self
                            .logger
                            .for_entity(site_id, battery.address())
                            .debug("No battery telemetry in window"),
                    }
                }
            }
            Err(e) => {
                self.logger
                    .for_entity(site_id, site_id)
                    .warn(&format!("Storage fetch failed ({}): {}", e.kind(), e));
                for battery in batteries {
                    battery.apply_failure(now);
                }
            }
        }
    }

    async fn publish_all(&mut self, now: DateTime<Utc>, report: &mut TickReport) {
        let sink = Arc::clone(&self.sink);
        for entity in self.entities.values_mut() {
            entity.stamp_elapsed(now);
            match sink.publish(entity.address(), entity.readings()).await {
                Ok(()) => report.published += 1,
                Err(e) => {
                    report.publish_failures += 1;
                    self.logger
                        .for_entity(entity.site_id(), entity.address())
                        .warn(&format!("Publish failed: {}", e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiRequest;
    use crate::sink::MemorySink;
    use chrono::TimeZone;
    use serde_json::{Value, json};

    struct Scripted(Value);

    #[async_trait::async_trait]
    impl MonitoringApi for Scripted {
        async fn fetch(&self, _request: &ApiRequest) -> std::result::Result<Value, FetchError> {
            Ok(self.0.clone())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn refresh_entity_reports_change() {
        let api = Scripted(json!({"powerDetails": {"meters": [
            {"type": "Production", "values": [{"value": 1500.0}]}
        ]}}));
        let mut site = MonitoredEntity::site("1", "Home", chrono_tz::UTC, 5.0);
        let outcome = refresh_entity(&api, &mut site, now(), 60).await;
        assert!(matches!(outcome, RefreshOutcome::Updated { changed: true }));
        let outcome = refresh_entity(&api, &mut site, now(), 60).await;
        assert!(matches!(outcome, RefreshOutcome::Updated { changed: false }));
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let sink = Arc::new(MemorySink::new());
        let mut rec = Reconciler::new(Arc::new(Scripted(json!({}))), sink.clone(), 60);
        let site = MonitoredEntity::site("1", "Home", chrono_tz::UTC, 5.0);
        assert!(rec.register(site.clone()).await.unwrap());
        assert!(!rec.register(site).await.unwrap());
        assert_eq!(sink.registered().len(), 1);
    }

    #[tokio::test]
    async fn malformed_body_zeroes_and_counts_failure() {
        let sink = Arc::new(MemorySink::new());
        let mut rec = Reconciler::new(Arc::new(Scripted(json!({"nope": 1}))), sink.clone(), 60);
        rec.register(MonitoredEntity::site("1", "Home", chrono_tz::UTC, 5.0))
            .await
            .unwrap();
        let report = rec.tick(now()).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.published, 1);
        assert!(rec.entity("1").unwrap().gate().never_polled());
    }

    #[test]
    fn report_display() {
        let r = TickReport {
            entities: 3,
            due: 2,
            ..TickReport::default()
        };
        assert!(r.to_string().starts_with("entities=3 due=2"));
    }
}
