use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Value, json};
use solarpoll::api::{ApiRequest, MonitoringApi, Resource};
use solarpoll::error::{FetchError, SolarPollError};
use solarpoll::sink::MemorySink;
use solarpoll::{Channel, EntityKind, MonitoredEntity, Reconciler};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Scripted monitoring API keyed by resource path
#[derive(Default)]
struct FakeApi {
    responses: Mutex<HashMap<String, Result<Value, FetchError>>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl FakeApi {
    fn respond(&self, path: &str, body: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(path.to_string(), Ok(body));
    }

    fn fail(&self, path: &str, err: FetchError) {
        self.responses
            .lock()
            .unwrap()
            .insert(path.to_string(), Err(err));
    }

    fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.resource.path() == path)
            .count()
    }

    fn storage_serials(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| match &r.resource {
                Resource::StorageData { serials, .. } => Some(serials.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl MonitoringApi for FakeApi {
    async fn fetch(&self, request: &ApiRequest) -> Result<Value, FetchError> {
        self.calls.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .get(&request.resource.path())
            .cloned()
            .unwrap_or_else(|| Err(FetchError::BadStatus { code: 404 }))
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap()
}

fn power(production: f64) -> Value {
    json!({"powerDetails": {"meters": [
        {"type": "Production", "values": [{"value": production}]},
        {"type": "Consumption", "values": [{"value": 400.0}]}
    ]}})
}

fn storage() -> Value {
    json!({"storageData": {"batteryCount": 2, "batteries": [
        {"serialNumber": "BAT-1", "nameplate": 9800.0, "telemetryCount": 2, "telemetries": [
            {"timeStamp": "2024-06-01 10:55:00", "power": 100.0, "batteryPercentageState": 60.0},
            {"timeStamp": "2024-06-01 11:00:00", "power": 120.5, "batteryPercentageState": 61.04}
        ]},
        {"serialNumber": "BAT-2", "nameplate": 9800.0, "telemetryCount": 0, "telemetries": []}
    ]}})
}

async fn site_with_batteries(api: Arc<FakeApi>, sink: Arc<MemorySink>) -> Reconciler {
    let mut rec = Reconciler::new(api, sink, 60);
    let tz = chrono_tz::America::Los_Angeles;
    rec.register(MonitoredEntity::site("100", "Home", tz, 5.0))
        .await
        .unwrap();
    for serial in ["BAT-1", "BAT-2"] {
        rec.register(MonitoredEntity::battery("100", serial, serial, tz, Some(9800.0), 5.0))
            .await
            .unwrap();
        assert!(rec.attach_battery("100", serial));
    }
    rec
}

#[tokio::test]
async fn one_storage_fetch_per_due_tick_regardless_of_battery_count() {
    let api = Arc::new(FakeApi::default());
    api.respond("/site/100/powerDetails", power(1000.0));
    api.respond("/site/100/storageData", storage());
    let sink = Arc::new(MemorySink::new());
    let mut rec = site_with_batteries(api.clone(), sink.clone()).await;

    let report = rec.tick(t0()).await;
    assert_eq!(report.due, 1);
    assert_eq!(report.storage_fetches, 1);
    assert_eq!(report.batteries_updated, 1);
    assert_eq!(api.calls_to("/site/100/storageData"), 1);
    assert_eq!(api.storage_serials(), vec![vec!["BAT-1".to_string(), "BAT-2".to_string()]]);

    let bat1 = rec.entity("bat1").unwrap().readings();
    assert_eq!(bat1.value(Channel::BatteryPower), 120.5);
    assert_eq!(bat1.value(Channel::BatteryLevel), 61.0);
    assert_eq!(bat1.value(Channel::NameplateCapacity), 9800.0);

    // Zero-sample battery stays at its seeded state
    let bat2 = rec.entity("bat2").unwrap().readings();
    assert_eq!(bat2.value(Channel::BatteryPower), 0.0);
    assert!(!bat2.is_present(Channel::BatteryPower));
    assert_eq!(bat2.value(Channel::NameplateCapacity), 9800.0);

    // Everything is published, batteries included
    assert_eq!(report.published, 3);
    assert!(sink.latest("bat1").is_some());
}

#[tokio::test]
async fn site_not_due_skips_network_but_republishes() {
    let api = Arc::new(FakeApi::default());
    api.respond("/site/100/powerDetails", power(1000.0));
    api.respond("/site/100/storageData", storage());
    let sink = Arc::new(MemorySink::new());
    let mut rec = site_with_batteries(api.clone(), sink.clone()).await;

    rec.tick(t0()).await;
    let report = rec.tick(t0() + Duration::minutes(2)).await;
    assert_eq!(report.due, 0);
    assert_eq!(report.published, 3);
    assert_eq!(api.calls_to("/site/100/powerDetails"), 1);
    assert_eq!(api.calls_to("/site/100/storageData"), 1);
    assert_eq!(sink.publish_count(), 6);
    assert_eq!(
        sink.latest("100").unwrap().value(Channel::MinutesSinceChange),
        2.0
    );
}

#[tokio::test]
async fn gate_follows_changes_not_fetches() {
    let api = Arc::new(FakeApi::default());
    api.respond("/site/100/powerDetails", power(1000.0));
    let sink = Arc::new(MemorySink::new());
    let mut rec = Reconciler::new(api.clone(), sink, 60);
    rec.register(MonitoredEntity::site("100", "Home", chrono_tz::UTC, 5.0))
        .await
        .unwrap();

    rec.tick(t0()).await;
    // Unchanged values at +6: anchor stays at t0, still due at +7
    let report = rec.tick(t0() + Duration::minutes(6)).await;
    assert_eq!((report.fetched, report.changed), (1, 0));
    assert_eq!(rec.entity("100").unwrap().gate().last_change(), Some(t0()));
    assert_eq!(rec.tick(t0() + Duration::minutes(7)).await.due, 1);

    // A change at +8 moves the anchor; +10 is then not due
    api.respond("/site/100/powerDetails", power(1500.0));
    let report = rec.tick(t0() + Duration::minutes(8)).await;
    assert_eq!(report.changed, 1);
    assert_eq!(rec.tick(t0() + Duration::minutes(10)).await.due, 0);
    assert_eq!(api.calls_to("/site/100/powerDetails"), 4);
}

#[tokio::test]
async fn fetch_failures_zero_readings_and_stay_due() {
    let api = Arc::new(FakeApi::default());
    api.respond("/site/100/powerDetails", power(1000.0));
    api.respond("/site/100/storageData", storage());
    let sink = Arc::new(MemorySink::new());
    let mut rec = site_with_batteries(api.clone(), sink).await;
    rec.tick(t0()).await;

    api.fail("/site/100/powerDetails", FetchError::unreachable("connection reset"));
    api.fail("/site/100/storageData", FetchError::BadStatus { code: 429 });
    let later = t0() + Duration::minutes(6);
    let report = rec.tick(later).await;
    assert_eq!(report.failed, 1);

    let site = rec.entity("100").unwrap();
    assert_eq!(site.readings().value(Channel::Production), 0.0);
    assert_eq!(site.gate().last_change(), Some(t0()));
    assert!(site.needs_fetch(later + Duration::seconds(1)));

    let bat1 = rec.entity("bat1").unwrap().readings();
    assert_eq!(bat1.value(Channel::BatteryLevel), 0.0);
    assert_eq!(bat1.value(Channel::NameplateCapacity), 9800.0);
}

#[tokio::test]
async fn unsupported_inverter_keeps_cache_and_is_excluded() {
    let api = Arc::new(FakeApi::default());
    api.respond(
        "/equipment/100/7E1234-56/data",
        json!({"data": {"count": 1, "telemetries": [{"inverterMode": "MPPT", "temperature": 35.0}]}}),
    );
    let sink = Arc::new(MemorySink::new());
    let mut rec = Reconciler::new(api.clone(), sink, 60);
    rec.register(MonitoredEntity::inverter(
        "100",
        "7E1234-56",
        "Inverter 1",
        chrono_tz::UTC,
        5.0,
    ))
    .await
    .unwrap();

    let before = rec.entity("7e123456").unwrap().readings().clone();
    let err = rec.refresh("7e123456", t0()).await.unwrap_err();
    assert!(matches!(err, SolarPollError::UnsupportedDevice { ref serial } if serial == "7E1234-56"));
    let inv = rec.entity("7e123456").unwrap();
    assert!(inv.is_unsupported());
    assert_eq!(inv.readings(), &before);

    // Asking again stays an error without touching the network
    let err = rec
        .refresh("7e123456", t0() + Duration::minutes(30))
        .await
        .unwrap_err();
    assert!(matches!(err, SolarPollError::UnsupportedDevice { ref serial } if serial == "7E1234-56"));
    assert_eq!(rec.entity("7e123456").unwrap().readings(), &before);
    assert_eq!(api.calls_to("/equipment/100/7E1234-56/data"), 1);

    // Later ticks publish it without fetching
    let report = rec.tick(t0() + Duration::minutes(30)).await;
    assert_eq!(report.due, 0);
    assert_eq!(report.published, 1);
    assert_eq!(api.calls_to("/equipment/100/7E1234-56/data"), 1);
}

#[tokio::test]
async fn one_entity_failing_does_not_block_others() {
    let api = Arc::new(FakeApi::default());
    api.respond(
        "/site/100/overview",
        json!({"overview": {"lifeTimeData": {"energy": 2500000.0}, "currentPower": {"power": 812.0}}}),
    );
    api.fail("/site/100/energyDetails", FetchError::malformed("truncated"));
    let sink = Arc::new(MemorySink::new());
    let mut rec = Reconciler::new(api, sink.clone(), 60);
    for kind in [EntityKind::Overview, EntityKind::EnergyDay, EntityKind::EnergyWindow] {
        rec.register(MonitoredEntity::aggregate(kind, "100", chrono_tz::UTC, 5.0))
            .await
            .unwrap();
    }

    let report = rec.tick(t0()).await;
    assert_eq!(report.due, 3);
    assert_eq!(report.fetched, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(report.published, 3);
    let ov = sink.latest("ov100").unwrap();
    assert_eq!(ov.value(Channel::LifetimeEnergy), 2500.0);
    assert_eq!(ov.value(Channel::CurrentPower), 812.0);
}
