//! Telemetry sink
//!
//! The host side of the poller. Entities are registered once, and `register`
//! only resolves after the host has acknowledged the entity, so callers can
//! await it instead of polling for the entity to appear. Readings are pushed
//! with `publish` on every tick.

use crate::entity::EntityDescriptor;
use crate::error::{Result, SolarPollError};
use crate::logging::{StructuredLogger, get_logger};
use crate::normalize::ReadingSet;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[async_trait::async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Resolves once the host has created the entity
    async fn register(&self, entity: &EntityDescriptor) -> Result<()>;

    /// Push the current readings of an entity
    async fn publish(&self, address: &str, readings: &ReadingSet) -> Result<()>;
}

/// Sink that writes every publish to the log
pub struct LogSink {
    logger: StructuredLogger,
}

impl LogSink {
    pub fn new() -> Self {
        Self {
            logger: get_logger("sink"),
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TelemetrySink for LogSink {
    async fn register(&self, entity: &EntityDescriptor) -> Result<()> {
        self.logger
            .for_entity(&entity.site_id, &entity.address)
            .info(&format!("Registered {} '{}'", entity.kind, entity.name));
        Ok(())
    }

    async fn publish(&self, address: &str, readings: &ReadingSet) -> Result<()> {
        self.logger
            .info(&format!("{} [{}] {}", address, readings.kind(), readings.summary()));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    registered: Vec<EntityDescriptor>,
    latest: BTreeMap<String, ReadingSet>,
    publishes: usize,
}

/// In-process sink keeping the latest readings per address
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> Result<T> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| SolarPollError::sink("memory sink lock poisoned"))?;
        Ok(f(&mut guard))
    }

    /// Addresses in registration order
    pub fn registered(&self) -> Vec<String> {
        self.with_state(|s| s.registered.iter().map(|d| d.address.clone()).collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, address: &str) -> Option<ReadingSet> {
        self.with_state(|s| s.latest.get(address).cloned())
            .ok()
            .flatten()
    }

    pub fn publish_count(&self) -> usize {
        self.with_state(|s| s.publishes).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl TelemetrySink for MemorySink {
    async fn register(&self, entity: &EntityDescriptor) -> Result<()> {
        self.with_state(|s| {
            if !s.registered.iter().any(|d| d.address == entity.address) {
                s.registered.push(entity.clone());
            }
        })
    }

    async fn publish(&self, address: &str, readings: &ReadingSet) -> Result<()> {
        self.with_state(|s| {
            if !s.registered.iter().any(|d| d.address == address) {
                return Err(SolarPollError::sink(format!(
                    "publish for unregistered entity {}",
                    address
                )));
            }
            s.latest.insert(address.to_string(), readings.clone());
            s.publishes += 1;
            Ok(())
        })?
    }
}
