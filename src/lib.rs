//! # SolarPoll - rate-limited SolarEdge monitoring poller
//!
//! Polls the SolarEdge monitoring API for sites, inverters, batteries and
//! aggregate energy views, and republishes normalized telemetry to a host
//! runtime through a [`sink::TelemetrySink`].
//!
//! ## Features
//!
//! - **Per-entity throttling**: each entity's cadence is anchored to the last
//!   time its readings actually changed
//! - **Typed readings**: fixed channel tables per entity kind with exact
//!   rounding and unit rules
//! - **Tolerant mapping**: missing meters, empty buckets and transient API
//!   failures degrade to cached or zero values, never to a crash
//! - **Batched storage polling**: one storage request per site feeds all of
//!   its batteries
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `window`: Query windows in site-local time
//! - `api`: Monitoring API requests, HTTP client and response types
//! - `gate`: Per-entity staleness gate
//! - `normalize`: Payload to reading-set mapping
//! - `entity`: Monitored entities and their state
//! - `reconciler`: Per-tick orchestration
//! - `discovery`: Site and inventory walk
//! - `sink`: Telemetry sink seam
//! - `poller`: Periodic driver

pub mod api;
pub mod config;
pub mod discovery;
pub mod entity;
pub mod error;
pub mod gate;
pub mod logging;
pub mod normalize;
pub mod poller;
pub mod reconciler;
pub mod sink;
pub mod window;


// Re-export commonly used types
pub use config::Config;
pub use entity::{EntityKind, MonitoredEntity};
pub use error::{FetchError, Result, SolarPollError};
pub use normalize::{Channel, ReadingSet};
pub use poller::Poller;
pub use reconciler::{Reconciler, TickReport};
