//! SolarEdge monitoring API access
//!
//! `resource` builds request paths and query strings, `client` performs them
//! over HTTP behind the [`MonitoringApi`] seam, and `types` holds the typed
//! views of the response bodies.

pub mod client;
pub mod resource;
pub mod types;

pub use client::{MonitoringApi, MonitoringClient};
pub use resource::{ApiRequest, Resource, TimeUnit};
