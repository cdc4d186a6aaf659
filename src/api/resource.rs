use crate::window::TimeWindow;
use std::fmt;

/// Bucket size for energy endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    QuarterOfAnHour,
    Day,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuarterOfAnHour => "QUARTER_OF_AN_HOUR",
            Self::Day => "DAY",
        }
    }
}

/// Remote resource paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    SitesList,
    Inventory { site_id: String },
    PowerDetails { site_id: String },
    EnergyDetails { site_id: String, time_unit: TimeUnit },
    StorageData { site_id: String, serials: Vec<String> },
    Overview { site_id: String },
    EquipmentData { site_id: String, serial: String },
}

impl Resource {
    pub fn path(&self) -> String {
        match self {
            Self::SitesList => "/sites/list".to_string(),
            Self::Inventory { site_id } => format!("/site/{}/inventory", site_id),
            Self::PowerDetails { site_id } => format!("/site/{}/powerDetails", site_id),
            Self::EnergyDetails { site_id, .. } => format!("/site/{}/energyDetails", site_id),
            Self::StorageData { site_id, .. } => format!("/site/{}/storageData", site_id),
            Self::Overview { site_id } => format!("/site/{}/overview", site_id),
            Self::EquipmentData { site_id, serial } => {
                format!("/equipment/{}/{}/data", site_id, serial)
            }
        }
    }

    /// Query parameters specific to the resource, placed before the window
    fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::EnergyDetails { time_unit, .. } => {
                vec![("timeUnit", time_unit.as_str().to_string())]
            }
            Self::StorageData { serials, .. } => vec![("serials", serials.join(","))],
            _ => Vec::new(),
        }
    }
}

/// One logical "fetch resource R for window W"
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub resource: Resource,
    pub window: Option<TimeWindow>,
}

impl ApiRequest {
    pub fn windowed(resource: Resource, window: TimeWindow) -> Self {
        Self {
            resource,
            window: Some(window),
        }
    }

    pub fn plain(resource: Resource) -> Self {
        Self {
            resource,
            window: None,
        }
    }

    /// Query string without the leading `?`
    pub fn query(&self, api_key: &str) -> String {
        let mut params = self.resource.params();
        if let Some(window) = &self.window {
            params.push(("startTime", window.start_param()));
            params.push(("endTime", window.end_param()));
        }
        params.push(("api_key", api_key.to_string()));
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Full request URL against `base_url`
    pub fn url(&self, base_url: &str, api_key: &str) -> String {
        format!(
            "{}{}?{}",
            base_url.trim_end_matches('/'),
            self.resource.path(),
            self.query(api_key)
        )
    }
}

/// Log-safe rendering, never includes the key
impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource.path())?;
        if let Some(window) = &self.window {
            write!(f, " {}", window)?;
        }
        Ok(())
    }
}
