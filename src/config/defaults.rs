use super::*;

/// Default rate limit when none is configured
pub const DEFAULT_RATE_LIMIT_MINUTES: f64 = 5.0;

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://monitoringapi.solaredge.com".to_string(),
            request_timeout_secs: 10,
            connect_timeout_secs: 5,
            user_agent: format!("solarpoll/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/solarpoll.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            rate_limit_minutes: DEFAULT_RATE_LIMIT_MINUTES,
            poll_interval_secs: 60,
            lookback_minutes: 60,
            timezone_by_site: HashMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}
