use super::resource::ApiRequest;
use crate::config::ApiConfig;
use crate::error::FetchError;
use crate::logging::{StructuredLogger, get_logger};
use reqwest::header::{ACCEPT, USER_AGENT};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;

/// Monitoring API seam
#[async_trait::async_trait]
pub trait MonitoringApi: Send + Sync {
    /// Fetch one resource; transport failures have already been retried once
    async fn fetch(&self, request: &ApiRequest) -> Result<Value, FetchError>;

    /// Release any held connection
    async fn close(&self) {}
}

/// HTTP client for the SolarEdge monitoring API
///
/// The underlying connection pool is created on first use, dropped after a
/// transport failure so the retry runs on a fresh connection, and released
/// by [`MonitoringClient::close`].
pub struct MonitoringClient {
    config: ApiConfig,
    http: Mutex<Option<reqwest::Client>>,
    logger: StructuredLogger,
}

impl MonitoringClient {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            http: Mutex::new(None),
            logger: get_logger("api"),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Whether a connection pool is currently held
    pub async fn is_connected(&self) -> bool {
        self.http.lock().await.is_some()
    }

    async fn client(&self) -> Result<reqwest::Client, FetchError> {
        let mut guard = self.http.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(self.config.connect_timeout_secs))
            .build()
            .map_err(|e| FetchError::unreachable(format!("client setup failed: {}", e)))?;
        *guard = Some(client.clone());
        Ok(client)
    }

    async fn drop_connection(&self) {
        *self.http.lock().await = None;
    }

    /// One attempt: status and body bytes. `Err(String)` is a transport
    /// failure, either on send or while reading the body; the text never
    /// includes the URL, which carries the key.
    async fn attempt(&self, url: &str) -> Result<(reqwest::StatusCode, Vec<u8>), String> {
        let client = self.client().await.map_err(|e| e.to_string())?;
        let resp = client
            .get(url)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, self.config.user_agent.as_str())
            .send()
            .await
            .map_err(|e| e.without_url().to_string())?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map(Vec::from)
            .map_err(|e| format!("reading body failed: {}", e.without_url()))?;
        Ok((status, body))
    }

    fn read_body(
        &self,
        request: &ApiRequest,
        status: reqwest::StatusCode,
        body: &[u8],
    ) -> Result<Value, FetchError> {
        if !status.is_success() {
            self.logger
                .warn(&format!("{} returned HTTP {}", request, status.as_u16()));
            return Err(FetchError::BadStatus {
                code: status.as_u16(),
            });
        }
        serde_json::from_slice::<Value>(body).map_err(|e| {
            self.logger
                .warn(&format!("{} returned unparseable body: {}", request, e));
            FetchError::malformed(e.to_string())
        })
    }
}

#[async_trait::async_trait]
impl MonitoringApi for MonitoringClient {
    async fn fetch(&self, request: &ApiRequest) -> Result<Value, FetchError> {
        let url = request.url(&self.config.base_url, &self.config.api_key);
        self.logger.debug(&format!("GET {}", request));

        let (status, body) = match self.attempt(&url).await {
            Ok(reply) => reply,
            Err(first) => {
                self.logger.warn(&format!(
                    "{} failed ({}), retrying on a fresh connection",
                    request, first
                ));
                self.drop_connection().await;
                match self.attempt(&url).await {
                    Ok(reply) => reply,
                    Err(second) => {
                        self.drop_connection().await;
                        return Err(FetchError::unreachable(second));
                    }
                }
            }
        };
        self.read_body(request, status, &body)
    }

    async fn close(&self) {
        if self.http.lock().await.take().is_some() {
            self.logger.info("Released monitoring API connection");
        }
    }
}
