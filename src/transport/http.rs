// HTTP implementation of the message transport

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info};
use reqwest::{Client, StatusCode};
use std::sync::RwLock;
use std::time::Duration;

use super::{wire, MessageTransport, RawMessage, TransportError};

/// Per-request timeout for both endpoints
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// Longest error body carried in an `Http` error
const MAX_ERROR_BODY: usize = 512;

/// Endpoint URLs, owned by the settings layer. Either may be blank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Endpoints {
    pub read_url: String,
    pub write_url: String,
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: Client,
    endpoints: RwLock<Endpoints>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(endpoints: Endpoints) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoints: RwLock::new(endpoints),
            timeout: REQUEST_TIMEOUT,
        })
    }

    /// Override the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoints(&self) -> Endpoints {
        self.endpoints
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Swap in new endpoint URLs; later requests use them
    pub fn set_endpoints(&self, endpoints: Endpoints) {
        info!("Updating endpoints: read='{}' write='{}'", endpoints.read_url, endpoints.write_url);
        *self
            .endpoints
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = endpoints;
    }

    fn read_url(&self) -> Result<String, TransportError> {
        let url = self.endpoints().read_url.trim().to_string();
        if url.is_empty() {
            return Err(TransportError::Config("Read".to_string()));
        }
        Ok(url)
    }

    fn write_url(&self) -> Result<String, TransportError> {
        let url = self.endpoints().write_url.trim().to_string();
        if url.is_empty() {
            return Err(TransportError::Config("Write".to_string()));
        }
        Ok(url)
    }

    /// Run a request future under the per-request timeout and collect status and body
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(StatusCode, String), TransportError> {
        let timeout = self.timeout;
        let exchange = async {
            let response = request.send().await.map_err(|e| classify(e, timeout))?;
            let status = response.status();
            let body = if status.is_success() {
                response.text().await.map_err(|e| classify(e, timeout))?
            } else {
                // Best effort only; the status is what matters
                response.text().await.unwrap_or_default()
            };
            Ok::<_, TransportError>((status, body))
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }
}

#[async_trait]
impl MessageTransport for HttpTransport {
    async fn fetch_all(&self) -> Result<Vec<RawMessage>, TransportError> {
        let url = self.read_url()?;
        debug!("Fetching messages from {}", url);

        let (status, body) = self.execute(self.client.get(&url)).await?;
        if !status.is_success() {
            error!("Read endpoint returned HTTP {}", status.as_u16());
            return Err(http_error(status, body));
        }

        wire::parse_batch(&body)
    }

    async fn send_one(&self, to: &str, body: &str) -> Result<(), TransportError> {
        let url = self.write_url()?;
        let payload = wire::SendRequest::new(to, body, Utc::now());
        debug!("Posting message for {} to {}", to, url);

        let (status, response_body) = self.execute(self.client.post(&url).json(&payload)).await?;
        if !status.is_success() {
            error!("Write endpoint returned HTTP {}", status.as_u16());
            return Err(http_error(status, response_body));
        }

        info!("Message to {} accepted (HTTP {})", to, status.as_u16());
        Ok(())
    }
}

fn classify(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        TransportError::Network(e.to_string())
    }
}

fn http_error(status: StatusCode, body: String) -> TransportError {
    let body = if body.chars().count() > MAX_ERROR_BODY {
        body.chars().take(MAX_ERROR_BODY).collect()
    } else {
        body
    };
    TransportError::Http {
        status: status.as_u16(),
        body,
    }
}
