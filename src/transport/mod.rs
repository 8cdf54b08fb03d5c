// Message transport for smsdeck
// The two network operations against the configured read and write endpoints

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod http;
pub mod wire;

pub use http::{Endpoints, HttpTransport, REQUEST_TIMEOUT};
pub use wire::{PhoneNumber, RawMessage, SendRequest, WireDirection};

/// Errors that can occur talking to the message endpoints
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// Endpoint URL is unset or blank; raised before any network call
    #[error("{0} endpoint is not configured")]
    Config(String),

    /// The request did not complete within the per-request timeout
    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Connection, DNS or TLS failure
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response, with a best-effort copy of the body
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// The read endpoint answered with something other than an array
    #[error("Unexpected response format: {0}")]
    Format(String),
}

impl TransportError {
    /// Whether the poller should schedule a backoff retry for this failure
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Config(_))
    }
}

/// The read/write operations the rest of the crate needs from the network.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Fetch the full current message list from the read endpoint
    async fn fetch_all(&self) -> Result<Vec<RawMessage>, TransportError>;

    /// Post one outgoing message to the write endpoint
    async fn send_one(&self, to: &str, body: &str) -> Result<(), TransportError>;
}
