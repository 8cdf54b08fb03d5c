use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Which side of the conversation a message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Sent,      // Accepted by the write endpoint
    Delivered, // Delivered to the recipient's device
    Read,      // Read by recipient
    Failed,    // Failed to send
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
            DeliveryStatus::Failed => "failed",
        }
    }
}

/// A canonical message, either converted from the read endpoint or
/// synthesized locally after a successful send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub conversation_key: String,
    pub timestamp: DateTime<Utc>,
    pub body: String,
    pub direction: Direction,
    pub id: Option<String>,
    pub status: Option<DeliveryStatus>,
}

impl Message {
    /// Sortable string form of the timestamp
    pub fn canonical_timestamp(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// The identifier, if it is usable for deduplication
    pub fn dedup_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Per-counterparty summary derived from the store on every query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub key: String,
    pub display_name: String,
    pub last_message: String,
    pub timestamp: DateTime<Utc>,
    pub unread: bool,
    pub message_count: usize,
}

/// Derive the grouping key from the counterparty address
pub fn conversation_key(address: &str) -> String {
    address.trim().to_string()
}

/// Derive a display name for a conversation key
pub fn display_name(key: &str) -> String {
    if key.is_empty() {
        "Unknown".to_string()
    } else {
        key.to_string()
    }
}
