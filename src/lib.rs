// Re-export modules for the binary and the integration tests
pub mod conversations;
pub mod dispatcher;
pub mod inbox;
pub mod models;
pub mod poller;
pub mod settings;
pub mod store;
pub mod timestamp;
pub mod transport;

// Re-export main types for convenience
pub use dispatcher::NotificationDispatcher;
pub use inbox::Inbox;
pub use models::*;
pub use poller::{Poller, PollerState};
pub use store::MessageStore;
pub use transport::{HttpTransport, MessageTransport, TransportError};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_delivery_status_names() {
        assert_eq!(DeliveryStatus::Sent.as_str(), "sent");
        assert_eq!(DeliveryStatus::Delivered.as_str(), "delivered");
        assert_eq!(DeliveryStatus::Read.as_str(), "read");
        assert_eq!(DeliveryStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn test_message_dedup_id_and_canonical_timestamp() {
        let mut msg = Message {
            conversation_key: conversation_key("  555 "),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap(),
            body: "Hello, world!".to_string(),
            direction: Direction::Incoming,
            id: Some("msg123".to_string()),
            status: None,
        };

        assert_eq!(msg.conversation_key, "555");
        assert_eq!(msg.dedup_id(), Some("msg123"));
        assert_eq!(msg.canonical_timestamp(), "2024-01-01T02:00:00.000Z");

        msg.id = Some(String::new());
        assert_eq!(msg.dedup_id(), None);
        msg.id = None;
        assert_eq!(msg.dedup_id(), None);
    }
}
