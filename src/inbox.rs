// Inbox: the process-wide context object
// Ties the transport, the store and the dispatcher together; constructed once and shared by Arc

use chrono::Utc;
use log::{error, info};
use std::sync::Arc;
use uuid::Uuid;

use crate::conversations;
use crate::dispatcher::NotificationDispatcher;
use crate::models::{self, Conversation, DeliveryStatus, Direction, Message};
use crate::store::MessageStore;
use crate::transport::{MessageTransport, TransportError};

/// Prefix of identifiers given to locally sent messages
pub const LOCAL_ID_PREFIX: &str = "local-";

pub struct Inbox {
    transport: Arc<dyn MessageTransport>,
    store: Arc<MessageStore>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl Inbox {
    pub fn new(transport: Arc<dyn MessageTransport>) -> Self {
        Self::with_parts(
            transport,
            Arc::new(MessageStore::new()),
            Arc::new(NotificationDispatcher::new()),
        )
    }

    pub fn with_parts(
        transport: Arc<dyn MessageTransport>,
        store: Arc<MessageStore>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            transport,
            store,
            dispatcher,
        }
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    /// Run one fetch cycle.
    ///
    /// On success the snapshot is replaced and the genuinely new messages are
    /// dispatched (when there are any) and returned. On failure the error is
    /// dispatched and returned. Overlapping cycles are not sequenced: the last
    /// one to complete owns the snapshot.
    pub async fn refresh(&self) -> Result<Vec<Message>, TransportError> {
        let marker = self.store.marker();

        let raw = match self.transport.fetch_all().await {
            Ok(raw) => raw,
            Err(e) => {
                error!("Fetch failed: {}", e);
                self.dispatcher.dispatch_error(&e.to_string());
                return Err(e);
            }
        };

        let batch: Vec<Message> = raw.into_iter().map(|r| r.into_message()).collect();
        let fresh = self.store.replace_all_since(marker, batch);

        if !fresh.is_empty() {
            info!("{} new messages", fresh.len());
            self.dispatcher.dispatch_new_messages(&fresh);
        }
        Ok(fresh)
    }

    /// Send a message and append its optimistic copy to the store.
    ///
    /// The optimistic copy is never reconciled with server state; a later
    /// fetch may show the same message twice until it supersedes it.
    pub async fn send(&self, to: &str, body: &str) -> Result<Message, TransportError> {
        if let Err(e) = self.transport.send_one(to, body).await {
            error!("Send to {} failed: {}", to, e);
            self.dispatcher.dispatch_error(&e.to_string());
            return Err(e);
        }

        let message = Message {
            conversation_key: models::conversation_key(to),
            timestamp: Utc::now(),
            body: body.to_string(),
            direction: Direction::Outgoing,
            id: Some(format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4())),
            status: Some(DeliveryStatus::Sent),
        };
        self.store.append_optimistic(message.clone());
        Ok(message)
    }

    /// Conversation summaries for the current store contents, newest first
    pub fn conversations(&self) -> Vec<Conversation> {
        conversations::aggregate(&self.store.all())
    }

    /// Messages of one conversation, oldest first
    pub fn thread(&self, key: &str) -> Vec<Message> {
        self.store.query_by_conversation(key)
    }

    /// Clear history and seen identifiers so the next fetch re-surfaces everything
    pub fn reset(&self) {
        self.store.reset();
    }
}
