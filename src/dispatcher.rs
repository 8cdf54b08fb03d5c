// Notification dispatch
// One subscriber slot for new-message batches and one for error strings

use log::{debug, warn};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

use crate::models::Message;

pub type MessagesCallback = Arc<dyn Fn(&[Message]) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Delivers events synchronously to at most one subscriber per channel.
///
/// Registering a subscriber replaces the previous one. Events raised while no
/// subscriber is registered are dropped.
#[derive(Default)]
pub struct NotificationDispatcher {
    on_messages: RwLock<Option<MessagesCallback>>,
    on_error: RwLock<Option<ErrorCallback>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_new_messages<F>(&self, callback: F)
    where
        F: Fn(&[Message]) + Send + Sync + 'static,
    {
        let mut slot = self.on_messages.write().unwrap_or_else(|p| p.into_inner());
        if slot.is_some() {
            debug!("Replacing existing new-message subscriber");
        }
        *slot = Some(Arc::new(callback));
    }

    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let mut slot = self.on_error.write().unwrap_or_else(|p| p.into_inner());
        if slot.is_some() {
            debug!("Replacing existing error subscriber");
        }
        *slot = Some(Arc::new(callback));
    }

    /// Register a subscriber that forwards new-message batches into a channel
    pub fn subscribe_new_messages(&self) -> mpsc::UnboundedReceiver<Vec<Message>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.on_new_messages(move |batch| {
            if tx.send(batch.to_vec()).is_err() {
                debug!("New-message receiver dropped");
            }
        });
        rx
    }

    /// Register a subscriber that forwards error strings into a channel
    pub fn subscribe_errors(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.on_error(move |error| {
            if tx.send(error.to_string()).is_err() {
                debug!("Error receiver dropped");
            }
        });
        rx
    }

    /// Remove both subscribers
    pub fn clear(&self) {
        *self.on_messages.write().unwrap_or_else(|p| p.into_inner()) = None;
        *self.on_error.write().unwrap_or_else(|p| p.into_inner()) = None;
    }

    pub fn dispatch_new_messages(&self, batch: &[Message]) {
        // Clone the handle out so the callback runs without the slot locked
        let callback = self.on_messages.read().unwrap_or_else(|p| p.into_inner()).clone();
        match callback {
            Some(callback) => callback(batch),
            None => debug!("No new-message subscriber, dropping {} messages", batch.len()),
        }
    }

    pub fn dispatch_error(&self, error: &str) {
        let callback = self.on_error.read().unwrap_or_else(|p| p.into_inner()).clone();
        match callback {
            Some(callback) => callback(error),
            None => warn!("No error subscriber, dropping error: {}", error),
        }
    }
}
