// Message store for smsdeck
// Holds the last fetched snapshot, locally appended optimistic messages and the seen-id set

use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::models::Message;

/// An optimistic message and the append sequence it was inserted at
#[derive(Debug, Clone)]
struct PendingMessage {
    seq: u64,
    message: Message,
}

#[derive(Debug, Default)]
struct StoreState {
    snapshot: Vec<Message>,
    optimistic: Vec<PendingMessage>,
    seen: HashSet<String>,
    append_seq: u64,
}

/// Shared cache of every known message.
///
/// All mutation happens under one lock, so a merge is never observed half
/// done. Notifications are raised by the caller after the lock is released.
#[derive(Debug, Default)]
pub struct MessageStore {
    state: Mutex<StoreState>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current optimistic-append sequence.
    ///
    /// A fetch records this before issuing its request; optimistic messages
    /// appended after it survive that fetch's `replace_all_since`.
    pub fn marker(&self) -> u64 {
        self.lock().append_seq
    }

    /// Replace the snapshot with a freshly fetched batch.
    ///
    /// Returns the genuinely new messages (identifiers never seen before),
    /// ascending by timestamp.
    pub fn replace_all(&self, batch: Vec<Message>) -> Vec<Message> {
        let mut state = self.lock();
        let marker = state.append_seq;
        Self::replace_locked(&mut state, marker, batch)
    }

    /// Like `replace_all`, but keeps optimistic messages appended after `marker`.
    pub fn replace_all_since(&self, marker: u64, batch: Vec<Message>) -> Vec<Message> {
        let mut state = self.lock();
        Self::replace_locked(&mut state, marker, batch)
    }

    fn replace_locked(state: &mut StoreState, marker: u64, batch: Vec<Message>) -> Vec<Message> {
        let batch = dedup_batch(batch);

        let batch_ids: HashSet<&str> = batch.iter().filter_map(|m| m.dedup_id()).collect();
        let before = state.optimistic.len();
        state.optimistic.retain(|pending| {
            pending.seq > marker
                && !pending
                    .message
                    .dedup_id()
                    .map(|id| batch_ids.contains(id))
                    .unwrap_or(false)
        });
        let superseded = before - state.optimistic.len();

        let mut fresh = Vec::new();
        for message in &batch {
            if let Some(id) = message.dedup_id() {
                if state.seen.insert(id.to_string()) {
                    fresh.push(message.clone());
                }
            }
        }

        let mut snapshot = batch;
        snapshot.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        fresh.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        info!(
            "Replaced snapshot with {} messages ({} new, {} optimistic superseded)",
            snapshot.len(),
            fresh.len(),
            superseded
        );
        state.snapshot = snapshot;
        fresh
    }

    /// Insert a locally originated message and mark its identifier seen
    pub fn append_optimistic(&self, message: Message) {
        let mut state = self.lock();
        state.append_seq += 1;
        let seq = state.append_seq;
        if let Some(id) = message.dedup_id() {
            state.seen.insert(id.to_string());
        }
        debug!("Appended optimistic message {:?} at seq {}", message.id, seq);
        state.optimistic.push(PendingMessage { seq, message });
    }

    /// Forget every message and every seen identifier
    pub fn reset(&self) {
        let mut state = self.lock();
        state.snapshot.clear();
        state.optimistic.clear();
        state.seen.clear();
        info!("Message store reset");
    }

    /// Every stored message, ascending by timestamp
    pub fn all(&self) -> Vec<Message> {
        let state = self.lock();
        let mut messages: Vec<Message> = state
            .snapshot
            .iter()
            .chain(state.optimistic.iter().map(|pending| &pending.message))
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        messages
    }

    /// Messages for one conversation, ascending by timestamp
    pub fn query_by_conversation(&self, key: &str) -> Vec<Message> {
        self.all()
            .into_iter()
            .filter(|m| m.conversation_key == key)
            .collect()
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.lock().seen.contains(id)
    }

    pub fn len(&self) -> usize {
        let state = self.lock();
        state.snapshot.len() + state.optimistic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collapse duplicate identifiers within one batch; the later element in
/// source order replaces the earlier one.
fn dedup_batch(batch: Vec<Message>) -> Vec<Message> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Message> = Vec::with_capacity(batch.len());

    for message in batch {
        match message.dedup_id().map(str::to_string) {
            Some(id) => match positions.get(&id) {
                Some(&index) => {
                    debug!("Duplicate id {} in batch, keeping the later element", id);
                    unique[index] = message;
                }
                None => {
                    positions.insert(id, unique.len());
                    unique.push(message);
                }
            },
            None => unique.push(message),
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeliveryStatus, Direction};
    use chrono::{Duration, TimeZone, Utc};

    fn message(id: Option<&str>, key: &str, minute: i64, body: &str) -> Message {
        Message {
            conversation_key: key.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute),
            body: body.to_string(),
            direction: Direction::Incoming,
            id: id.map(str::to_string),
            status: None,
        }
    }

    fn optimistic(id: &str, key: &str, minute: i64) -> Message {
        Message {
            direction: Direction::Outgoing,
            status: Some(DeliveryStatus::Sent),
            ..message(Some(id), key, minute, "sent")
        }
    }

    #[test]
    fn test_replace_all_reports_new_once() {
        let store = MessageStore::new();
        let batch = vec![
            message(Some("a"), "555", 2, "two"),
            message(Some("b"), "555", 1, "one"),
            message(Some("c"), "777", 3, "three"),
        ];

        let fresh = store.replace_all(batch.clone());
        assert_eq!(fresh.len(), 3);
        assert_eq!(store.len(), 3);
        // Ascending by timestamp
        assert_eq!(fresh[0].id.as_deref(), Some("b"));

        let again = store.replace_all(batch);
        assert!(again.is_empty());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_overlapping_batches_report_difference() {
        let store = MessageStore::new();
        store.replace_all(vec![message(Some("a"), "1", 0, ""), message(Some("b"), "1", 1, "")]);

        let fresh = store.replace_all(vec![
            message(Some("b"), "1", 1, ""),
            message(Some("c"), "1", 2, ""),
            message(Some("d"), "2", 3, ""),
        ]);
        let ids: Vec<_> = fresh.iter().filter_map(|m| m.id.clone()).collect();
        assert_eq!(ids, vec!["c", "d"]);
        // Snapshot is a replacement, not a history
        assert_eq!(store.len(), 3);
        assert!(store.has_seen("a"));
    }

    #[test]
    fn test_messages_without_id_are_stored_but_never_new() {
        let store = MessageStore::new();
        let fresh = store.replace_all(vec![
            message(None, "1", 0, "anonymous"),
            message(Some(""), "1", 1, "blank"),
        ]);
        assert!(fresh.is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_duplicate_ids_in_batch_last_wins() {
        let store = MessageStore::new();
        let fresh = store.replace_all(vec![
            message(Some("x"), "1", 5, "first"),
            message(Some("y"), "1", 6, "other"),
            message(Some("x"), "1", 1, "second"),
        ]);
        assert_eq!(fresh.len(), 2);
        assert_eq!(store.len(), 2);
        let thread = store.query_by_conversation("1");
        assert_eq!(thread[0].body, "second");
    }

    #[test]
    fn test_optimistic_visible_immediately_and_seen() {
        let store = MessageStore::new();
        store.append_optimistic(optimistic("local-1", "555", 10));

        let thread = store.query_by_conversation("555");
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].status, Some(DeliveryStatus::Sent));
        assert!(store.has_seen("local-1"));
    }

    #[test]
    fn test_optimistic_survives_stale_fetch() {
        let store = MessageStore::new();
        let marker = store.marker();
        store.append_optimistic(optimistic("local-1", "555", 10));

        // Response to a request issued before the send
        store.replace_all_since(marker, vec![message(Some("a"), "555", 0, "hi")]);
        assert_eq!(store.query_by_conversation("555").len(), 2);

        // A fetch issued after the send supersedes it
        let marker = store.marker();
        store.replace_all_since(marker, vec![message(Some("a"), "555", 0, "hi")]);
        assert_eq!(store.query_by_conversation("555").len(), 1);
    }

    #[test]
    fn test_optimistic_superseded_by_identifier() {
        let store = MessageStore::new();
        let marker = store.marker();
        store.append_optimistic(optimistic("srv-9", "555", 10));

        let fresh = store.replace_all_since(marker, vec![message(Some("srv-9"), "555", 10, "sent")]);
        assert!(fresh.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_reset_resurfaces_everything() {
        let store = MessageStore::new();
        let batch = vec![message(Some("a"), "1", 0, ""), message(Some("b"), "1", 1, "")];
        store.replace_all(batch.clone());
        store.append_optimistic(optimistic("local-1", "1", 2));

        store.reset();
        assert!(store.is_empty());
        assert!(!store.has_seen("a"));

        assert_eq!(store.replace_all(batch).len(), 2);
    }

    #[test]
    fn test_query_by_conversation_filters_and_sorts() {
        let store = MessageStore::new();
        store.replace_all(vec![
            message(Some("a"), "1", 3, "late"),
            message(Some("b"), "2", 0, "other"),
            message(Some("c"), "1", 1, "early"),
        ]);
        store.append_optimistic(optimistic("local-1", "1", 2));

        let bodies: Vec<_> = store
            .query_by_conversation("1")
            .into_iter()
            .map(|m| m.body)
            .collect();
        assert_eq!(bodies, vec!["early", "sent", "late"]);
        assert!(store.query_by_conversation("missing").is_empty());
    }
}
