// Conversation aggregation
// Derives one summary per counterparty from the current store contents

use std::collections::HashMap;

use crate::models::{self, Conversation, Direction, Message};

/// Build conversation summaries, newest first.
///
/// Pure function of `messages`: the same input always yields the same list.
/// Each group is scanned in timestamp order. The latest message becomes the
/// representative, and the unread flag follows the latest activity: an
/// incoming message sets it, an outgoing reply at or after it clears it.
pub fn aggregate(messages: &[Message]) -> Vec<Conversation> {
    let mut ordered: Vec<&Message> = messages.iter().collect();
    // On equal timestamps the incoming message goes first, so a reply sent in
    // the same instant still counts as answering it
    ordered.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| direction_rank(a.direction).cmp(&direction_rank(b.direction)))
    });

    let mut summaries: HashMap<&str, Conversation> = HashMap::new();
    for message in ordered {
        let summary = summaries
            .entry(message.conversation_key.as_str())
            .or_insert_with(|| Conversation {
                key: message.conversation_key.clone(),
                display_name: models::display_name(&message.conversation_key),
                last_message: message.body.clone(),
                timestamp: message.timestamp,
                unread: false,
                message_count: 0,
            });

        summary.message_count += 1;
        if message.timestamp >= summary.timestamp {
            summary.last_message = message.body.clone();
            summary.timestamp = message.timestamp;
        }
        summary.unread = message.direction == Direction::Incoming;
    }

    let mut conversations: Vec<Conversation> = summaries.into_values().collect();
    conversations.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.key.cmp(&b.key)));
    conversations
}

fn direction_rank(direction: Direction) -> u8 {
    match direction {
        Direction::Incoming => 0,
        Direction::Outgoing => 1,
    }
}
