// Wire format of the read and write endpoints

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TransportError;
use crate::models::{self, Direction, Message};
use crate::timestamp;

/// Counterparty token; the read endpoint sends either a string or a bare number
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PhoneNumber {
    Text(String),
    Number(serde_json::Number),
}

impl PhoneNumber {
    pub fn as_address(&self) -> String {
        match self {
            PhoneNumber::Text(text) => text.clone(),
            PhoneNumber::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum WireDirection {
    #[serde(rename = "INBOUND")]
    Inbound,
    #[serde(rename = "OUTBOUND")]
    Outbound,
}

impl From<WireDirection> for Direction {
    fn from(direction: WireDirection) -> Self {
        match direction {
            WireDirection::Inbound => Direction::Incoming,
            WireDirection::Outbound => Direction::Outgoing,
        }
    }
}

/// One element of the read endpoint's response array.
///
/// Deserializing doubles as validation: an element missing a field or
/// carrying a wrong type is rejected as a whole.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawMessage {
    pub id: String,
    #[serde(rename = "phoneNumber")]
    pub phone_number: PhoneNumber,
    pub direction: WireDirection,
    #[serde(rename = "lastMessage")]
    pub last_message: String,
    /// HK-locale timestamp; the source of truth for ordering
    #[serde(rename = "lastMessageHK")]
    pub last_message_hk: String,
    #[serde(rename = "lastMessageSL")]
    pub last_message_sl: String,
}

impl RawMessage {
    /// Convert into a canonical message
    pub fn into_message(self) -> Message {
        let timestamp = timestamp::to_instant(&self.last_message_hk);
        Message {
            conversation_key: models::conversation_key(&self.phone_number.as_address()),
            timestamp,
            body: self.last_message,
            direction: self.direction.into(),
            id: Some(self.id),
            status: None,
        }
    }
}

/// JSON body posted to the write endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendRequest {
    pub to: String,
    pub body: String,
    pub timestamp: String,
}

impl SendRequest {
    pub fn new(to: &str, body: &str, sent_at: DateTime<Utc>) -> Self {
        SendRequest {
            to: to.to_string(),
            body: body.to_string(),
            timestamp: sent_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Parse a read-endpoint response body.
///
/// The body must be a JSON array; anything else is a `Format` error.
/// Elements that fail validation are dropped and the rest are returned in
/// source order.
pub fn parse_batch(body: &str) -> Result<Vec<RawMessage>, TransportError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| TransportError::Format(format!("response is not valid JSON: {}", e)))?;

    let elements = match value {
        Value::Array(elements) => elements,
        other => {
            return Err(TransportError::Format(format!(
                "expected an array of messages, got {}",
                json_kind(&other)
            )))
        }
    };

    let total = elements.len();
    let mut messages = Vec::with_capacity(total);
    for (index, element) in elements.into_iter().enumerate() {
        match serde_json::from_value::<RawMessage>(element) {
            Ok(raw) => messages.push(raw),
            Err(e) => warn!("Dropping invalid message at index {}: {}", index, e),
        }
    }

    debug!("Parsed {} of {} messages from response", messages.len(), total);
    Ok(messages)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
