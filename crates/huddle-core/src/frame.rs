//! Event frames and their SSE wire encoding.
//!
//! A frame is a flat JSON object with a `type`, an optional `topic`, an
//! RFC 3339 `timestamp`, and any event-specific fields alongside. On the wire
//! each frame is one SSE block: `data: <json>\n\n`.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::ids::ClientId;

/// Handshake frame type, sent once right after attach.
pub const CONNECTED: &str = "connected";
/// Keep-alive frame type.
pub const HEARTBEAT: &str = "heartbeat";

const DATA_MARKER: &str = "data:";

/// Errors decoding a frame received off the wire.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The block had no `data:` line.
    #[error("SSE block has no data line")]
    MissingData,
    /// The data body was not a JSON frame.
    #[error("malformed frame body: {0}")]
    Json(#[from] serde_json::Error),
}

/// One event delivered to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Control type (`connected`, `heartbeat`) or application event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Topic the event was published on. Absent on control frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Construction time, RFC 3339 with milliseconds.
    pub timestamp: String,
    /// Event-specific fields, flattened into the top-level object.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Frame {
    /// Handshake frame carrying the new client's id and subscriptions.
    pub fn connected<'a, I>(client_id: &ClientId, subscriptions: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut topics: Vec<&String> = subscriptions.into_iter().collect();
        topics.sort();
        let mut fields = Map::new();
        let _ = fields.insert("clientId".into(), Value::String(client_id.to_string()));
        let _ = fields.insert(
            "subscriptions".into(),
            Value::Array(topics.into_iter().cloned().map(Value::String).collect()),
        );
        Self {
            event_type: CONNECTED.into(),
            topic: None,
            timestamp: now(),
            fields,
        }
    }

    /// Keep-alive frame.
    pub fn heartbeat() -> Self {
        Self {
            event_type: HEARTBEAT.into(),
            topic: None,
            timestamp: now(),
            fields: Map::new(),
        }
    }

    /// Application event published on `topic`.
    ///
    /// The frame type is the payload's own string `type` when it has one,
    /// otherwise the topic. `topic` and `timestamp` always come from the
    /// broadcaster. A non-object payload is carried under `data`.
    pub fn event(topic: &str, payload: Value) -> Self {
        let mut fields = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                let _ = map.insert("data".into(), other);
                map
            }
        };
        let event_type = match fields.remove("type") {
            Some(Value::String(t)) => t,
            Some(other) => {
                // `type` is reserved for the frame type on the wire.
                debug!(topic, value = %other, "ignoring non-string event type");
                topic.to_owned()
            }
            None => topic.to_owned(),
        };
        let _ = fields.remove("topic");
        let _ = fields.remove("timestamp");
        Self {
            event_type,
            topic: Some(topic.to_owned()),
            timestamp: now(),
            fields,
        }
    }

    /// `connected` and `heartbeat` frames are transport plumbing, never
    /// application events.
    pub fn is_control(&self) -> bool {
        self.event_type == CONNECTED || self.event_type == HEARTBEAT
    }

    /// Client id announced by a `connected` frame.
    pub fn client_id(&self) -> Option<ClientId> {
        if self.event_type != CONNECTED {
            return None;
        }
        self.fields
            .get("clientId")
            .and_then(Value::as_str)
            .map(ClientId::from)
    }

    /// Look up an event-specific field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Serialize to the JSON body carried in an SSE `data:` line.
    pub fn to_json(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Encode a frame as one SSE block: data marker, JSON body, blank line.
pub fn encode_sse(frame: &Frame) -> Result<String, FrameError> {
    Ok(format!("{DATA_MARKER} {}\n\n", frame.to_json()?))
}

/// Decode a single SSE data body (the text after `data:`).
pub fn decode_data(body: &str) -> Result<Frame, FrameError> {
    Ok(serde_json::from_str(body.trim())?)
}

/// Decode one raw SSE block. Multiple `data:` lines are joined with `\n`
/// as the event-stream format requires; other fields are ignored.
pub fn decode_sse_block(block: &str) -> Result<Frame, FrameError> {
    let mut data: Option<String> = None;
    for line in block.lines() {
        let Some(rest) = line.strip_prefix(DATA_MARKER) else {
            continue;
        };
        let rest = rest.strip_prefix(' ').unwrap_or(rest);
        match data.as_mut() {
            Some(buf) => {
                buf.push('\n');
                buf.push_str(rest);
            }
            None => data = Some(rest.to_owned()),
        }
    }
    decode_data(&data.ok_or(FrameError::MissingData)?)
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
