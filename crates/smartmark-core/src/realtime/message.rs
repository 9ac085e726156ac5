//! Realtime protocol message types
//!
//! Phoenix channel frames exchanged with the realtime server as JSON text:
//! `{"topic": .., "event": .., "payload": .., "ref": ..}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::Bookmark;
use crate::service::ChangeEvent;

/// Channel carrying the bookmark table changes
pub const BOOKMARKS_TOPIC: &str = "realtime:bookmarks-realtime";

/// Topic heartbeats are sent on
pub const PHOENIX_TOPIC: &str = "phoenix";

/// Table the channel listens to
pub const BOOKMARKS_TABLE: &str = "bookmarks";

/// A raw channel frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
}

impl Frame {
    fn new(topic: &str, event: &str, payload: Value, msg_ref: String) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            msg_ref: Some(msg_ref),
        }
    }

    /// Subscribe to every change on the bookmarks table
    pub fn join(access_token: &str, msg_ref: String) -> Self {
        Self::new(
            BOOKMARKS_TOPIC,
            "phx_join",
            json!({
                "config": {
                    "broadcast": { "ack": false, "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [
                        { "event": "*", "schema": "public", "table": BOOKMARKS_TABLE }
                    ]
                },
                "access_token": access_token,
            }),
            msg_ref,
        )
    }

    /// Keep the socket alive
    pub fn heartbeat(msg_ref: String) -> Self {
        Self::new(PHOENIX_TOPIC, "heartbeat", json!({}), msg_ref)
    }

    /// Hand a refreshed token to the joined channel
    pub fn access_token(access_token: &str, msg_ref: String) -> Self {
        Self::new(
            BOOKMARKS_TOPIC,
            "access_token",
            json!({ "access_token": access_token }),
            msg_ref,
        )
    }

    /// Leave the channel
    pub fn leave(msg_ref: String) -> Self {
        Self::new(BOOKMARKS_TOPIC, "phx_leave", json!({}), msg_ref)
    }

    /// Encode to a JSON text frame
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a JSON text frame
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Messages received from the realtime server
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Reply to a join, heartbeat or leave
    Reply {
        topic: String,
        msg_ref: Option<String>,
        status: String,
        response: Value,
    },
    /// A row changed
    Change(ChangeEvent),
    /// The channel crashed on the server
    ChannelError { topic: String },
    /// The server closed the channel
    Close { topic: String },
    /// Subscription status notice
    System { status: String, message: String },
    /// Anything else (presence, broadcasts)
    Other { event: String },
}

impl ServerMessage {
    /// Classify a frame
    ///
    /// Changes that do not carry a usable record are reported as errors so
    /// the caller can log and skip them.
    pub fn from_frame(frame: Frame) -> Result<Self, String> {
        match frame.event.as_str() {
            "phx_reply" => {
                let reply: ReplyPayload = serde_json::from_value(frame.payload)
                    .map_err(|e| format!("Malformed reply: {}", e))?;
                Ok(ServerMessage::Reply {
                    topic: frame.topic,
                    msg_ref: frame.msg_ref,
                    status: reply.status,
                    response: reply.response,
                })
            }
            "postgres_changes" => {
                let change: ChangePayload = serde_json::from_value(frame.payload)
                    .map_err(|e| format!("Malformed change: {}", e))?;
                change.data.into_event().map(ServerMessage::Change)
            }
            "phx_error" => Ok(ServerMessage::ChannelError { topic: frame.topic }),
            "phx_close" => Ok(ServerMessage::Close { topic: frame.topic }),
            "system" => {
                let notice: SystemPayload = serde_json::from_value(frame.payload)
                    .map_err(|e| format!("Malformed system message: {}", e))?;
                Ok(ServerMessage::System {
                    status: notice.status,
                    message: notice.message,
                })
            }
            _ => Ok(ServerMessage::Other { event: frame.event }),
        }
    }

    /// Decode and classify a text frame
    pub fn decode(text: &str) -> Result<Self, String> {
        let frame = Frame::decode(text).map_err(|e| format!("Malformed frame: {}", e))?;
        Self::from_frame(frame)
    }
}

#[derive(Deserialize)]
struct ReplyPayload {
    status: String,
    #[serde(default)]
    response: Value,
}

#[derive(Deserialize)]
struct SystemPayload {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct ChangePayload {
    data: ChangeData,
}

#[derive(Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
}

impl ChangeData {
    fn into_event(self) -> Result<ChangeEvent, String> {
        match self.kind.as_str() {
            "INSERT" => Ok(ChangeEvent::Insert(record(self.record)?)),
            "UPDATE" => Ok(ChangeEvent::Update(record(self.record)?)),
            "DELETE" => {
                let id = self
                    .old_record
                    .as_ref()
                    .and_then(|old| old.get("id"))
                    .and_then(id_string)
                    .ok_or_else(|| "DELETE without old_record.id".to_string())?;
                Ok(ChangeEvent::Delete { id })
            }
            other => Err(format!("Unknown change type: {}", other)),
        }
    }
}

fn record(value: Option<Value>) -> Result<Bookmark, String> {
    let value = value.ok_or_else(|| "Change without record".to_string())?;
    serde_json::from_value(value).map_err(|e| format!("Malformed record: {}", e))
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
