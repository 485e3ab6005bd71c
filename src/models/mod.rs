//! Wire models for the websocket feed and its REST bootstrap.
//!
//! Contains frame definitions for the duplex protocol (inbound frames as
//! a tagged union, outbound control requests), level-3 diff events, and
//! the token/instance-server payloads used to open a connection.

pub mod event;
pub mod token;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::error::LobsyncError;

/// Frame `type` values of the websocket protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FrameType {
    Welcome,
    Error,
    Ping,
    Pong,
    Ack,
    Message,
    Notice,
    Command,
    Subscribe,
    Unsubscribe,
    OpenTunnel,
    CloseTunnel,
}

impl FrameType {
    /// Returns the wire-format frame type.
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::Welcome => "welcome",
            FrameType::Error => "error",
            FrameType::Ping => "ping",
            FrameType::Pong => "pong",
            FrameType::Ack => "ack",
            FrameType::Message => "message",
            FrameType::Notice => "notice",
            FrameType::Command => "command",
            FrameType::Subscribe => "subscribe",
            FrameType::Unsubscribe => "unsubscribe",
            FrameType::OpenTunnel => "openTunnel",
            FrameType::CloseTunnel => "closeTunnel",
        }
    }
}

/// An inbound frame exactly as it arrives, before classification.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFrame {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub tpe: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub code: i64,
    pub topic: Option<String>,
    pub subject: Option<String>,
    pub tunnel_id: Option<String>,
}

/// Kind of a topic-bearing frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    Message,
    Notice,
    Command,
}

/// A payload published on a subscribed topic.
#[derive(Debug, Clone)]
pub struct TopicMessage {
    pub kind: TopicKind,
    pub topic: String,
    pub subject: Option<String>,
    pub tunnel_id: Option<String>,
    pub data: serde_json::Value,
}

/// A classified inbound frame.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    Welcome { id: String },
    Error { id: String, code: i64, message: String },
    Pong { id: String },
    Ack { id: String },
    Topic(TopicMessage),
}

impl InboundFrame {
    /// Parses and classifies a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`LobsyncError::Json`] if the text is not a frame object and
    /// [`LobsyncError::Protocol`] if its `type` is not one the server may
    /// send.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawFrame = serde_json::from_str(text)?;
        Self::try_from(raw)
    }
}

impl TryFrom<RawFrame> for InboundFrame {
    type Error = LobsyncError;

    fn try_from(raw: RawFrame) -> Result<Self> {
        let kind = match raw.tpe.as_str() {
            "welcome" => return Ok(InboundFrame::Welcome { id: raw.id }),
            "error" => {
                let message = match raw.data {
                    serde_json::Value::String(text) => text,
                    other => other.to_string(),
                };
                return Ok(InboundFrame::Error {
                    id: raw.id,
                    code: raw.code,
                    message,
                });
            }
            "pong" => return Ok(InboundFrame::Pong { id: raw.id }),
            "ack" => return Ok(InboundFrame::Ack { id: raw.id }),
            "message" => TopicKind::Message,
            "notice" => TopicKind::Notice,
            "command" => TopicKind::Command,
            other => {
                return Err(LobsyncError::Protocol(format!(
                    "unexpected frame type {other:?}"
                )));
            }
        };

        Ok(InboundFrame::Topic(TopicMessage {
            kind,
            topic: raw.topic.unwrap_or_default(),
            subject: raw.subject,
            tunnel_id: raw.tunnel_id,
            data: raw.data,
        }))
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// An outbound control frame (subscribe, unsubscribe, tunnels, ping).
///
/// Every request carries a unique `id`; the server echoes it back in the
/// matching `ack` or `pong` when a response was requested.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub tpe: FrameType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_tunnel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_tunnel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tunnel_id: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub private_channel: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub response: bool,
}

impl ControlRequest {
    fn bare(id: String, tpe: FrameType) -> Self {
        Self {
            id,
            tpe,
            topic: None,
            new_tunnel_id: None,
            close_tunnel: None,
            tunnel_id: None,
            private_channel: false,
            response: false,
        }
    }

    /// Heartbeat ping; the server always answers with a `pong`.
    #[must_use]
    pub fn ping(id: String) -> Self {
        Self::bare(id, FrameType::Ping)
    }

    #[must_use]
    pub fn subscribe(
        id: String,
        topic: &str,
        tunnel_id: Option<&str>,
        private: bool,
        ack: bool,
    ) -> Self {
        Self {
            topic: Some(topic.to_string()),
            tunnel_id: tunnel_id.map(String::from),
            private_channel: private,
            response: ack,
            ..Self::bare(id, FrameType::Subscribe)
        }
    }

    #[must_use]
    pub fn unsubscribe(id: String, topic: &str, private: bool, ack: bool) -> Self {
        Self {
            topic: Some(topic.to_string()),
            private_channel: private,
            response: ack,
            ..Self::bare(id, FrameType::Unsubscribe)
        }
    }

    #[must_use]
    pub fn open_tunnel(id: String, tunnel_id: &str, ack: bool) -> Self {
        Self {
            new_tunnel_id: Some(tunnel_id.to_string()),
            response: ack,
            ..Self::bare(id, FrameType::OpenTunnel)
        }
    }

    #[must_use]
    pub fn close_tunnel(id: String, tunnel_id: &str, ack: bool) -> Self {
        Self {
            close_tunnel: Some(tunnel_id.to_string()),
            response: ack,
            ..Self::bare(id, FrameType::CloseTunnel)
        }
    }
}
