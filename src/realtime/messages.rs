//! WebSocket Message Types
//!
//! Frames pushed by the server on `/ws` are JSON objects of the form
//! `{"type": <kind>, "data": <payload>}`. Payload fields are all optional:
//! consumers treat every event as a "go re-fetch" signal and never apply
//! payload values to local state.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::api::{OptionId, PollId};

/// Tag of an inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Connected,
    PollCreated,
    VoteUpdate,
    LikeUpdate,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Connected,
        EventKind::PollCreated,
        EventKind::VoteUpdate,
        EventKind::LikeUpdate,
    ];

    /// Kinds that mean server-held poll data changed
    pub const POLL_CHANGES: [EventKind; 3] = [
        EventKind::PollCreated,
        EventKind::VoteUpdate,
        EventKind::LikeUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::PollCreated => "poll_created",
            EventKind::VoteUpdate => "vote_update",
            EventKind::LikeUpdate => "like_update",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Welcome message sent once per connection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectedPayload {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A poll was created somewhere
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollCreatedPayload {
    #[serde(default)]
    pub id: Option<PollId>,
    #[serde(default)]
    pub title: Option<String>,
}

/// A vote was cast somewhere
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoteUpdatePayload {
    #[serde(default)]
    pub poll_id: Option<PollId>,
    #[serde(default)]
    pub option_id: Option<OptionId>,
    #[serde(default)]
    pub vote_count: Option<u64>,
    #[serde(default)]
    pub total_votes: Option<u64>,
}

/// A poll was liked or unliked somewhere
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LikeUpdatePayload {
    #[serde(default)]
    pub poll_id: Option<PollId>,
    #[serde(default)]
    pub total_likes: Option<u64>,
    /// "liked" or "unliked"
    #[serde(default)]
    pub action: Option<String>,
}

/// Typed server push
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Connected(ConnectedPayload),
    PollCreated(PollCreatedPayload),
    VoteUpdate(VoteUpdatePayload),
    LikeUpdate(LikeUpdatePayload),
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl InboundEvent {
    /// Decode a text frame
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let frame: RawFrame = serde_json::from_str(text)?;
        let kind = EventKind::parse(&frame.kind).ok_or(DecodeError::UnknownType(frame.kind))?;

        // `null` and absent payloads decode as all-empty
        let data = match frame.data {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other,
        };

        let payload_err = |source| DecodeError::Payload { kind, source };
        Ok(match kind {
            EventKind::Connected => {
                InboundEvent::Connected(serde_json::from_value(data).map_err(payload_err)?)
            }
            EventKind::PollCreated => {
                InboundEvent::PollCreated(serde_json::from_value(data).map_err(payload_err)?)
            }
            EventKind::VoteUpdate => {
                InboundEvent::VoteUpdate(serde_json::from_value(data).map_err(payload_err)?)
            }
            EventKind::LikeUpdate => {
                InboundEvent::LikeUpdate(serde_json::from_value(data).map_err(payload_err)?)
            }
        })
    }

    /// Encode in the wire shape
    pub fn encode(&self) -> String {
        let data = match self {
            InboundEvent::Connected(p) => serde_json::to_value(p),
            InboundEvent::PollCreated(p) => serde_json::to_value(p),
            InboundEvent::VoteUpdate(p) => serde_json::to_value(p),
            InboundEvent::LikeUpdate(p) => serde_json::to_value(p),
        }
        .unwrap_or_default();

        serde_json::json!({ "type": self.kind().as_str(), "data": data }).to_string()
    }

    pub fn kind(&self) -> EventKind {
        match self {
            InboundEvent::Connected(_) => EventKind::Connected,
            InboundEvent::PollCreated(_) => EventKind::PollCreated,
            InboundEvent::VoteUpdate(_) => EventKind::VoteUpdate,
            InboundEvent::LikeUpdate(_) => EventKind::LikeUpdate,
        }
    }

    /// Poll the event refers to, when the payload names one
    pub fn poll_id(&self) -> Option<PollId> {
        match self {
            InboundEvent::Connected(_) => None,
            InboundEvent::PollCreated(p) => p.id,
            InboundEvent::VoteUpdate(p) => p.poll_id,
            InboundEvent::LikeUpdate(p) => p.poll_id,
        }
    }
}

/// Why a frame was dropped
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown event type: {0}")]
    UnknownType(String),

    #[error("Invalid {kind} payload: {source}")]
    Payload {
        kind: EventKind,
        source: serde_json::Error,
    },
}
