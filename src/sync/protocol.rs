//! Messaging protocol definitions
//! Flat key-value JSON payloads carried by the broadcast and presence channels

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Broadcast events, encoded as `{"event": ..., "payload": {...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum BroadcastMsg {
    /// Committed player position
    PlayerMove(PlayerMove),
    /// Zero-payload latency probe
    Latency(Empty),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerMove {
    pub id: String,
    pub x: i32,
    pub y: i32,
}

/// Serializes as `{}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

impl BroadcastMsg {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// One tracked presence of a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMeta {
    /// Transport-assigned token identifying this presence
    pub presence_ref: String,
    pub online_at: DateTime<Utc>,
}

/// Full presence state of a channel: presence key to its tracked presences
pub type PresenceState = BTreeMap<String, Vec<PresenceMeta>>;

/// Subscription lifecycle status reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelStatus {
    Subscribed,
    TimedOut,
    Closed,
    ChannelError,
}

/// What a transport delivers to a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Broadcast { text: String },
    PresenceSync(PresenceState),
    PresenceJoin { key: String, metas: Vec<PresenceMeta> },
    PresenceLeave { key: String, metas: Vec<PresenceMeta> },
    Status(ChannelStatus),
}

/// A peer as seen through presence, flattened to its first tracked presence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPresence {
    pub id: String,
    pub presence_ref: String,
    pub online_at: DateTime<Utc>,
}

impl PeerPresence {
    pub fn from_metas(key: &str, metas: &[PresenceMeta]) -> Option<Self> {
        metas.first().map(|meta| Self {
            id: key.to_string(),
            presence_ref: meta.presence_ref.clone(),
            online_at: meta.online_at,
        })
    }
}
