//! Push-notification (PubSub) websocket frames and payloads.
//!
//! # Protocol
//!
//! Every frame is a JSON object discriminated by its `"type"` field:
//!
//! ```json
//! {"type":"LISTEN","nonce":"...","data":{"topics":["..."],"auth_token":"..."}}
//! {"type":"RESPONSE","nonce":"...","error":""}
//! {"type":"MESSAGE","data":{"topic":"channel-bits-events-v2.1234","message":"{...}"}}
//! {"type":"PING"}
//! {"type":"PONG"}
//! ```
//!
//! The `message` field of a MESSAGE frame is itself a JSON document encoded
//! as a string; its shape is selected by the topic's event name.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Event name of the bits topic.
pub const TOPIC_BITS_V2: &str = "channel-bits-events-v2";
/// Event name of the channel subscriptions topic.
pub const TOPIC_SUBSCRIBE: &str = "channel-subscribe-events-v1";
/// Event name of the channel points topic.
pub const TOPIC_CHANNEL_POINTS: &str = "channel-points-channel-v1";

/// Client-to-server frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ClientFrame {
    /// Register interest in a set of topics.
    Listen { nonce: String, data: ListenData },
    /// Keep-alive.
    Ping,
}

/// Payload of a LISTEN frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenData {
    pub topics: Vec<String>,
    pub auth_token: String,
}

/// Server-to-client frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ServerFrame {
    /// Answer to a LISTEN request, correlated by nonce.
    Response(ResponseFrame),
    /// A pushed topic event.
    Message { data: MessageData },
    /// Keep-alive answer.
    Pong,
    /// The server is about to restart and asks clients to reconnect.
    Reconnect,
    /// Any frame type this client does not know about.
    #[serde(other)]
    Unknown,
}

/// Body of a RESPONSE frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFrame {
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ResponseFrame {
    /// The upstream error, if the response carries a non-empty one.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

/// Body of a MESSAGE frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    /// `<eventName>.<channelId>`
    pub topic: String,
    /// JSON-encoded payload, shape depends on the event name.
    pub message: String,
}

/// Split a topic string into `(event_name, channel_id)`.
///
/// Returns `None` unless the topic has exactly two dot-separated parts.
pub fn split_topic(topic: &str) -> Option<(&str, &str)> {
    let mut parts = topic.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(event), Some(channel), None) if !event.is_empty() && !channel.is_empty() => {
            Some((event, channel))
        }
        _ => None,
    }
}

/// Build a topic string from its parts.
pub fn make_topic(event_name: &str, channel_id: &str) -> String {
    format!("{event_name}.{channel_id}")
}

// ---------------------------------------------------------------------------
// Bits
// ---------------------------------------------------------------------------

/// `channel-bits-events-v2` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitsEventV2 {
    pub data: BitsEventData,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub message_type: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitsEventData {
    /// Null when the cheer was anonymous.
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub time: Option<OffsetDateTime>,
    #[serde(default)]
    pub chat_message: String,
    pub bits_used: u64,
    #[serde(default)]
    pub total_bits_used: u64,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub badge_entitlement: Option<BadgeEntitlement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeEntitlement {
    pub new_version: u32,
    pub previous_version: u32,
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// `channel-subscribe-events-v1` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSubscribeMessage {
    pub user_name: String,
    pub display_name: String,
    pub channel_name: String,
    pub user_id: String,
    pub channel_id: String,
    /// `Prime`, `1000`, `2000` or `3000`.
    pub sub_plan: String,
    pub sub_plan_name: String,
    pub cumulative_months: u32,
    pub streak_months: u32,
    /// `sub`, `resub`, `subgift`, `anonsubgift`, `resubgift`, `anonresubgift`.
    pub context: String,
    pub is_gift: bool,
    pub sub_message: SubMessage,
    pub recipient_id: Option<String>,
    pub recipient_user_name: Option<String>,
    pub recipient_display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubMessage {
    pub message: String,
}

// ---------------------------------------------------------------------------
// Channel points
// ---------------------------------------------------------------------------

/// `channel-points-channel-v1` payload.
///
/// Adjacently tagged: `{"type": "reward-redeemed", "data": {...}}`. Kinds
/// other than `reward-redeemed` fail to decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ChannelPointsMessage {
    RewardRedeemed(RewardRedeemedData),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRedeemedData {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
    pub redemption: Redemption,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub id: String,
    pub user: RedemptionUser,
    #[serde(default)]
    pub channel_id: String,
    pub reward: Reward,
    #[serde(default)]
    pub user_input: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionUser {
    pub id: String,
    pub login: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub cost: u64,
    #[serde(default)]
    pub is_user_input_required: bool,
    #[serde(default)]
    pub background_color: String,
}
