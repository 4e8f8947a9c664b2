//! Domain event definitions.
//!
//! Every event source (chat, push monitor, webhook receiver) normalizes what
//! it reads into one [`Event`] variant. Events are plain values: they are
//! built once by the producing adapter and cloned to each subscriber.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Where a chat message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Source {
    Twitch,
}

/// Discriminant of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    Error,
    LoginSuccess,
    LoginError,
    Bits,
    Subscription,
    Follow,
    RewardRedemption,
    StreamStatus,
    ChannelUpdate,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Message => "message",
            EventKind::Error => "error",
            EventKind::LoginSuccess => "login_success",
            EventKind::LoginError => "login_error",
            EventKind::Bits => "bits",
            EventKind::Subscription => "subscription",
            EventKind::Follow => "follow",
            EventKind::RewardRedemption => "reward_redemption",
            EventKind::StreamStatus => "stream_status",
            EventKind::ChannelUpdate => "channel_update",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat line addressed to the joined channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub channel_id: String,
    pub source: Source,
    pub username: String,
    pub text: String,
    /// Profile picture; not resolved by the chat adapter.
    pub avatar_url: Option<String>,
    pub moderator: bool,
    pub subscriber: bool,
    pub subscriber_months: u32,
    pub badges: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// A fault in one of the event sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub channel_id: String,
    /// Component that produced the error, e.g. `chat` or `pubsub`.
    pub origin: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Result of the chat login handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginEvent {
    pub channel_id: String,
    pub success: bool,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitsEvent {
    pub channel_id: String,
    /// Empty when the cheer was anonymous.
    pub username: String,
    pub bits_used: u64,
    pub total_bits_used: u64,
    pub anonymous: bool,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub channel_id: String,
    pub username: String,
    pub display_name: String,
    pub months: u32,
    pub streak_months: u32,
    pub plan: String,
    /// `sub`, `resub`, `subgift`, ...
    pub context: String,
    pub is_gift: bool,
    pub recipient: Option<String>,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowEvent {
    pub channel_id: String,
    pub user_id: String,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// A channel-points reward redeemed by a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRedemptionEvent {
    pub channel_id: String,
    pub redemption_id: String,
    pub user_login: String,
    pub user_display_name: String,
    pub reward_id: String,
    pub reward_title: String,
    pub cost: u64,
    pub user_input: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// The stream went online or offline.
///
/// Offline events only carry the channel id; the descriptive fields stay
/// empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStatusEvent {
    pub channel_id: String,
    pub online: bool,
    pub title: String,
    pub category: String,
    pub language: String,
    pub is_mature: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelUpdateEvent {
    pub channel_id: String,
    pub title: String,
    pub category_id: String,
    pub category_name: String,
    pub language: String,
    pub is_mature: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// The closed set of domain events.
///
/// Serialized with an inline `"type"` discriminant, e.g.
/// `{"type":"follow","channel_id":"1337",...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Message(MessageEvent),
    Error(ErrorEvent),
    Login(LoginEvent),
    Bits(BitsEvent),
    Subscription(SubscriptionEvent),
    Follow(FollowEvent),
    RewardRedemption(RewardRedemptionEvent),
    StreamStatus(StreamStatusEvent),
    ChannelUpdate(ChannelUpdateEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Message(_) => EventKind::Message,
            Event::Error(_) => EventKind::Error,
            Event::Login(e) if e.success => EventKind::LoginSuccess,
            Event::Login(_) => EventKind::LoginError,
            Event::Bits(_) => EventKind::Bits,
            Event::Subscription(_) => EventKind::Subscription,
            Event::Follow(_) => EventKind::Follow,
            Event::RewardRedemption(_) => EventKind::RewardRedemption,
            Event::StreamStatus(_) => EventKind::StreamStatus,
            Event::ChannelUpdate(_) => EventKind::ChannelUpdate,
        }
    }

    pub fn channel_id(&self) -> &str {
        match self {
            Event::Message(e) => &e.channel_id,
            Event::Error(e) => &e.channel_id,
            Event::Login(e) => &e.channel_id,
            Event::Bits(e) => &e.channel_id,
            Event::Subscription(e) => &e.channel_id,
            Event::Follow(e) => &e.channel_id,
            Event::RewardRedemption(e) => &e.channel_id,
            Event::StreamStatus(e) => &e.channel_id,
            Event::ChannelUpdate(e) => &e.channel_id,
        }
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        match self {
            Event::Message(e) => e.timestamp,
            Event::Error(e) => e.timestamp,
            Event::Login(e) => e.timestamp,
            Event::Bits(e) => e.timestamp,
            Event::Subscription(e) => e.timestamp,
            Event::Follow(e) => e.timestamp,
            Event::RewardRedemption(e) => e.timestamp,
            Event::StreamStatus(e) => e.timestamp,
            Event::ChannelUpdate(e) => e.timestamp,
        }
    }

    /// Serialized form of the event.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Shorthand for an [`ErrorEvent`] stamped now.
    pub fn error(channel_id: &str, origin: &str, message: impl Into<String>) -> Self {
        Event::Error(ErrorEvent {
            channel_id: channel_id.to_owned(),
            origin: origin.to_owned(),
            message: message.into(),
            timestamp: OffsetDateTime::now_utc(),
        })
    }

    /// Shorthand for a [`LoginEvent`] stamped now.
    pub fn login(channel_id: &str, success: bool, message: impl Into<String>) -> Self {
        Event::Login(LoginEvent {
            channel_id: channel_id.to_owned(),
            success,
            message: message.into(),
            timestamp: OffsetDateTime::now_utc(),
        })
    }
}

macro_rules! impl_from_payload {
    ($($payload:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$payload> for Event {
                fn from(value: $payload) -> Self {
                    Event::$variant(value)
                }
            }
        )*
    };
}

impl_from_payload! {
    MessageEvent => Message,
    ErrorEvent => Error,
    LoginEvent => Login,
    BitsEvent => Bits,
    SubscriptionEvent => Subscription,
    FollowEvent => Follow,
    RewardRedemptionEvent => RewardRedemption,
    StreamStatusEvent => StreamStatus,
    ChannelUpdateEvent => ChannelUpdate,
}
