//! Webhook (EventSub) headers, envelopes and event payloads.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Header carrying the unique message id.
pub const MESSAGE_ID_HEADER: &str = "Twitch-Eventsub-Message-Id";
/// Header carrying the message timestamp (RFC 3339, signed verbatim).
pub const MESSAGE_TIMESTAMP_HEADER: &str = "Twitch-Eventsub-Message-Timestamp";
/// Header carrying `sha256={hex}`.
pub const MESSAGE_SIGNATURE_HEADER: &str = "Twitch-Eventsub-Message-Signature";
/// Header carrying the [`MessageType`].
pub const MESSAGE_TYPE_HEADER: &str = "Twitch-Eventsub-Message-Type";
/// Header carrying the subscription type, e.g. `channel.follow`.
pub const SUBSCRIPTION_TYPE_HEADER: &str = "Twitch-Eventsub-Subscription-Type";

/// Kind of webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    WebhookCallbackVerification,
    Notification,
    Revocation,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::WebhookCallbackVerification => "webhook_callback_verification",
            MessageType::Notification => "notification",
            MessageType::Revocation => "revocation",
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webhook_callback_verification" => Ok(MessageType::WebhookCallbackVerification),
            "notification" => Ok(MessageType::Notification),
            "revocation" => Ok(MessageType::Revocation),
            other => Err(UnknownValue(other.to_owned())),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription types this system registers and decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionType {
    #[serde(rename = "channel.follow")]
    ChannelFollow,
    #[serde(rename = "channel.update")]
    ChannelUpdate,
    #[serde(rename = "stream.online")]
    StreamOnline,
    #[serde(rename = "stream.offline")]
    StreamOffline,
}

impl SubscriptionType {
    pub const ALL: [SubscriptionType; 4] = [
        SubscriptionType::ChannelFollow,
        SubscriptionType::ChannelUpdate,
        SubscriptionType::StreamOnline,
        SubscriptionType::StreamOffline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionType::ChannelFollow => "channel.follow",
            SubscriptionType::ChannelUpdate => "channel.update",
            SubscriptionType::StreamOnline => "stream.online",
            SubscriptionType::StreamOffline => "stream.offline",
        }
    }

    /// Version string used when creating the subscription upstream.
    pub fn version(&self) -> &'static str {
        match self {
            SubscriptionType::ChannelFollow | SubscriptionType::ChannelUpdate => "2",
            SubscriptionType::StreamOnline | SubscriptionType::StreamOffline => "1",
        }
    }
}

impl std::str::FromStr for SubscriptionType {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubscriptionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownValue(s.to_owned()))
    }
}

impl std::fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A header value that does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value: {0}")]
pub struct UnknownValue(pub String);

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// Subscription metadata carried by every delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<Transport>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub created_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcaster_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderator_user_id: Option<String>,
}

impl Condition {
    pub fn broadcaster(id: impl Into<String>) -> Self {
        Self {
            broadcaster_user_id: Some(id.into()),
            moderator_user_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transport {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
    /// Only present on subscription creation requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// Body of a `webhook_callback_verification` delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationChallenge {
    pub challenge: String,
    pub subscription: Subscription,
}

/// Body of a `revocation` delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    pub subscription: Subscription,
}

/// Body of a `notification` delivery, generic over the event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification<E> {
    pub subscription: Subscription,
    pub event: E,
}

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

/// `channel.follow` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowEvent {
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
    pub broadcaster_user_name: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub followed_at: Option<OffsetDateTime>,
}

/// `channel.update` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelUpdateEvent {
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
    pub broadcaster_user_name: String,
    pub title: String,
    pub language: String,
    pub category_id: String,
    pub category_name: String,
    /// Version 1 payloads carry `is_mature`; version 2 replaced it with
    /// content classification labels.
    #[serde(default)]
    pub is_mature: bool,
    #[serde(default)]
    pub content_classification_labels: Vec<String>,
}

/// `stream.online` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOnlineEvent {
    pub id: String,
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
    pub broadcaster_user_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
}

/// `stream.offline` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOfflineEvent {
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
    pub broadcaster_user_name: String,
}

// ---------------------------------------------------------------------------
// Subscription creation
// ---------------------------------------------------------------------------

/// Request body of `POST /helix/eventsub/subscriptions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    #[serde(rename = "type")]
    pub kind: SubscriptionType,
    pub version: String,
    pub condition: Condition,
    pub transport: Transport,
}

impl CreateSubscriptionRequest {
    /// Build a webhook-transport subscription request for one broadcaster.
    pub fn webhook(
        kind: SubscriptionType,
        broadcaster_id: &str,
        callback: &str,
        secret: &str,
    ) -> Self {
        let mut condition = Condition::broadcaster(broadcaster_id);
        if kind == SubscriptionType::ChannelFollow {
            condition.moderator_user_id = Some(broadcaster_id.to_owned());
        }
        Self {
            kind,
            version: kind.version().to_owned(),
            condition,
            transport: Transport {
                method: "webhook".to_owned(),
                callback: Some(callback.to_owned()),
                secret: Some(secret.to_owned()),
            },
        }
    }
}

/// Response body of `POST /helix/eventsub/subscriptions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSubscriptionResponse {
    pub data: Vec<Subscription>,
    #[serde(default)]
    pub total: u32,
}
