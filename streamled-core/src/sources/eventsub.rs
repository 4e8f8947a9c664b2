//! Webhook notification decoding.
//!
//! The HTTP layer verifies the signature and hands the raw body here along
//! with the message and subscription type headers. Notifications become
//! domain events on the bus; challenges and revocations are answered without
//! emitting anything.
//!
//! `channel.update` payloads are cached per broadcaster so that a later
//! `stream.online` can carry the current title, category and language.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use serde::de::DeserializeOwned;
use streamled_sdk::objects::eventsub::{
    self as wire, MessageType, Notification, Revocation, SubscriptionType, VerificationChallenge,
};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::events::{ChannelUpdateEvent, Event, EventBus, FollowEvent, StreamStatusEvent};

/// Errors produced while decoding a webhook delivery.
#[derive(Debug, thiserror::Error)]
pub enum EventSubError {
    #[error("unknown subscription type: {0}")]
    UnknownSubscriptionType(String),

    #[error("malformed body: {0}")]
    Json(#[from] serde_json::Error),
}

/// What a delivery asks of the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Echo the token back with 200.
    Challenge(String),
    /// Acknowledge with 200.
    Revoked,
    /// Acknowledge with 200; the event has been published.
    Notification(Event),
}

/// Last known channel metadata, from `channel.update`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelInfo {
    pub title: String,
    pub category: String,
    pub language: String,
    pub is_mature: bool,
}

/// Decodes verified webhook deliveries into events.
pub struct EventSubReceiver {
    bus: EventBus,
    channels: RwLock<HashMap<String, ChannelInfo>>,
}

impl EventSubReceiver {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Handle a delivery whose signature has already been verified.
    pub fn handle(
        &self,
        message_type: MessageType,
        subscription_type: &str,
        body: &[u8],
    ) -> Result<Delivery, EventSubError> {
        match message_type {
            MessageType::WebhookCallbackVerification => {
                let challenge: VerificationChallenge = serde_json::from_slice(body)?;
                info!(
                    subscription = %challenge.subscription.id,
                    kind = %challenge.subscription.kind,
                    "Answering webhook verification"
                );
                Ok(Delivery::Challenge(challenge.challenge))
            }
            MessageType::Revocation => {
                let revocation: Revocation = serde_json::from_slice(body)?;
                warn!(
                    subscription = %revocation.subscription.id,
                    kind = %revocation.subscription.kind,
                    status = %revocation.subscription.status,
                    "Webhook subscription revoked"
                );
                Ok(Delivery::Revoked)
            }
            MessageType::Notification => {
                let event = self.process(subscription_type, body)?;
                Ok(Delivery::Notification(event))
            }
        }
    }

    /// Decode a notification body by subscription type and publish it.
    pub fn process(&self, subscription_type: &str, body: &[u8]) -> Result<Event, EventSubError> {
        let kind = SubscriptionType::from_str(subscription_type)
            .map_err(|_| EventSubError::UnknownSubscriptionType(subscription_type.to_owned()))?;
        let now = OffsetDateTime::now_utc();

        let event = match kind {
            SubscriptionType::ChannelFollow => {
                let e = decode::<wire::FollowEvent>(body)?;
                Event::Follow(FollowEvent {
                    channel_id: e.broadcaster_user_id,
                    user_id: e.user_id,
                    username: e.user_name,
                    timestamp: now,
                })
            }
            SubscriptionType::ChannelUpdate => {
                let e = decode::<wire::ChannelUpdateEvent>(body)?;
                let is_mature = e.is_mature
                    || e.content_classification_labels
                        .iter()
                        .any(|l| l == "MatureGame");
                self.channels
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(
                        e.broadcaster_user_id.clone(),
                        ChannelInfo {
                            title: e.title.clone(),
                            category: e.category_name.clone(),
                            language: e.language.clone(),
                            is_mature,
                        },
                    );
                Event::ChannelUpdate(ChannelUpdateEvent {
                    channel_id: e.broadcaster_user_id,
                    title: e.title,
                    category_id: e.category_id,
                    category_name: e.category_name,
                    language: e.language,
                    is_mature,
                    timestamp: now,
                })
            }
            SubscriptionType::StreamOnline => {
                let e = decode::<wire::StreamOnlineEvent>(body)?;
                let info = self.channel_info(&e.broadcaster_user_id).unwrap_or_default();
                Event::StreamStatus(StreamStatusEvent {
                    channel_id: e.broadcaster_user_id,
                    online: true,
                    title: info.title,
                    category: info.category,
                    language: info.language,
                    is_mature: info.is_mature,
                    started_at: Some(e.started_at),
                    timestamp: now,
                })
            }
            SubscriptionType::StreamOffline => {
                let e = decode::<wire::StreamOfflineEvent>(body)?;
                Event::StreamStatus(StreamStatusEvent {
                    channel_id: e.broadcaster_user_id,
                    online: false,
                    title: String::new(),
                    category: String::new(),
                    language: String::new(),
                    is_mature: false,
                    started_at: None,
                    timestamp: now,
                })
            }
        };

        debug!(kind = %event.kind(), channel = %event.channel_id(), "Webhook event");
        self.bus.publish(event.clone());
        Ok(event)
    }

    /// Cached metadata of a broadcaster, if a `channel.update` was seen.
    pub fn channel_info(&self, broadcaster_id: &str) -> Option<ChannelInfo> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(broadcaster_id)
            .cloned()
    }
}

fn decode<E: DeserializeOwned>(body: &[u8]) -> Result<E, serde_json::Error> {
    serde_json::from_slice::<Notification<E>>(body).map(|n| n.event)
}
