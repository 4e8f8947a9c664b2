//! Application state shared across all request handlers.

use std::sync::Arc;
use streamled_core::sources::EventSubReceiver;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone, Default)]
pub struct AppState {
    /// Webhook endpoint, when the `[eventsub]` section is configured.
    pub webhook: Option<WebhookState>,
}

/// Secret and decoder behind `POST /eventsub`.
#[derive(Clone)]
pub struct WebhookState {
    pub secret: Arc<[u8]>,
    pub receiver: Arc<EventSubReceiver>,
}

impl AppState {
    pub fn new(webhook: Option<WebhookState>) -> Self {
        Self { webhook }
    }
}

impl WebhookState {
    pub fn new(secret: &str, receiver: EventSubReceiver) -> Self {
        Self {
            secret: Arc::from(secret.as_bytes()),
            receiver: Arc::new(receiver),
        }
    }
}
