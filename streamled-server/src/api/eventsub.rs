//! Webhook notification endpoint.
//!
//! # Endpoints
//!
//! - `POST /eventsub` – signed deliveries from the upstream event service

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use streamled_core::sources::{Delivery, EventSubError};

use crate::api::extractors::SignedNotification;
use crate::state::AppState;

/// Build the webhook router.
pub fn router() -> Router<AppState> {
    Router::new().route("/eventsub", post(receive))
}

/// `POST /eventsub`: answer a challenge, acknowledge a revocation, or
/// publish a notification as an event.
async fn receive(
    State(state): State<AppState>,
    notification: SignedNotification,
) -> Result<Response, WebhookError> {
    let webhook = state.webhook.as_ref().ok_or(WebhookError::NotConfigured)?;

    tracing::debug!(
        message_id = %notification.message_id,
        message_type = %notification.message_type,
        subscription_type = %notification.subscription_type,
        "Webhook delivery"
    );

    let delivery = webhook.receiver.handle(
        notification.message_type,
        &notification.subscription_type,
        &notification.body,
    )?;

    Ok(match delivery {
        Delivery::Challenge(challenge) => (StatusCode::OK, challenge).into_response(),
        Delivery::Revoked | Delivery::Notification(_) => StatusCode::OK.into_response(),
    })
}

/// Webhook handler errors.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error(transparent)]
    Decode(#[from] EventSubError),
    #[error("webhook endpoint is not configured")]
    NotConfigured,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match self {
            WebhookError::Decode(EventSubError::UnknownSubscriptionType(kind)) => {
                tracing::error!(subscription_type = %kind, "Unknown webhook subscription type");
                (StatusCode::INTERNAL_SERVER_ERROR, "unknown subscription type").into_response()
            }
            WebhookError::Decode(EventSubError::Json(e)) => {
                tracing::warn!(error = %e, "Malformed webhook body");
                (StatusCode::BAD_REQUEST, "malformed body").into_response()
            }
            WebhookError::NotConfigured => (StatusCode::NOT_FOUND, "not found").into_response(),
        }
    }
}
