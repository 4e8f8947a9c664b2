//! Custom Axum extractors for request authentication.
//!
//! Provides `SignedNotification`, which checks the webhook correlation
//! headers and verifies the HMAC signature of the raw body before any
//! handler sees it. All cryptographic operations are delegated to
//! [`streamled_sdk::signature`].

use axum::{
    extract::{FromRequest, Request},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use streamled_sdk::objects::eventsub::{
    MESSAGE_ID_HEADER, MESSAGE_SIGNATURE_HEADER, MESSAGE_TIMESTAMP_HEADER, MESSAGE_TYPE_HEADER,
    MessageType, SUBSCRIPTION_TYPE_HEADER,
};
use streamled_sdk::signature::{self, SignatureError};

use crate::state::AppState;

/// Largest accepted notification body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// A webhook delivery whose signature has been verified.
///
/// # Header format
///
/// ```text
/// Twitch-Eventsub-Message-Id:        {uuid}
/// Twitch-Eventsub-Message-Timestamp: {rfc3339}
/// Twitch-Eventsub-Message-Signature: sha256={hex}
/// Twitch-Eventsub-Message-Type:      notification
/// Twitch-Eventsub-Subscription-Type: channel.follow
/// ```
///
/// The signature is `HMAC-SHA256(id || timestamp || body, webhook_secret)`.
#[derive(Debug)]
pub struct SignedNotification {
    pub message_id: String,
    pub message_type: MessageType,
    pub subscription_type: String,
    pub body: Bytes,
}

/// Errors that can occur during notification verification.
#[derive(Debug, thiserror::Error)]
pub enum SignedNotificationError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("invalid {0} header")]
    InvalidHeader(&'static str),
    #[error("failed to read request body")]
    BodyReadError,
    #[error("signature verification failed: {0}")]
    VerificationFailed(#[from] SignatureError),
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
    #[error("webhook endpoint is not configured")]
    NotConfigured,
}

impl IntoResponse for SignedNotificationError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            SignedNotificationError::MissingHeader(_) | SignedNotificationError::InvalidHeader(_) => {
                (StatusCode::FORBIDDEN, "missing or invalid webhook headers")
            }
            SignedNotificationError::BodyReadError => {
                (StatusCode::BAD_REQUEST, "failed to read request body")
            }
            SignedNotificationError::VerificationFailed(_) => {
                (StatusCode::FORBIDDEN, "signature verification failed")
            }
            SignedNotificationError::UnknownMessageType(_) => {
                (StatusCode::BAD_REQUEST, "unknown message type")
            }
            SignedNotificationError::NotConfigured => (StatusCode::NOT_FOUND, "not found"),
        };
        (status, message).into_response()
    }
}

fn header(headers: &HeaderMap, name: &'static str) -> Result<String, SignedNotificationError> {
    headers
        .get(name)
        .ok_or(SignedNotificationError::MissingHeader(name))?
        .to_str()
        .map(str::to_owned)
        .map_err(|_| SignedNotificationError::InvalidHeader(name))
}

impl FromRequest<AppState> for SignedNotification {
    type Rejection = SignedNotificationError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let webhook = state
            .webhook
            .as_ref()
            .ok_or(SignedNotificationError::NotConfigured)?;

        // Every header is checked before the body is touched.
        let headers = req.headers();
        let message_id = header(headers, MESSAGE_ID_HEADER)?;
        let timestamp = header(headers, MESSAGE_TIMESTAMP_HEADER)?;
        let signature_header = header(headers, MESSAGE_SIGNATURE_HEADER)?;
        let message_type = header(headers, MESSAGE_TYPE_HEADER)?;
        let subscription_type = header(headers, SUBSCRIPTION_TYPE_HEADER)?;

        let body = axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|_| SignedNotificationError::BodyReadError)?;

        signature::verify_message(
            &webhook.secret,
            &message_id,
            &timestamp,
            &body,
            &signature_header,
        )
        .inspect_err(|e| {
            tracing::warn!(message_id = %message_id, error = %e, "Rejected webhook delivery");
        })?;

        let message_type = message_type
            .parse::<MessageType>()
            .map_err(|e| SignedNotificationError::UnknownMessageType(e.0))?;

        Ok(SignedNotification {
            message_id,
            message_type,
            subscription_type,
            body,
        })
    }
}
