//! Signature algorithm and verification for webhook notifications.
//!
//! Every notification delivered to the webhook endpoint carries an
//! HMAC-SHA256 signature in the message-signature header:
//!
//! ```text
//! Twitch-Eventsub-Message-Signature: sha256={hex_signature}
//! ```
//!
//! The signed data is the byte concatenation of the message id, the message
//! timestamp (exactly as sent in the header) and the raw request body:
//!
//! ```text
//! HMAC-SHA256(message_id || message_timestamp || body, secret)
//! ```

/// Prefix of the signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("signature header is missing the sha256= prefix")]
    InvalidFormat,
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("invalid signature")]
    SignatureMismatch,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

fn signing_key(secret: &[u8]) -> ring::hmac::Key {
    ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret)
}

fn signed_context(secret: &[u8], message_id: &str, timestamp: &str, body: &[u8]) -> ring::hmac::Context {
    let mut ctx = ring::hmac::Context::with_key(&signing_key(secret));
    ctx.update(message_id.as_bytes());
    ctx.update(timestamp.as_bytes());
    ctx.update(body);
    ctx
}

/// Compute the raw HMAC-SHA256 tag of a notification.
pub fn compute_signature(secret: &[u8], message_id: &str, timestamp: &str, body: &[u8]) -> Vec<u8> {
    signed_context(secret, message_id, timestamp, body)
        .sign()
        .as_ref()
        .to_vec()
}

/// Sign a notification and format the header value (`sha256={hex}`).
pub fn sign_message(secret: &[u8], message_id: &str, timestamp: &str, body: &[u8]) -> String {
    format_signature_header(&compute_signature(secret, message_id, timestamp, body))
}

/// Format a `sha256={hex}` header value from raw signature bytes.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", hex::encode(signature))
}

/// Parse a `sha256={hex}` header value into raw signature bytes.
pub fn parse_signature_header(value: &str) -> Result<Vec<u8>, SignatureError> {
    let hex_part = value
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(SignatureError::InvalidFormat)?;
    hex::decode(hex_part).map_err(|_| SignatureError::InvalidHex)
}

/// Verify the signature header of a notification.
///
/// The comparison is constant-time.
pub fn verify_message(
    secret: &[u8],
    message_id: &str,
    timestamp: &str,
    body: &[u8],
    signature_header: &str,
) -> Result<(), SignatureError> {
    let provided = parse_signature_header(signature_header)?;

    let mut data = Vec::with_capacity(message_id.len() + timestamp.len() + body.len());
    data.extend_from_slice(message_id.as_bytes());
    data.extend_from_slice(timestamp.as_bytes());
    data.extend_from_slice(body);

    ring::hmac::verify(&signing_key(secret), &data, &provided)?;
    Ok(())
}
