//! Runtime configuration types.
//!
//! These are the validated values handed to each component. Loading and
//! parsing live in the server crate.

use std::time::Duration;

use url::Url;

/// Chat endpoint, TLS.
pub const DEFAULT_CHAT_HOST: &str = "irc.chat.twitch.tv";
pub const DEFAULT_CHAT_PORT: u16 = 6697;
/// Push-notification websocket endpoint.
pub const DEFAULT_PUBSUB_URL: &str = "wss://pubsub-edge.twitch.tv";

/// Chat adapter settings.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub host: String,
    pub port: u16,
    /// Login name of the bot account.
    pub username: String,
    /// OAuth token, without the `oauth:` prefix.
    pub token: String,
    /// Channel to join, without the leading `#`.
    pub channel: String,
    pub login_timeout: Duration,
}

impl ChatConfig {
    pub fn new(
        username: impl Into<String>,
        token: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            host: DEFAULT_CHAT_HOST.to_owned(),
            port: DEFAULT_CHAT_PORT,
            username: username.into(),
            token: token.into(),
            channel: channel.into().trim_start_matches('#').to_lowercase(),
            login_timeout: Duration::from_secs(5),
        }
    }
}

/// Push monitor settings.
#[derive(Debug, Clone)]
pub struct PubSubConfig {
    pub url: Url,
    pub channel_id: String,
    pub token: String,
    pub ping_interval: Duration,
    pub response_timeout: Duration,
}

/// Webhook receiver and registrar settings.
#[derive(Debug, Clone)]
pub struct EventSubConfig {
    /// Shared HMAC secret, also sent upstream on registration.
    pub secret: String,
    /// Public URL upstream delivers notifications to.
    pub callback_url: Url,
    pub broadcaster_id: String,
    pub client_id: String,
    pub app_token: String,
    pub api_base: Url,
    pub retry: RetryPolicy,
}

/// Retry schedule for subscription registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(64),
            max_attempts: 8,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, doubling from the base delay.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// MQTT broker settings for the device transport.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
}

/// LED panel settings.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Topic prefix of the panel.
    pub device_name: String,
    /// Topic of the light switch toggled by `toggle-light`.
    pub light_topic: String,
    pub expiration: Duration,
    pub publish_timeout: Duration,
    pub message_hold: Duration,
    pub celebration_hold: Duration,
}

impl DeviceConfig {
    pub fn new(device_name: impl Into<String>, light_topic: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            light_topic: light_topic.into(),
            expiration: Duration::from_secs(5 * 60),
            publish_timeout: Duration::from_secs(1),
            message_hold: Duration::from_secs(5),
            celebration_hold: Duration::from_secs(10),
        }
    }
}
