//! TOML file configuration structures.
//!
//! These structs directly map to the `streamled.toml` file format.
//! Durations are written as whole seconds (or milliseconds where the
//! field name says so).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::Url;

/// Root configuration structure as read from the TOML file.
///
/// The three event sources are optional; the panel is not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub chat: Option<ChatConfig>,
    pub pubsub: Option<PubSubConfig>,
    pub eventsub: Option<EventSubConfig>,
    pub device: DeviceConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub rewards: RewardsConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Chat bot account and channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub username: String,
    /// OAuth token; an `oauth:` prefix is accepted and stripped.
    pub token: String,
    pub channel: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,
}

fn default_login_timeout() -> u64 {
    5
}

/// Push-notification session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubSubConfig {
    pub channel_id: String,
    pub token: String,
    pub url: Option<Url>,
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,
}

fn default_ping_interval() -> u64 {
    5
}

fn default_response_timeout() -> u64 {
    5
}

/// Webhook receiver and upstream subscription registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSubConfig {
    /// Shared HMAC secret, 10 to 100 bytes.
    pub secret: String,
    /// Public URL of `POST /eventsub`.
    pub callback_url: Url,
    pub broadcaster_id: String,
    pub client_id: String,
    pub app_token: String,
    pub api_base: Option<Url>,
    /// Create the upstream subscriptions on startup.
    #[serde(default = "default_true")]
    pub register: bool,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_true() -> bool {
    true
}

/// Backoff for subscription registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_base_delay() -> u64 {
    1
}

fn default_max_delay() -> u64 {
    64
}

fn default_max_attempts() -> u32 {
    8
}

/// LED panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Topic prefix of the panel, e.g. `ledpanel` for `ledpanel_msg`.
    pub name: String,
    /// Topic of the room light switch.
    pub light_topic: String,
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_ms: u64,
}

fn default_publish_timeout() -> u64 {
    1000
}

/// MQTT broker the panel listens on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "streamled".to_owned()
}

fn default_keep_alive() -> u64 {
    30
}

/// Channel-points reward titles that drive the panel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Redemptions of this reward scroll the viewer's input.
    pub panel: Option<String>,
    /// Redemptions of this reward toggle the room light.
    pub light: Option<String>,
}
