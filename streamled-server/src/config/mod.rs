//! Configuration module for streamled-server.
//!
//! Handles loading configuration from the TOML file and CLI arguments,
//! validating it, and converting it into the runtime types of
//! `streamled_core::config`.

pub mod file;

use crate::bridge::RewardTitles;
use crate::config::file::FileConfig;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use streamled_core::config::{
    ChatConfig, DEFAULT_CHAT_HOST, DEFAULT_CHAT_PORT, DEFAULT_PUBSUB_URL, DeviceConfig,
    EventSubConfig, MqttConfig, PubSubConfig, RetryPolicy,
};
use streamled_sdk::client::DEFAULT_API_BASE;
use thiserror::Error;
use url::Url;

/// Accepted length of the webhook secret, in bytes.
const SECRET_LEN: std::ops::RangeInclusive<usize> = 10..=100;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Webhook settings plus whether to register subscriptions on startup.
#[derive(Debug, Clone)]
pub struct EventSubSettings {
    pub config: EventSubConfig,
    pub register: bool,
}

/// Fully validated configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub chat: Option<ChatConfig>,
    pub pubsub: Option<PubSubConfig>,
    pub eventsub: Option<EventSubSettings>,
    pub device: DeviceConfig,
    pub mqtt: MqttConfig,
    pub rewards: RewardTitles,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read, override, validate and convert the configuration file.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&config_content)
    }

    /// Same as [`load`](Self::load), from an in-memory document.
    pub fn load_str(&self, content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        validate(&file_config)?;
        build_loaded_config(file_config)
    }
}

fn require(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!("{field} must not be empty")));
    }
    Ok(())
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if let Some(chat) = &config.chat {
        require(&chat.username, "chat.username")?;
        require(&chat.token, "chat.token")?;
        require(chat.channel.trim_start_matches('#'), "chat.channel")?;
    }

    if let Some(pubsub) = &config.pubsub {
        require(&pubsub.channel_id, "pubsub.channel_id")?;
        require(&pubsub.token, "pubsub.token")?;
        if pubsub.ping_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "pubsub.ping_interval_secs must be positive".into(),
            ));
        }
        if let Some(url) = &pubsub.url {
            if !matches!(url.scheme(), "ws" | "wss") {
                return Err(ConfigError::ValidationError(format!(
                    "pubsub.url must be a websocket URL, got {url}"
                )));
            }
        }
    }

    if let Some(eventsub) = &config.eventsub {
        if !SECRET_LEN.contains(&eventsub.secret.len()) {
            return Err(ConfigError::ValidationError(format!(
                "eventsub.secret must be {} to {} bytes long",
                SECRET_LEN.start(),
                SECRET_LEN.end()
            )));
        }
        require(&eventsub.broadcaster_id, "eventsub.broadcaster_id")?;
        if eventsub.register {
            require(&eventsub.client_id, "eventsub.client_id")?;
            require(&eventsub.app_token, "eventsub.app_token")?;
        }
    }

    require(&config.device.name, "device.name")?;
    require(&config.mqtt.host, "mqtt.host")?;
    require(&config.mqtt.client_id, "mqtt.client_id")?;
    if config.mqtt.keep_alive_secs == 0 {
        return Err(ConfigError::ValidationError(
            "mqtt.keep_alive_secs must be at least 1".into(),
        ));
    }

    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
    let chat = file_config.chat.map(|c| {
        let token = c.token.strip_prefix("oauth:").unwrap_or(&c.token).to_owned();
        let mut chat = ChatConfig::new(c.username, token, c.channel);
        chat.host = c.host.unwrap_or_else(|| DEFAULT_CHAT_HOST.to_owned());
        chat.port = c.port.unwrap_or(DEFAULT_CHAT_PORT);
        chat.login_timeout = Duration::from_secs(c.login_timeout_secs);
        chat
    });

    let pubsub = match file_config.pubsub {
        Some(p) => Some(PubSubConfig {
            url: match p.url {
                Some(url) => url,
                None => Url::parse(DEFAULT_PUBSUB_URL)?,
            },
            channel_id: p.channel_id,
            token: p.token,
            ping_interval: Duration::from_secs(p.ping_interval_secs),
            response_timeout: Duration::from_secs(p.response_timeout_secs),
        }),
        None => None,
    };

    let eventsub = match file_config.eventsub {
        Some(e) => Some(EventSubSettings {
            register: e.register,
            config: EventSubConfig {
                secret: e.secret,
                callback_url: e.callback_url,
                broadcaster_id: e.broadcaster_id,
                client_id: e.client_id,
                app_token: e.app_token,
                api_base: match e.api_base {
                    Some(url) => url,
                    None => Url::parse(DEFAULT_API_BASE)?,
                },
                retry: RetryPolicy {
                    base_delay: Duration::from_secs(e.retry.base_delay_secs),
                    max_delay: Duration::from_secs(e.retry.max_delay_secs),
                    max_attempts: e.retry.max_attempts,
                },
            },
        }),
        None => None,
    };

    let mut device = DeviceConfig::new(file_config.device.name, file_config.device.light_topic);
    device.publish_timeout = Duration::from_millis(file_config.device.publish_timeout_ms);

    let mqtt = MqttConfig {
        host: file_config.mqtt.host,
        port: file_config.mqtt.port,
        client_id: file_config.mqtt.client_id,
        username: file_config.mqtt.username,
        password: file_config.mqtt.password,
        keep_alive: Duration::from_secs(file_config.mqtt.keep_alive_secs),
    };

    Ok(LoadedConfig {
        listen: file_config.server.listen,
        chat,
        pubsub,
        eventsub,
        device,
        mqtt,
        rewards: RewardTitles::new(file_config.rewards.panel, file_config.rewards.light),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
[device]
name = "ledpanel"
light_topic = "room/light"

[mqtt]
host = "broker.local"
"#;

    fn with(extra: &str) -> String {
        format!("{BASE}\n{extra}")
    }

    fn validation_error(content: &str) -> String {
        match ConfigLoader::new("unused.toml", None).load_str(content) {
            Err(ConfigError::ValidationError(msg)) => msg,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_applied() {
        let loaded = ConfigLoader::new("unused.toml", None).load_str(BASE).unwrap();
        assert_eq!(loaded.listen.port(), 8080);
        assert_eq!(loaded.device.device_name, "ledpanel");
        assert_eq!(loaded.device.expiration, Duration::from_secs(300));
        assert_eq!(loaded.device.publish_timeout, Duration::from_secs(1));
        assert_eq!(loaded.mqtt.keep_alive, Duration::from_secs(30));
        assert!(loaded.chat.is_none());
    }

    #[test]
    fn listen_override_wins() {
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let loaded = ConfigLoader::new("unused.toml", Some(addr))
            .load_str(&with("[server]\nlisten = \"0.0.0.0:1\"\n"))
            .unwrap();
        assert_eq!(loaded.listen, addr);
    }

    #[test]
    fn chat_section_is_normalized() {
        let loaded = ConfigLoader::new("unused.toml", None)
            .load_str(&with(
                "[chat]\nusername = \"ledbot\"\ntoken = \"oauth:abc\"\nchannel = \"#Cool_User\"\n",
            ))
            .unwrap();
        let chat = loaded.chat.unwrap();
        assert_eq!(chat.token, "abc");
        assert_eq!(chat.channel, "cool_user");
        assert_eq!(chat.host, DEFAULT_CHAT_HOST);
        assert_eq!(chat.port, DEFAULT_CHAT_PORT);
        assert_eq!(chat.login_timeout, Duration::from_secs(5));
    }

    #[test]
    fn pubsub_and_eventsub_urls_default() {
        let loaded = ConfigLoader::new("unused.toml", None)
            .load_str(&with(
                r#"
[pubsub]
channel_id = "1337"
token = "abc"

[eventsub]
secret = "0123456789abcdef"
callback_url = "https://panel.example.com/eventsub"
broadcaster_id = "1337"
client_id = "cid"
app_token = "apptoken"
"#,
            ))
            .unwrap();
        let pubsub = loaded.pubsub.unwrap();
        assert_eq!(pubsub.url.as_str(), "wss://pubsub-edge.twitch.tv/");
        assert_eq!(pubsub.ping_interval, Duration::from_secs(5));
        let eventsub = loaded.eventsub.unwrap();
        assert!(eventsub.register);
        assert_eq!(eventsub.config.api_base.as_str(), DEFAULT_API_BASE);
        assert_eq!(eventsub.config.retry, RetryPolicy::default());
    }

    #[test]
    fn webhook_secret_length_is_enforced() {
        let section = |secret: &str| {
            with(&format!(
                "[eventsub]\nsecret = \"{secret}\"\ncallback_url = \"https://x.example/eventsub\"\nbroadcaster_id = \"1\"\nclient_id = \"c\"\napp_token = \"t\"\n"
            ))
        };
        assert!(validation_error(&section("short")).contains("eventsub.secret"));
        assert!(validation_error(&section(&"x".repeat(101))).contains("eventsub.secret"));
        ConfigLoader::new("unused.toml", None)
            .load_str(&section(&"x".repeat(10)))
            .unwrap();
    }

    #[test]
    fn empty_names_are_rejected() {
        let content = BASE.replace("name = \"ledpanel\"", "name = \"\"");
        assert_eq!(validation_error(&content), "device.name must not be empty");

        let chat = with("[chat]\nusername = \"ledbot\"\ntoken = \"abc\"\nchannel = \"#\"\n");
        assert_eq!(validation_error(&chat), "chat.channel must not be empty");
    }

    #[test]
    fn zero_keep_alive_is_rejected() {
        let content = BASE.replace(
            "host = \"broker.local\"",
            "host = \"broker.local\"\nkeep_alive_secs = 0",
        );
        assert!(validation_error(&content).contains("keep_alive_secs"));
    }

    #[test]
    fn pubsub_url_must_be_websocket() {
        let content = with(
            "[pubsub]\nchannel_id = \"1\"\ntoken = \"t\"\nurl = \"https://pubsub.example\"\n",
        );
        assert!(validation_error(&content).contains("websocket"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ConfigLoader::new("/nonexistent/streamled.toml", None)
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
