//! Device command queue and its single worker.
//!
//! Producers enqueue through cloneable [`DeviceQueue`] handles. One
//! [`DeviceWorker`] pops commands in FIFO order, drops the ones older than
//! the expiration window and runs the rest to completion before looking at
//! the next, including any hold time. The worker is the only owner of the
//! panel state, so nothing here needs a lock.

use std::sync::Arc;

use streamled_sdk::objects::device::{
    self as wire, MessagePayload, Mode, Rgb, TOPIC_SUFFIX_BG_BRIGHTNESS, TOPIC_SUFFIX_BG_COLOR,
    TOPIC_SUFFIX_BRIGHTNESS, TOPIC_SUFFIX_MESSAGE, TOPIC_SUFFIX_MODE, TOPIC_SUFFIX_SCROLL_SPEED,
    TOPIC_SUFFIX_TEXT_COLOR,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::command::{CommandKind, DeviceCommand};
use super::transport::DeviceTransport;
use crate::config::DeviceConfig;

/// Upper bound for the background brightness.
pub const MAX_BG_BRIGHTNESS: f32 = 0.2;

/// Gap between the on and off pulses of `toggle-light`.
const LIGHT_PULSE: std::time::Duration = std::time::Duration::from_millis(10);

/// The queue has no worker anymore.
#[derive(Debug, thiserror::Error)]
#[error("device queue closed")]
pub struct QueueClosed;

/// Last values sent to the panel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceState {
    pub mode: Mode,
    pub text_color: Rgb,
    pub bg_color: Rgb,
    pub text_brightness: f32,
    pub bg_brightness: f32,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            mode: Mode::Clock,
            text_color: Rgb::WHITE,
            bg_color: Rgb::BLACK,
            text_brightness: 1.0,
            bg_brightness: MAX_BG_BRIGHTNESS,
        }
    }
}

/// Create a queue handle and the worker draining it.
pub fn device_queue(config: DeviceConfig, transport: Arc<dyn DeviceTransport>) -> (DeviceQueue, DeviceWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let worker = DeviceWorker {
        rx,
        transport,
        config,
        state: DeviceState::default(),
    };
    (DeviceQueue { tx }, worker)
}

/// Producer handle. Cheap to clone; enqueueing never blocks.
#[derive(Clone)]
pub struct DeviceQueue {
    tx: mpsc::UnboundedSender<DeviceCommand>,
}

impl DeviceQueue {
    pub fn enqueue(&self, kind: CommandKind) -> Result<(), QueueClosed> {
        trace!(command = kind.name(), "Enqueueing device command");
        self.tx
            .send(DeviceCommand::new(kind))
            .map_err(|_| QueueClosed)
    }
}

/// Single consumer of the device queue.
pub struct DeviceWorker {
    rx: mpsc::UnboundedReceiver<DeviceCommand>,
    transport: Arc<dyn DeviceTransport>,
    config: DeviceConfig,
    state: DeviceState,
}

impl DeviceWorker {
    /// Drain the queue until every producer handle is gone.
    pub async fn run(mut self) {
        info!(device = %self.config.device_name, "Device worker started");

        while let Some(command) = self.rx.recv().await {
            if command.is_expired(Instant::now(), self.config.expiration) {
                debug!(command = command.kind.name(), "Dropping expired device command");
                continue;
            }
            self.execute(command.kind).await;
        }

        info!("Device queue closed, worker exiting");
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Run one command to completion.
    pub async fn execute(&mut self, kind: CommandKind) {
        debug!(command = kind.name(), "Executing device command");
        match kind {
            CommandKind::SetTextColor(color) => self.set_text_color(color).await,
            CommandKind::SetBackgroundColor(color) => self.set_bg_color(color).await,
            CommandKind::SetTextBrightness(value) => {
                let value = clamp_unit(value);
                self.state.text_brightness = value;
                self.publish(TOPIC_SUFFIX_BRIGHTNESS, wire::encode_brightness(value).into_bytes())
                    .await;
            }
            CommandKind::SetBackgroundBrightness(value) => {
                let value = clamp_unit(value).min(MAX_BG_BRIGHTNESS);
                self.state.bg_brightness = value;
                self.publish(TOPIC_SUFFIX_BG_BRIGHTNESS, wire::encode_brightness(value).into_bytes())
                    .await;
            }
            CommandKind::ShowMessage(text) => {
                self.show_message(&text).await;
                tokio::time::sleep(self.config.message_hold).await;
            }
            CommandKind::SetMode(mode) => self.set_mode(mode).await,
            CommandKind::SetSpeed(speed) => {
                self.publish(TOPIC_SUFFIX_SCROLL_SPEED, speed.to_string().into_bytes())
                    .await;
            }
            CommandKind::ToggleLight => {
                let topic = self.config.light_topic.clone();
                self.publish_raw(&topic, b"1".to_vec()).await;
                tokio::time::sleep(LIGHT_PULSE).await;
                self.publish_raw(&topic, b"0".to_vec()).await;
            }
            CommandKind::CelebrateSubscription { username, months } => {
                self.celebrate(&format!("{username} THANKS FOR THE SUB! {months} MONTHS!"))
                    .await;
            }
            CommandKind::CelebrateFollow { username } => {
                self.celebrate(&format!("{username} THANKS FOR THE FOLLOW!")).await;
            }
            CommandKind::CelebrateBits {
                username,
                bits,
                message,
            } => {
                let text = format!("{username} THANKS FOR {bits} BITS! {message}");
                self.celebrate(text.trim_end()).await;
            }
        }
    }

    /// Festive colours, a message, a hold, then the previous look.
    async fn celebrate(&mut self, text: &str) {
        let snapshot = self.state;

        self.set_mode(Mode::BackgroundStringDisplay).await;
        self.set_bg_color(Rgb::TEAL).await;
        self.set_text_color(Rgb::GREEN).await;
        self.show_message(text).await;

        tokio::time::sleep(self.config.celebration_hold).await;

        self.set_mode(snapshot.mode).await;
        self.set_bg_color(snapshot.bg_color).await;
        self.set_text_color(snapshot.text_color).await;
    }

    async fn set_mode(&mut self, mode: Mode) {
        info!(mode = %mode, "Setting display mode");
        self.state.mode = mode;
        self.publish(TOPIC_SUFFIX_MODE, mode.code().to_string().into_bytes())
            .await;
    }

    async fn set_text_color(&mut self, color: Rgb) {
        self.state.text_color = color;
        self.publish_json(TOPIC_SUFFIX_TEXT_COLOR, &color).await;
    }

    async fn set_bg_color(&mut self, color: Rgb) {
        self.state.bg_color = color;
        self.publish_json(TOPIC_SUFFIX_BG_COLOR, &color).await;
    }

    async fn show_message(&mut self, text: &str) {
        let payload = MessagePayload::new(text, self.state.text_color);
        self.publish_json(TOPIC_SUFFIX_MESSAGE, &payload).await;
    }

    async fn publish_json<T: serde::Serialize>(&self, suffix: &str, value: &T) {
        match serde_json::to_vec(value) {
            Ok(payload) => self.publish(suffix, payload).await,
            Err(e) => warn!(error = %e, suffix, "Failed to encode device payload"),
        }
    }

    async fn publish(&self, suffix: &str, payload: Vec<u8>) {
        let topic = wire::device_topic(&self.config.device_name, suffix);
        self.publish_raw(&topic, payload).await;
    }

    /// Best effort: failures and timeouts are logged, never retried.
    async fn publish_raw(&self, topic: &str, payload: Vec<u8>) {
        trace!(topic, payload = %String::from_utf8_lossy(&payload), "Publishing to device");
        match tokio::time::timeout(self.config.publish_timeout, self.transport.publish(topic, payload)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(topic, error = %e, "Device publish failed"),
            Err(_) => warn!(topic, "Device publish timed out"),
        }
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
