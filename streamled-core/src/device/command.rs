//! Device commands and their expiration rule.

use std::time::Duration;

use streamled_sdk::objects::device::{Mode, Rgb};
use tokio::time::Instant;

/// Maximum age of a queued command at dequeue time.
pub const EXPIRATION_WINDOW: Duration = Duration::from_secs(5 * 60);

/// What the panel should do.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    SetTextColor(Rgb),
    SetBackgroundColor(Rgb),
    /// Clamped to `[0, 1]`.
    SetTextBrightness(f32),
    /// Clamped to `[0, 0.2]`.
    SetBackgroundBrightness(f32),
    /// Scroll a message and hold the display for the message hold time.
    ShowMessage(String),
    SetMode(Mode),
    SetSpeed(u32),
    /// Pulse the light switch topic.
    ToggleLight,
    CelebrateSubscription { username: String, months: u32 },
    CelebrateFollow { username: String },
    CelebrateBits { username: String, bits: u64, message: String },
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::SetTextColor(_) => "set-text-color",
            CommandKind::SetBackgroundColor(_) => "set-bg-color",
            CommandKind::SetTextBrightness(_) => "set-text-brightness",
            CommandKind::SetBackgroundBrightness(_) => "set-bg-brightness",
            CommandKind::ShowMessage(_) => "show-message",
            CommandKind::SetMode(_) => "set-mode",
            CommandKind::SetSpeed(_) => "set-speed",
            CommandKind::ToggleLight => "toggle-light",
            CommandKind::CelebrateSubscription { .. } => "celebrate-sub",
            CommandKind::CelebrateFollow { .. } => "celebrate-follow",
            CommandKind::CelebrateBits { .. } => "celebrate-bits",
        }
    }
}

/// A command stamped with its enqueue time.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCommand {
    pub kind: CommandKind,
    pub enqueued_at: Instant,
}

impl DeviceCommand {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            enqueued_at: Instant::now(),
        }
    }

    /// Whether the command is too old to run at `now`.
    pub fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.enqueued_at) >= window
    }
}
