//! LED panel device topics and payloads.
//!
//! The device listens on publish-only topics named `<deviceName><suffix>`.
//! Colour and message payloads are small JSON objects; brightness, mode and
//! scroll speed are plain numeric strings.

use serde::{Deserialize, Serialize};

/// Scrolling text message, `{"msg","r","g","b"}`.
pub const TOPIC_SUFFIX_MESSAGE: &str = "_msg";
/// Text colour, `{"r","g","b"}`.
pub const TOPIC_SUFFIX_TEXT_COLOR: &str = "_textcolor";
/// Background colour, `{"r","g","b"}`.
pub const TOPIC_SUFFIX_BG_COLOR: &str = "_bgcolor";
/// Text brightness, decimal string in `[0, 1]`.
pub const TOPIC_SUFFIX_BRIGHTNESS: &str = "_brightness";
/// Background brightness, decimal string in `[0, 0.2]`.
pub const TOPIC_SUFFIX_BG_BRIGHTNESS: &str = "_bgbrightness";
/// Display mode, integer string.
pub const TOPIC_SUFFIX_MODE: &str = "_mode";
/// Scroll speed, integer string.
pub const TOPIC_SUFFIX_SCROLL_SPEED: &str = "_scrollspeed";

/// Build a device topic from the device name and a suffix.
pub fn device_topic(device_name: &str, suffix: &str) -> String {
    format!("{device_name}{suffix}")
}

/// An RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const RED: Rgb = Rgb::new(255, 0, 0);
    pub const GREEN: Rgb = Rgb::new(0, 128, 0);
    pub const TEAL: Rgb = Rgb::new(0, 128, 128);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Panel display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Mode {
    StringDisplay = 0,
    BackgroundOnly = 1,
    BackgroundStringDisplay = 2,
    Clock = 3,
    BackgroundClock = 4,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::StringDisplay,
        Mode::BackgroundOnly,
        Mode::BackgroundStringDisplay,
        Mode::Clock,
        Mode::BackgroundClock,
    ];

    /// Numeric value sent on the mode topic.
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Mode> {
        Mode::ALL.into_iter().find(|m| m.code() == code)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Mode::StringDisplay => "String Display",
            Mode::BackgroundOnly => "Background Only",
            Mode::BackgroundStringDisplay => "String Display with Background",
            Mode::Clock => "Clock",
            Mode::BackgroundClock => "Clock with Background",
        };
        f.write_str(name)
    }
}

/// Payload of the message topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub msg: String,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl MessagePayload {
    pub fn new(msg: impl Into<String>, color: Rgb) -> Self {
        Self {
            msg: msg.into(),
            r: color.r,
            g: color.g,
            b: color.b,
        }
    }
}

/// Encode a brightness value the way the panel firmware parses it.
pub fn encode_brightness(value: f32) -> String {
    format!("{value:.6}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_encodings() {
        assert_eq!(
            serde_json::to_string(&Rgb::TEAL).unwrap(),
            r#"{"r":0,"g":128,"b":128}"#
        );
        assert_eq!(
            serde_json::to_string(&MessagePayload::new("hi", Rgb::WHITE)).unwrap(),
            r#"{"msg":"hi","r":255,"g":255,"b":255}"#
        );
        assert_eq!(encode_brightness(0.2), "0.200000");
        assert_eq!(device_topic("panel", TOPIC_SUFFIX_MODE), "panel_mode");
    }

    #[test]
    fn mode_codes() {
        assert_eq!(Mode::Clock.code(), 3);
        assert_eq!(Mode::from_code(2), Some(Mode::BackgroundStringDisplay));
        assert_eq!(Mode::from_code(9), None);
    }
}
