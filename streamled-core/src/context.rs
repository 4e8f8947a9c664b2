//! Shared dependencies handed to every adapter.

use crate::events::EventBus;

/// Explicit dependency bundle, built once at startup.
#[derive(Clone)]
pub struct Context {
    pub bus: EventBus,
    pub http: reqwest::Client,
}

impl Context {
    pub fn new(bus: EventBus, http: reqwest::Client) -> Self {
        Self { bus, http }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(EventBus::new(), reqwest::Client::new())
    }
}
