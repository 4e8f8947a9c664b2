//! The application-wide event bus.
//!
//! Every event is broadcast twice: once on the global topic and once on the
//! topic of the channel it belongs to.

use super::bus::{Bus, Topic};
use super::types::Event;

/// Fan-out point shared by all event sources.
#[derive(Clone, Default)]
pub struct EventBus {
    global: Topic<Event>,
    channels: Bus<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcast on the global topic and on the event's channel topic.
    pub fn publish(&self, event: Event) {
        tracing::trace!(kind = %event.kind(), channel = %event.channel_id(), "Publishing event");
        let channel_id = event.channel_id().to_owned();
        self.global.publish(event.clone());
        self.channels.publish(&channel_id, event);
    }

    /// Topic receiving every event.
    pub fn global(&self) -> &Topic<Event> {
        &self.global
    }

    /// Topic receiving events of one channel.
    pub fn channel(&self, channel_id: &str) -> Topic<Event> {
        self.channels.topic(channel_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_global_and_channel_topics() {
        let bus = EventBus::new();
        let (_, mut global) = bus.global().subscribe_channel();
        let (_, mut mine) = bus.channel("1337").subscribe_channel();
        let (_, mut other) = bus.channel("42").subscribe_channel();

        bus.publish(Event::login("1337", true, "welcome"));

        assert_eq!(global.recv().await.unwrap().channel_id(), "1337");
        assert_eq!(mine.recv().await.unwrap().channel_id(), "1337");
        assert!(other.try_recv().is_err());
    }
}
