//! Event model and in-process fan-out.
//!
//! # Event Flow
//!
//! 1. Chat adapter, push monitor and webhook receiver build [`Event`]s
//! 2. [`EventBus::publish`] broadcasts them on the global and channel topics
//! 3. Application logic subscribes and enqueues device commands

pub mod bus;
pub mod channels;
pub mod types;

pub use bus::{Bus, SubscriptionId, Topic};
pub use channels::EventBus;
pub use types::{
    BitsEvent, ChannelUpdateEvent, ErrorEvent, Event, EventKind, FollowEvent, LoginEvent,
    MessageEvent, RewardRedemptionEvent, Source, StreamStatusEvent, SubscriptionEvent,
};
