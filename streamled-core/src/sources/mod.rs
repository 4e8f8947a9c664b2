//! Event sources: chat, push notifications and webhooks.

pub mod chat;
pub mod eventsub;
pub mod irc;
pub mod pubsub;
pub mod registrar;

pub use chat::{ChatClient, ChatError, ChatState};
pub use eventsub::{Delivery, EventSubError, EventSubReceiver};
pub use pubsub::{PubSubError, PushMonitor};
pub use registrar::{Registrar, RegistrationError};
