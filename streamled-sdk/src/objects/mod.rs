pub mod device;
pub mod eventsub;
pub mod pubsub;

pub use device::{MessagePayload, Mode, Rgb};
pub use eventsub::{MessageType, Notification, SubscriptionType};
pub use pubsub::{ClientFrame, ResponseFrame, ServerFrame};
