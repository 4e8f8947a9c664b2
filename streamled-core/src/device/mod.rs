//! LED panel control: commands, the serial queue and the transport.

pub mod command;
pub mod queue;
pub mod transport;

pub use command::{CommandKind, DeviceCommand, EXPIRATION_WINDOW};
pub use queue::{DeviceQueue, DeviceState, DeviceWorker, QueueClosed, device_queue};
pub use transport::{DeviceTransport, MqttTransport, TransportError};
