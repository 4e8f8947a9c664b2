#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod device;
pub mod events;
pub mod sources;

pub use context::Context;
