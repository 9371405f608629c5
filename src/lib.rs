//! Two-party chat client.
//!
//! Logs a user in through the backend, connects to the hosted chat platform,
//! opens the channel with the counterpart and can ask the backend to seed an
//! AI conversation into it. See [`app::ChatApp`] for the entry points.

pub mod app;
pub mod backend;
pub mod channel;
pub mod config;
pub mod error;
pub mod identity;
pub mod input;
pub mod platform;
pub mod render;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use app::{Alerts, ChatApp, Phase};
pub use config::ChatConfig;
pub use error::ChatError;
