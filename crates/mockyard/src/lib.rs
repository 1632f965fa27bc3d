//! Mockyard: mock request resolution and server lifecycle engine.
//!
//! A project defines mock servers, each with REST and GraphQL routes and
//! several candidate responses per route. The engine runs one listener per
//! server, resolves every inbound request to a static, scripted or proxied
//! response, and records what it did in a per-project log buffer.

pub mod commands;
pub mod config;
pub mod control_api;
pub mod error;
pub mod events;
pub mod executor;
pub mod fleet;
pub mod logs;
pub mod matcher;
pub mod metrics;
pub mod presets;
pub mod project;
pub mod selector;
pub mod server;

#[cfg(test)]
mod test_support;

pub use commands::{dispatch, CommandReply, EngineCommand};
pub use error::EngineError;
pub use events::{EngineEvent, EventBus};
pub use fleet::FleetManager;
