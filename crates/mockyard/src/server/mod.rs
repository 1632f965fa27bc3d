//! Mock server instances and their request pipeline.

mod handler;
pub mod headers;
mod instance;


pub use handler::handle_request;
pub use instance::{InstanceContext, ServerInstance, ServerState, ServerStatus};
