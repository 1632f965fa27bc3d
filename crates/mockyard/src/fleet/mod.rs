//! Server fleet: the active project, its server instances and the host
//! address watcher.

mod host_ip;
mod manager;

#[cfg(test)]
mod tests;

pub use host_ip::{detect_host_ip, HostIpAction, HostIpChange};
pub use manager::{FleetManager, ProjectRuntime};
