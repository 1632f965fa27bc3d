//! Outbound notifications.
//!
//! Every subsystem publishes onto one [`EventBus`]; the control API and the
//! binary's console logger subscribe to it.

use crate::config::AppSettings;
use crate::logs::ServerLog;
use crate::presets::PresetApplyResult;
use crate::server::ServerState;
use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// State snapshot sent to a newly attached client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitSnapshot {
    pub projects_name_list: Vec<String>,
    pub active_project: Option<String>,
    pub app_settings: AppSettings,
    /// Server name to "is running" for the active project.
    pub is_server_up: IndexMap<String, bool>,
    pub host_ip: Option<String>,
    pub has_diffs: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum EngineEvent {
    ServersConsole {
        project: String,
        log: ServerLog,
    },
    Init(InitSnapshot),
    PresetApplied {
        project: String,
        folder_name: String,
        preset_name: String,
        result: PresetApplyResult,
    },
    PresetCleared {
        project: String,
    },
    ServerState {
        project: String,
        server: String,
        state: ServerState,
        #[serde(skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    HostIpChanged {
        previous: Option<String>,
        current: String,
    },
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::ServersConsole { .. } => "SERVERS_CONSOLE",
            EngineEvent::Init(_) => "INIT",
            EngineEvent::PresetApplied { .. } => "PRESET_APPLIED",
            EngineEvent::PresetCleared { .. } => "PRESET_CLEARED",
            EngineEvent::ServerState { .. } => "SERVER_STATE",
            EngineEvent::HostIpChanged { .. } => "HOST_IP_CHANGED",
        }
    }
}

/// Broadcast channel for [`EngineEvent`]s. Cloning shares the channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Having no subscriber is not an error.
    pub fn publish(&self, event: EngineEvent) {
        let kind = event.kind();
        if self.tx.send(event).is_err() {
            trace!("No subscribers for {} event", kind);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(EngineEvent::HostIpChanged {
            previous: Some("10.0.0.1".to_string()),
            current: "10.0.0.2".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "HOST_IP_CHANGED");
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(EngineEvent::PresetCleared {
            project: "demo".to_string(),
        });
    }

    #[test]
    fn test_event_wire_shape() {
        let event = EngineEvent::ServerState {
            project: "demo".to_string(),
            server: "api".to_string(),
            state: ServerState::Running,
            port: Some(3000),
            error: None,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "SERVER_STATE",
                "project": "demo",
                "server": "api",
                "state": "running",
                "port": 3000
            })
        );
    }
}
