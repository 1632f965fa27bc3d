//! Inbound commands and their replies.
//!
//! Commands are JSON objects tagged by `type`:
//!
//! ```json
//! {"type": "START_SERVER", "serverName": "api"}
//! ```
//!
//! Every reply carries `success` and `hasDiffs`; failures add `reason` and a
//! machine-readable `code`, successes add command-specific fields.

mod dispatch;

pub use dispatch::dispatch;

use crate::error::EngineError;
use crate::fleet::HostIpAction;
use crate::presets::PresetFileAction;
use crate::project::{ProjectServer, ProjectTree, RouteEntity, RouteParent, ServerSettings};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum EngineCommand {
    /// Activate a registered project, or register and activate `project`.
    LoadProject {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        project: Option<ProjectTree>,
    },
    CreateServer {
        server: ProjectServer,
    },
    DeleteServer {
        server_name: String,
    },
    StartServer {
        server_name: String,
    },
    CloseServer {
        server_name: String,
    },
    RestartServer {
        server_name: String,
    },
    UpdateServerSettings {
        server_name: String,
        settings: ServerSettings,
    },
    UpsertRouteParent {
        server_name: String,
        parent: RouteParent,
    },
    DeleteRouteParent {
        server_name: String,
        parent_id: String,
    },
    UpsertRoute {
        server_name: String,
        parent_id: String,
        route: RouteEntity,
    },
    DeleteRoute {
        server_name: String,
        parent_id: String,
        route_id: String,
    },
    SetActiveResponse {
        server_name: String,
        parent_id: String,
        route_id: String,
        response_id: String,
    },
    UpdatePresetFile {
        change: PresetFileAction,
    },
    ApplyPreset {
        folder_name: String,
        preset_name: String,
    },
    ClearPreset,
    CheckServerPresetUsage {
        server_id: String,
    },
    CheckParentPresetUsage {
        parent_id: String,
    },
    CheckRoutePresetUsage {
        route_id: String,
    },
    GetLogs {
        #[serde(default)]
        project: Option<String>,
    },
    ClearLogs {
        #[serde(default)]
        project: Option<String>,
    },
    StartAll,
    CloseAll,
    MarkSaved,
    /// Answer a `HOST_IP_CHANGED` notification.
    ResolveHostIpChange {
        action: HostIpAction,
    },
}

impl EngineCommand {
    /// Wire name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineCommand::LoadProject { .. } => "LOAD_PROJECT",
            EngineCommand::CreateServer { .. } => "CREATE_SERVER",
            EngineCommand::DeleteServer { .. } => "DELETE_SERVER",
            EngineCommand::StartServer { .. } => "START_SERVER",
            EngineCommand::CloseServer { .. } => "CLOSE_SERVER",
            EngineCommand::RestartServer { .. } => "RESTART_SERVER",
            EngineCommand::UpdateServerSettings { .. } => "UPDATE_SERVER_SETTINGS",
            EngineCommand::UpsertRouteParent { .. } => "UPSERT_ROUTE_PARENT",
            EngineCommand::DeleteRouteParent { .. } => "DELETE_ROUTE_PARENT",
            EngineCommand::UpsertRoute { .. } => "UPSERT_ROUTE",
            EngineCommand::DeleteRoute { .. } => "DELETE_ROUTE",
            EngineCommand::SetActiveResponse { .. } => "SET_ACTIVE_RESPONSE",
            EngineCommand::UpdatePresetFile { .. } => "UPDATE_PRESET_FILE",
            EngineCommand::ApplyPreset { .. } => "APPLY_PRESET",
            EngineCommand::ClearPreset => "CLEAR_PRESET",
            EngineCommand::CheckServerPresetUsage { .. } => "CHECK_SERVER_PRESET_USAGE",
            EngineCommand::CheckParentPresetUsage { .. } => "CHECK_PARENT_PRESET_USAGE",
            EngineCommand::CheckRoutePresetUsage { .. } => "CHECK_ROUTE_PRESET_USAGE",
            EngineCommand::GetLogs { .. } => "GET_LOGS",
            EngineCommand::ClearLogs { .. } => "CLEAR_LOGS",
            EngineCommand::StartAll => "START_ALL",
            EngineCommand::CloseAll => "CLOSE_ALL",
            EngineCommand::MarkSaved => "MARK_SAVED",
            EngineCommand::ResolveHostIpChange { .. } => "RESOLVE_HOST_IP_CHANGE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
    pub has_diffs: bool,
}

impl CommandReply {
    pub fn ok() -> Self {
        Self {
            success: true,
            reason: None,
            code: None,
            payload: Map::new(),
            has_diffs: false,
        }
    }

    pub fn failure(err: &EngineError) -> Self {
        Self {
            success: false,
            reason: Some(err.to_string()),
            code: Some(err.code().to_string()),
            payload: Map::new(),
            has_diffs: false,
        }
    }

    /// Add a payload field.
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.payload.insert(key.to_string(), value);
        self
    }

    /// Merge the fields of a serialized object into the payload.
    pub fn merge(mut self, value: impl Serialize) -> Self {
        if let Ok(Value::Object(fields)) = serde_json::to_value(value) {
            for (key, value) in fields {
                if key != "success" {
                    self.payload.insert(key, value);
                }
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_wire_format() {
        let cmd: EngineCommand = serde_json::from_value(json!({
            "type": "APPLY_PRESET",
            "folderName": "qa",
            "presetName": "empty-list"
        }))
        .unwrap();
        assert_eq!(cmd.kind(), "APPLY_PRESET");

        let cmd: EngineCommand = serde_json::from_value(json!({"type": "CLEAR_PRESET"})).unwrap();
        assert!(matches!(cmd, EngineCommand::ClearPreset));

        let cmd: EngineCommand = serde_json::from_value(json!({
            "type": "UPDATE_PRESET_FILE",
            "change": {"action": "DELETE_FOLDER", "folderName": "qa"}
        }))
        .unwrap();
        assert!(matches!(
            cmd,
            EngineCommand::UpdatePresetFile {
                change: PresetFileAction::DeleteFolder { .. }
            }
        ));
    }

    #[test]
    fn test_upsert_route_accepts_both_route_kinds() {
        let rest: EngineCommand = serde_json::from_value(json!({
            "type": "UPSERT_ROUTE",
            "serverName": "api",
            "parentId": "users",
            "route": {"routePath": "/x", "method": "GET"}
        }))
        .unwrap();
        assert!(matches!(
            rest,
            EngineCommand::UpsertRoute {
                route: RouteEntity::Rest(_),
                ..
            }
        ));

        let gql: EngineCommand = serde_json::from_value(json!({
            "type": "UPSERT_ROUTE",
            "serverName": "api",
            "parentId": "gql",
            "route": {"name": "user", "type": "Query"}
        }))
        .unwrap();
        assert!(matches!(
            gql,
            EngineCommand::UpsertRoute {
                route: RouteEntity::GraphQl(_),
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let result: Result<EngineCommand, _> =
            serde_json::from_value(json!({"type": "REBOOT_EVERYTHING"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_reply_shape() {
        let reply = CommandReply::ok().with("port", 3000u16);
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value, json!({"success": true, "port": 3000, "hasDiffs": false}));

        let reply = CommandReply::failure(&EngineError::ServerNotFound("api".to_string()));
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(
            value,
            json!({
                "success": false,
                "reason": "Server 'api' not found",
                "code": "SERVER_NOT_FOUND",
                "hasDiffs": false
            })
        );
    }
}
