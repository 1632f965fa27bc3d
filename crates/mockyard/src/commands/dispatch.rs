use super::{CommandReply, EngineCommand};
use crate::error::EngineError;
use crate::fleet::FleetManager;
use crate::presets::UsageTarget;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartOutcome {
    server_name: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

fn start_outcomes(results: Vec<(String, Result<u16, EngineError>)>) -> Vec<StartOutcome> {
    results
        .into_iter()
        .map(|(server_name, result)| match result {
            Ok(port) => StartOutcome {
                server_name,
                success: true,
                port: Some(port),
                reason: None,
            },
            Err(e) => StartOutcome {
                server_name,
                success: false,
                port: None,
                reason: Some(e.to_string()),
            },
        })
        .collect()
}

/// Execute `cmd` against `fleet`. Never fails: errors become
/// `{success: false, reason}` replies.
pub async fn dispatch(fleet: &FleetManager, cmd: EngineCommand) -> CommandReply {
    let kind = cmd.kind();
    debug!("Dispatching {}", kind);

    let reply = match execute(fleet, cmd).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("{} failed: {}", kind, e);
            CommandReply::failure(&e)
        }
    };
    CommandReply {
        has_diffs: fleet.has_diffs(),
        ..reply
    }
}

async fn execute(fleet: &FleetManager, cmd: EngineCommand) -> Result<CommandReply, EngineError> {
    let reply = CommandReply::ok();
    match cmd {
        EngineCommand::LoadProject { name, project } => {
            match (project, name) {
                (Some(tree), _) => fleet.load_tree(tree).await?,
                (None, Some(name)) => fleet.load_project(&name).await?,
                (None, None) => {
                    return Err(EngineError::InvalidConfig(
                        "LOAD_PROJECT needs a name or a project".to_string(),
                    ))
                }
            }
            Ok(reply.with("init", fleet.init_snapshot()))
        }
        EngineCommand::CreateServer { server } => {
            let name = server.name.trim().to_string();
            fleet.create_server(server).await?;
            Ok(reply.with("serverName", name))
        }
        EngineCommand::DeleteServer { server_name } => {
            fleet.delete_server(&server_name).await?;
            Ok(reply)
        }
        EngineCommand::StartServer { server_name } => {
            let port = fleet.start_server(&server_name).await?;
            Ok(reply.with("port", port))
        }
        EngineCommand::CloseServer { server_name } => {
            fleet.close_server(&server_name).await?;
            Ok(reply)
        }
        EngineCommand::RestartServer { server_name } => {
            let port = fleet.restart_server(&server_name).await?;
            Ok(reply.with("port", port))
        }
        EngineCommand::UpdateServerSettings {
            server_name,
            settings,
        } => {
            let restarted = fleet.update_server_settings(&server_name, settings).await?;
            Ok(match restarted {
                Some(port) => reply.with("port", port),
                None => reply,
            })
        }
        EngineCommand::UpsertRouteParent {
            server_name,
            parent,
        } => {
            let id = fleet.upsert_route_parent(&server_name, parent).await?;
            Ok(reply.with("parentId", id))
        }
        EngineCommand::DeleteRouteParent {
            server_name,
            parent_id,
        } => {
            fleet.delete_route_parent(&server_name, &parent_id).await?;
            Ok(reply)
        }
        EngineCommand::UpsertRoute {
            server_name,
            parent_id,
            route,
        } => {
            let id = fleet.upsert_route(&server_name, &parent_id, route).await?;
            Ok(reply.with("routeId", id))
        }
        EngineCommand::DeleteRoute {
            server_name,
            parent_id,
            route_id,
        } => {
            fleet
                .delete_route(&server_name, &parent_id, &route_id)
                .await?;
            Ok(reply)
        }
        EngineCommand::SetActiveResponse {
            server_name,
            parent_id,
            route_id,
            response_id,
        } => {
            fleet
                .set_active_response(&server_name, &parent_id, &route_id, &response_id)
                .await?;
            Ok(reply)
        }
        EngineCommand::UpdatePresetFile { change } => {
            let effect = fleet.update_preset_file(change).await?;
            Ok(reply.with("appliedPreset", effect))
        }
        EngineCommand::ApplyPreset {
            folder_name,
            preset_name,
        } => {
            let result = fleet.apply_preset(&folder_name, &preset_name).await?;
            Ok(reply.merge(result))
        }
        EngineCommand::ClearPreset => {
            let changes = fleet.clear_preset().await?;
            Ok(reply.with("changes", changes))
        }
        EngineCommand::CheckServerPresetUsage { server_id } => {
            let usages = fleet.preset_usage(UsageTarget::Server(&server_id))?;
            Ok(reply.with("usedInPresets", usages))
        }
        EngineCommand::CheckParentPresetUsage { parent_id } => {
            let usages = fleet.preset_usage(UsageTarget::Parent(&parent_id))?;
            Ok(reply.with("usedInPresets", usages))
        }
        EngineCommand::CheckRoutePresetUsage { route_id } => {
            let usages = fleet.preset_usage(UsageTarget::Route(&route_id))?;
            Ok(reply.with("usedInPresets", usages))
        }
        EngineCommand::GetLogs { project } => {
            let logs = fleet.get_logs(project.as_deref())?;
            Ok(reply.with("logs", logs))
        }
        EngineCommand::ClearLogs { project } => {
            fleet.clear_logs(project.as_deref())?;
            Ok(reply)
        }
        EngineCommand::StartAll => {
            let results = fleet.start_all().await?;
            Ok(reply.with("results", start_outcomes(results)))
        }
        EngineCommand::CloseAll => {
            fleet.close_all().await?;
            Ok(reply)
        }
        EngineCommand::MarkSaved => {
            fleet.mark_saved().await?;
            Ok(reply)
        }
        EngineCommand::ResolveHostIpChange { action } => {
            let results = fleet.resolve_host_ip_change(action).await?;
            Ok(reply.with("results", start_outcomes(results)))
        }
    }
}
