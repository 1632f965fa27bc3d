//! FleetManager - owns the active project and the server instances serving it.

use super::host_ip::{self, HostIpAction, HostIpChange};
use crate::config::AppSettings;
use crate::error::EngineError;
use crate::events::{EngineEvent, EventBus, InitSnapshot};
use crate::executor::{build_client, ResponseExecutor};
use crate::logs::{LogRegistry, ServerLog};
use crate::metrics;
use crate::presets::{
    self, AppliedPresetEffect, PresetApplyResult, PresetFileAction, PresetUsage, ResponseChange,
    UsageTarget,
};
use crate::project::{
    rekey_responses, PresetOverrides, ProjectServer, ProjectSnapshot, ProjectStore, ProjectTree,
    RouteEntity, RouteKey, RouteParent, ServerSettings, SnapshotDraft,
};
use crate::server::{InstanceContext, ServerInstance, ServerState, ServerStatus};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The loaded project: its store plus one instance per server.
pub struct ProjectRuntime {
    name: String,
    store: Arc<ProjectStore>,
    instances: RwLock<IndexMap<String, Arc<ServerInstance>>>,
}

impl ProjectRuntime {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<ProjectStore> {
        &self.store
    }

    fn instances(&self) -> Vec<Arc<ServerInstance>> {
        self.instances.read().values().cloned().collect()
    }
}

pub struct FleetManager {
    settings: AppSettings,
    /// Every project known to the engine, by name. The active project's
    /// entry is refreshed from its store when another project is loaded.
    library: RwLock<IndexMap<String, ProjectTree>>,
    active: RwLock<Option<Arc<ProjectRuntime>>>,
    /// Serializes project activation and the port check preceding a start.
    start_gate: tokio::sync::Mutex<()>,
    logs: Arc<LogRegistry>,
    events: EventBus,
    executor: ResponseExecutor,
    host_ip: Mutex<Option<String>>,
}

impl FleetManager {
    pub fn new(settings: AppSettings) -> anyhow::Result<Self> {
        let events = EventBus::new();
        let timeout = Duration::from_secs(settings.proxy_timeout_secs);
        let client = build_client(timeout)?;
        Ok(Self {
            logs: Arc::new(LogRegistry::new(settings.log_capacity, events.clone())),
            executor: ResponseExecutor::new(client, timeout),
            settings,
            library: RwLock::new(IndexMap::new()),
            active: RwLock::new(None),
            start_gate: tokio::sync::Mutex::new(()),
            events,
            host_ip: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn project_names(&self) -> Vec<String> {
        self.library.read().keys().cloned().collect()
    }

    pub fn active_project(&self) -> Option<String> {
        self.active.read().as_ref().map(|r| r.name.clone())
    }

    /// Add `tree` to the project library without activating it. Registering
    /// under the active project's name does not affect the running project.
    pub fn register_project(&self, mut tree: ProjectTree) -> Result<String, EngineError> {
        if tree.name.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "project name must not be empty".to_string(),
            ));
        }
        tree.normalize();
        let name = tree.name.clone();
        self.library.write().insert(name.clone(), tree);
        debug!("Project '{}' registered", name);
        Ok(name)
    }

    /// Make the registered project `name` the active one.
    pub async fn load_project(&self, name: &str) -> Result<(), EngineError> {
        self.activate(name, None).await
    }

    /// Register `tree` and make it the active project.
    pub async fn load_tree(&self, tree: ProjectTree) -> Result<(), EngineError> {
        if tree.name.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "project name must not be empty".to_string(),
            ));
        }
        let name = tree.name.clone();
        self.activate(&name, Some(tree)).await
    }

    async fn activate(&self, name: &str, tree: Option<ProjectTree>) -> Result<(), EngineError> {
        let _gate = self.start_gate.lock().await;

        if tree.is_none() && !self.library.read().contains_key(name) {
            return Err(EngineError::ProjectNotLoaded(name.to_string()));
        }

        let previous = self.active.write().take();
        if let Some(previous) = previous {
            for instance in previous.instances() {
                instance.stop().await;
            }
            let tree = previous.store.snapshot().tree.as_ref().clone();
            self.library.write().insert(previous.name.clone(), tree);
            info!("Project '{}' unloaded", previous.name);
        }

        if let Some(tree) = tree {
            self.register_project(tree)?;
        }
        let tree = self
            .library
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::ProjectNotLoaded(name.to_string()))?;

        let store = Arc::new(ProjectStore::new(tree));
        let runtime = Arc::new(ProjectRuntime {
            name: name.to_string(),
            store: Arc::clone(&store),
            instances: RwLock::new(IndexMap::new()),
        });
        let server_names: Vec<String> = store.snapshot().tree.servers.keys().cloned().collect();
        for server in server_names {
            let instance = self.new_instance(&runtime, &server);
            runtime.instances.write().insert(server, instance);
        }
        *self.active.write() = Some(runtime);

        info!("Project '{}' loaded", name);
        self.publish_init();
        Ok(())
    }

    fn new_instance(&self, runtime: &ProjectRuntime, server: &str) -> Arc<ServerInstance> {
        Arc::new(ServerInstance::new(
            server,
            InstanceContext {
                project: runtime.name.clone(),
                store: Arc::clone(&runtime.store),
                executor: self.executor.clone(),
                logs: Arc::clone(&self.logs),
                events: self.events.clone(),
                bind_host: self.settings.bind_host.clone(),
                max_body_bytes: self.settings.max_request_body_bytes,
            },
        ))
    }

    pub fn runtime(&self) -> Result<Arc<ProjectRuntime>, EngineError> {
        self.active
            .read()
            .as_ref()
            .cloned()
            .ok_or(EngineError::NoActiveProject)
    }

    pub fn snapshot(&self) -> Result<Arc<ProjectSnapshot>, EngineError> {
        Ok(self.runtime()?.store.snapshot())
    }

    /// True when the active project changed since it was loaded or last
    /// marked saved.
    pub fn has_diffs(&self) -> bool {
        self.snapshot().map(|s| s.has_diffs()).unwrap_or(false)
    }

    pub fn instance(&self, name: &str) -> Result<Arc<ServerInstance>, EngineError> {
        self.runtime()?
            .instances
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::ServerNotFound(name.to_string()))
    }

    pub fn server_statuses(&self) -> Vec<ServerStatus> {
        self.runtime()
            .map(|r| r.instances().iter().map(|i| i.status()).collect())
            .unwrap_or_default()
    }

    // --- servers ---

    pub async fn create_server(&self, mut server: ProjectServer) -> Result<(), EngineError> {
        let name = server.name.trim().to_string();
        if name.is_empty() {
            return Err(EngineError::InvalidConfig(
                "server name must not be empty".to_string(),
            ));
        }
        server.name = name.clone();
        server.normalize();

        let runtime = self.runtime()?;
        runtime
            .store
            .modify(|draft| {
                if draft.tree().servers.contains_key(&name) {
                    return Err(EngineError::ServerExists(name.clone()));
                }
                draft.tree_mut().servers.insert(name.clone(), server);
                Ok(())
            })
            .await?;

        let instance = self.new_instance(&runtime, &name);
        runtime.instances.write().insert(name.clone(), instance);
        info!("Server '{}' created in '{}'", name, runtime.name);
        Ok(())
    }

    pub async fn delete_server(&self, name: &str) -> Result<(), EngineError> {
        let runtime = self.runtime()?;
        let instance = self.instance(name)?;
        instance.stop().await;

        runtime
            .store
            .modify(|draft| {
                draft.tree_mut().servers.shift_remove(name);
                prune_overrides(draft, |key| key.server_id == name);
                Ok::<_, EngineError>(())
            })
            .await?;
        runtime.instances.write().shift_remove(name);
        info!("Server '{}' deleted from '{}'", name, runtime.name);
        Ok(())
    }

    /// Replace a server's settings. A running server is restarted so the
    /// new port and proxy settings take effect; the new port is returned.
    pub async fn update_server_settings(
        &self,
        name: &str,
        settings: ServerSettings,
    ) -> Result<Option<u16>, EngineError> {
        let runtime = self.runtime()?;
        let instance = self.instance(name)?;
        runtime
            .store
            .modify(|draft| {
                let server = draft
                    .tree_mut()
                    .servers
                    .get_mut(name)
                    .ok_or_else(|| EngineError::ServerNotFound(name.to_string()))?;
                server.settings = settings;
                Ok::<_, EngineError>(())
            })
            .await?;

        if instance.state() == ServerState::Running {
            debug!("Restarting server '{}' after settings change", name);
            return self.restart_server(name).await.map(Some);
        }
        Ok(None)
    }

    /// Start a server on its configured port. Fails with `PortConflict` if
    /// another running server of the project holds the port.
    pub async fn start_server(&self, name: &str) -> Result<u16, EngineError> {
        let _gate = self.start_gate.lock().await;
        self.start_locked(name).await
    }

    async fn start_locked(&self, name: &str) -> Result<u16, EngineError> {
        let runtime = self.runtime()?;
        let instance = self.instance(name)?;
        if instance.state().is_up() {
            return Err(EngineError::AlreadyRunning(name.to_string()));
        }

        let snapshot = runtime.store.snapshot();
        let settings = &snapshot
            .server(name)
            .ok_or_else(|| EngineError::ServerNotFound(name.to_string()))?
            .settings;

        let port = settings.port;
        if port != 0 {
            for other in runtime.instances() {
                if other.name() == name || !other.state().is_up() {
                    continue;
                }
                let other_port = other
                    .bound_port()
                    .or_else(|| snapshot.server(other.name()).map(|s| s.settings.port));
                if other_port == Some(port) {
                    let err = EngineError::PortConflict {
                        port,
                        owner: other.name().to_string(),
                    };
                    warn!("Cannot start server '{}': {}", name, err);
                    return Err(err);
                }
            }
        }

        if let Err(err) = validate_proxy(name, settings) {
            warn!("Cannot start server '{}': {}", name, err);
            instance.fail(&err.to_string());
            return Err(err);
        }

        instance.start(port).await
    }

    pub async fn close_server(&self, name: &str) -> Result<(), EngineError> {
        self.instance(name)?.stop().await;
        Ok(())
    }

    pub async fn restart_server(&self, name: &str) -> Result<u16, EngineError> {
        self.instance(name)?.stop().await;
        self.start_server(name).await
    }

    /// Start every server that is not already up, in project order.
    pub async fn start_all(&self) -> Result<Vec<(String, Result<u16, EngineError>)>, EngineError> {
        let runtime = self.runtime()?;
        let mut results = Vec::new();
        for instance in runtime.instances() {
            if instance.state().is_up() {
                continue;
            }
            let name = instance.name().to_string();
            let result = self.start_server(&name).await;
            results.push((name, result));
        }
        Ok(results)
    }

    pub async fn close_all(&self) -> Result<(), EngineError> {
        for instance in self.runtime()?.instances() {
            instance.stop().await;
        }
        Ok(())
    }

    /// Restart every running server, e.g. after the host address changed.
    pub async fn restart_running(
        &self,
    ) -> Result<Vec<(String, Result<u16, EngineError>)>, EngineError> {
        let mut results = Vec::new();
        for instance in self.runtime()?.instances() {
            if instance.state() != ServerState::Running {
                continue;
            }
            let name = instance.name().to_string();
            let result = self.restart_server(&name).await;
            results.push((name, result));
        }
        Ok(results)
    }

    // --- routes ---

    /// Insert or replace a route parent. A parent without an id gets one;
    /// the id is returned.
    pub async fn upsert_route_parent(
        &self,
        server: &str,
        mut parent: RouteParent,
    ) -> Result<String, EngineError> {
        parent.normalize("");
        let id = parent.id().to_string();
        self.runtime()?
            .store
            .modify(|draft| {
                server_mut(draft, server)?
                    .parent_routes_hash
                    .insert(id.clone(), parent);
                Ok::<_, EngineError>(())
            })
            .await?;
        Ok(id)
    }

    pub async fn delete_route_parent(&self, server: &str, parent_id: &str) -> Result<(), EngineError> {
        self.runtime()?
            .store
            .modify(|draft| {
                server_mut(draft, server)?
                    .parent_routes_hash
                    .shift_remove(parent_id)
                    .ok_or_else(|| EngineError::ParentNotFound(parent_id.to_string()))?;
                prune_overrides(draft, |key| {
                    key.server_id == server && key.parent_id == parent_id
                });
                Ok(())
            })
            .await
    }

    /// Insert or replace a route under `parent_id`. The route kind must match
    /// the parent kind. Returns the route id.
    pub async fn upsert_route(
        &self,
        server: &str,
        parent_id: &str,
        route: RouteEntity,
    ) -> Result<String, EngineError> {
        self.runtime()?
            .store
            .modify(|draft| {
                let parent = server_mut(draft, server)?
                    .parent_routes_hash
                    .get_mut(parent_id)
                    .ok_or_else(|| EngineError::ParentNotFound(parent_id.to_string()))?;
                match (parent, route) {
                    (RouteParent::Rest(parent), RouteEntity::Rest(mut route)) => {
                        if route.id.is_empty() {
                            route.id = crate::project::new_id();
                        }
                        rekey_responses(&mut route.responses_hash);
                        let id = route.id.clone();
                        parent.routes_hash.insert(id.clone(), route);
                        Ok(id)
                    }
                    (RouteParent::GraphQl(parent), RouteEntity::GraphQl(mut route)) => {
                        if route.id.is_empty() {
                            route.id = crate::project::new_id();
                        }
                        rekey_responses(&mut route.responses_hash);
                        let id = route.id.clone();
                        parent.graph_ql_route_hash.insert(id.clone(), route);
                        Ok(id)
                    }
                    (parent, _) => Err(EngineError::ParentTypeMismatch {
                        parent: parent_id.to_string(),
                        actual: parent.kind_name().to_string(),
                    }),
                }
            })
            .await
    }

    pub async fn delete_route(
        &self,
        server: &str,
        parent_id: &str,
        route_id: &str,
    ) -> Result<(), EngineError> {
        self.runtime()?
            .store
            .modify(|draft| {
                let parent = server_mut(draft, server)?
                    .parent_routes_hash
                    .get_mut(parent_id)
                    .ok_or_else(|| EngineError::ParentNotFound(parent_id.to_string()))?;
                let removed = match parent {
                    RouteParent::Rest(p) => p.routes_hash.shift_remove(route_id).is_some(),
                    RouteParent::GraphQl(p) => {
                        p.graph_ql_route_hash.shift_remove(route_id).is_some()
                    }
                };
                if !removed {
                    return Err(EngineError::RouteNotFound(route_id.to_string()));
                }
                prune_overrides(draft, |key| {
                    key.server_id == server && key.parent_id == parent_id && key.route_id == route_id
                });
                Ok(())
            })
            .await
    }

    /// Change the response a route serves when no preset overrides it.
    pub async fn set_active_response(
        &self,
        server: &str,
        parent_id: &str,
        route_id: &str,
        response_id: &str,
    ) -> Result<(), EngineError> {
        self.runtime()?
            .store
            .modify(|draft| {
                let parent = server_mut(draft, server)?
                    .parent_routes_hash
                    .get_mut(parent_id)
                    .ok_or_else(|| EngineError::ParentNotFound(parent_id.to_string()))?;
                let (active, responses) = match parent {
                    RouteParent::Rest(p) => p
                        .routes_hash
                        .get_mut(route_id)
                        .map(|r| (&mut r.active_response_id, &r.responses_hash)),
                    RouteParent::GraphQl(p) => p
                        .graph_ql_route_hash
                        .get_mut(route_id)
                        .map(|r| (&mut r.active_response_id, &r.responses_hash)),
                }
                .ok_or_else(|| EngineError::RouteNotFound(route_id.to_string()))?;
                if !responses.contains_key(response_id) {
                    return Err(EngineError::ResponseNotFound(response_id.to_string()));
                }
                *active = response_id.to_string();
                Ok(())
            })
            .await
    }

    // --- presets ---

    /// Apply a preset as one snapshot swap. The previous override set is
    /// replaced, not merged.
    pub async fn apply_preset(
        &self,
        folder_name: &str,
        preset_name: &str,
    ) -> Result<PresetApplyResult, EngineError> {
        let runtime = self.runtime()?;
        let result = runtime
            .store
            .modify(|draft| {
                let (overrides, result) = {
                    let tree = draft.tree();
                    let folder = tree
                        .presets
                        .get(folder_name)
                        .ok_or_else(|| EngineError::FolderNotFound(folder_name.to_string()))?;
                    let preset = folder.presets_hash.get(preset_name).ok_or_else(|| {
                        EngineError::PresetNotFound {
                            folder: folder_name.to_string(),
                            preset: preset_name.to_string(),
                        }
                    })?;
                    presets::apply_preset(tree, draft.overrides(), folder_name, preset)
                };
                draft.set_overrides(overrides);
                Ok::<_, EngineError>(result)
            })
            .await?;

        info!(
            "Preset '{}/{}' applied to '{}': {} route(s), {} skipped",
            folder_name,
            preset_name,
            runtime.name,
            result.applied_count,
            result.skipped.len()
        );
        metrics::record_preset_applied(&runtime.name);
        self.events.publish(EngineEvent::PresetApplied {
            project: runtime.name.clone(),
            folder_name: folder_name.to_string(),
            preset_name: preset_name.to_string(),
            result: result.clone(),
        });
        Ok(result)
    }

    /// Drop the override layer; every route serves its active response again.
    pub async fn clear_preset(&self) -> Result<Vec<ResponseChange>, EngineError> {
        let runtime = self.runtime()?;
        let changes = runtime
            .store
            .modify(|draft| {
                let cleared = PresetOverrides::default();
                let changes = presets::diff(draft.tree(), draft.overrides(), &cleared);
                if *draft.overrides() != cleared {
                    draft.set_overrides(cleared);
                }
                Ok::<_, EngineError>(changes)
            })
            .await?;

        info!("Preset cleared on '{}'", runtime.name);
        self.events.publish(EngineEvent::PresetCleared {
            project: runtime.name.clone(),
        });
        Ok(changes)
    }

    /// Edit the preset file. Editing the applied preset re-applies it;
    /// deleting it clears the override layer.
    pub async fn update_preset_file(
        &self,
        action: PresetFileAction,
    ) -> Result<AppliedPresetEffect, EngineError> {
        let runtime = self.runtime()?;
        let effect = runtime
            .store
            .modify(|draft| {
                let applied = draft.overrides().applied.clone();
                let effect = presets::update_preset_file(
                    &mut draft.tree_mut().presets,
                    action,
                    applied.as_ref(),
                )?;
                match (effect, applied) {
                    (AppliedPresetEffect::Removed, _) => {
                        draft.set_overrides(PresetOverrides::default());
                    }
                    (AppliedPresetEffect::Modified, Some(applied)) => {
                        let overrides = {
                            let tree = draft.tree();
                            tree.presets
                                .get(&applied.folder_name)
                                .and_then(|f| f.presets_hash.get(&applied.preset_name))
                                .map(|preset| {
                                    presets::compute_overrides(tree, &applied.folder_name, preset).0
                                })
                        };
                        draft.set_overrides(overrides.unwrap_or_default());
                    }
                    _ => {}
                }
                Ok::<_, EngineError>(effect)
            })
            .await?;

        if effect == AppliedPresetEffect::Removed {
            info!("Applied preset of '{}' was removed", runtime.name);
            self.events.publish(EngineEvent::PresetCleared {
                project: runtime.name.clone(),
            });
        }
        Ok(effect)
    }

    pub fn preset_usage(&self, target: UsageTarget<'_>) -> Result<Vec<PresetUsage>, EngineError> {
        let snapshot = self.snapshot()?;
        Ok(presets::used_in_presets(&snapshot.tree, target))
    }

    // --- logs ---

    /// Logs of `project`, or of the active project when `None`.
    pub fn get_logs(&self, project: Option<&str>) -> Result<Vec<ServerLog>, EngineError> {
        let project = self.project_or_active(project)?;
        Ok(self.logs.get(&project))
    }

    pub fn clear_logs(&self, project: Option<&str>) -> Result<(), EngineError> {
        let project = self.project_or_active(project)?;
        self.logs.clear(&project);
        Ok(())
    }

    fn project_or_active(&self, project: Option<&str>) -> Result<String, EngineError> {
        match project {
            Some(name) => Ok(name.to_string()),
            None => self.active_project().ok_or(EngineError::NoActiveProject),
        }
    }

    pub async fn mark_saved(&self) -> Result<(), EngineError> {
        self.runtime()?
            .store
            .modify(|draft| {
                draft.mark_saved();
                Ok::<_, EngineError>(())
            })
            .await
    }

    // --- notifications ---

    pub fn init_snapshot(&self) -> InitSnapshot {
        let active = self.active.read().clone();
        let is_server_up = active
            .as_ref()
            .map(|r| {
                r.instances
                    .read()
                    .iter()
                    .map(|(name, i)| (name.clone(), i.state() == ServerState::Running))
                    .collect()
            })
            .unwrap_or_default();
        InitSnapshot {
            projects_name_list: self.project_names(),
            active_project: active.as_ref().map(|r| r.name.clone()),
            app_settings: self.settings.clone(),
            is_server_up,
            host_ip: self.host_ip(),
            has_diffs: self.has_diffs(),
        }
    }

    pub fn publish_init(&self) {
        self.events.publish(EngineEvent::Init(self.init_snapshot()));
    }

    pub fn host_ip(&self) -> Option<String> {
        self.host_ip.lock().clone()
    }

    /// Record the current host address. A change from a previously observed
    /// address is published as `HOST_IP_CHANGED`; the caller then decides
    /// between [`HostIpAction::Restart`] and [`HostIpAction::Close`].
    pub fn observe_host_ip(&self, current: &str) -> Option<HostIpChange> {
        let change = host_ip::compare(&mut self.host_ip.lock(), current);
        if let Some(change) = &change {
            warn!(
                "Host IP changed from {:?} to {}",
                change.previous, change.current
            );
            self.events.publish(EngineEvent::HostIpChanged {
                previous: change.previous.clone(),
                current: change.current.clone(),
            });
        }
        change
    }

    pub async fn resolve_host_ip_change(
        &self,
        action: HostIpAction,
    ) -> Result<Vec<(String, Result<u16, EngineError>)>, EngineError> {
        match action {
            HostIpAction::Restart => self.restart_running().await,
            HostIpAction::Close => self.close_all().await.map(|_| Vec::new()),
        }
    }

    /// Poll the host address every `hostIpPollSecs` until `shutdown` fires.
    /// Returns `None` when polling is disabled.
    pub fn spawn_host_ip_watcher(
        self: &Arc<Self>,
        shutdown: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        if self.settings.host_ip_poll_secs == 0 {
            return None;
        }
        let fleet = Arc::clone(self);
        let period = Duration::from_secs(self.settings.host_ip_poll_secs);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if let Some(ip) = host_ip::detect_host_ip().await {
                            fleet.observe_host_ip(&ip.to_string());
                        }
                    }
                }
            }
            debug!("Host IP watcher stopped");
        }))
    }
}

fn server_mut<'a>(
    draft: &'a mut SnapshotDraft,
    server: &str,
) -> Result<&'a mut ProjectServer, EngineError> {
    draft
        .tree_mut()
        .servers
        .get_mut(server)
        .ok_or_else(|| EngineError::ServerNotFound(server.to_string()))
}

/// Drop override bindings for routes that no longer exist.
fn prune_overrides(draft: &mut SnapshotDraft, removed: impl Fn(&RouteKey) -> bool) {
    if !draft.overrides().bindings.keys().any(&removed) {
        return;
    }
    let mut overrides = draft.overrides().clone();
    overrides.bindings.retain(|key, _| !removed(key));
    draft.set_overrides(overrides);
}

fn validate_proxy(server: &str, settings: &ServerSettings) -> Result<(), EngineError> {
    let misconfigured = |reason: String| EngineError::ProxyMisconfigured {
        server: server.to_string(),
        reason,
    };
    match settings.proxy_base() {
        Some(base) => {
            let url = reqwest::Url::parse(base)
                .map_err(|e| misconfigured(format!("invalid proxyBaseUrl '{}': {}", base, e)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(misconfigured(format!(
                    "unsupported proxyBaseUrl scheme '{}'",
                    url.scheme()
                )));
            }
            Ok(())
        }
        None if settings.force_proxy => Err(misconfigured(
            "forceProxy is set but proxyBaseUrl is empty".to_string(),
        )),
        None => Ok(()),
    }
}
