//! Versioned, snapshot-published project state.
//!
//! Readers take an `Arc<ProjectSnapshot>` once per request and resolve against
//! it. Writers serialize on an async mutex, build a new snapshot from a draft
//! and swap it in, so a reader never observes a half-applied change.

use super::types::{ProjectServer, ProjectTree};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Identifies one route inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub server_id: String,
    pub parent_id: String,
    pub route_id: String,
}

impl RouteKey {
    pub fn new(server_id: &str, parent_id: &str, route_id: &str) -> Self {
        Self {
            server_id: server_id.to_string(),
            parent_id: parent_id.to_string(),
            route_id: route_id.to_string(),
        }
    }
}

/// The preset currently in effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedPreset {
    pub folder_name: String,
    pub preset_name: String,
}

/// Session-scoped response overrides. Never written back into the tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresetOverrides {
    pub applied: Option<AppliedPreset>,
    pub bindings: HashMap<RouteKey, String>,
}

impl PresetOverrides {
    pub fn response_for(&self, server_id: &str, parent_id: &str, route_id: &str) -> Option<&str> {
        if self.bindings.is_empty() {
            return None;
        }
        self.bindings
            .get(&RouteKey::new(server_id, parent_id, route_id))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_none() && self.bindings.is_empty()
    }
}

/// One immutable version of a project.
#[derive(Debug)]
pub struct ProjectSnapshot {
    pub tree: Arc<ProjectTree>,
    pub overrides: Arc<PresetOverrides>,
    pub config_version: u64,
    pub saved_version: u64,
}

impl ProjectSnapshot {
    pub fn server(&self, name: &str) -> Option<&ProjectServer> {
        self.tree.servers.get(name)
    }

    /// True when the tree changed since load or the last save mark.
    pub fn has_diffs(&self) -> bool {
        self.config_version != self.saved_version
    }
}

/// Mutable working copy handed to writers. The tree is cloned lazily on the
/// first `tree_mut()` call; only tree edits bump the config version.
pub struct SnapshotDraft {
    base: Arc<ProjectSnapshot>,
    tree: Option<ProjectTree>,
    overrides: Option<PresetOverrides>,
    mark_saved: bool,
}

impl SnapshotDraft {
    fn new(base: Arc<ProjectSnapshot>) -> Self {
        Self {
            base,
            tree: None,
            overrides: None,
            mark_saved: false,
        }
    }

    pub fn tree(&self) -> &ProjectTree {
        self.tree.as_ref().unwrap_or(&self.base.tree)
    }

    pub fn tree_mut(&mut self) -> &mut ProjectTree {
        let base = &self.base;
        self.tree.get_or_insert_with(|| (*base.tree).clone())
    }

    pub fn overrides(&self) -> &PresetOverrides {
        self.overrides.as_ref().unwrap_or(&self.base.overrides)
    }

    pub fn set_overrides(&mut self, overrides: PresetOverrides) {
        self.overrides = Some(overrides);
    }

    pub fn mark_saved(&mut self) {
        self.mark_saved = true;
    }

    fn is_dirty(&self) -> bool {
        self.tree.is_some() || self.overrides.is_some() || self.mark_saved
    }

    fn finish(self) -> ProjectSnapshot {
        let tree_changed = self.tree.is_some();
        let config_version = if tree_changed {
            self.base.config_version + 1
        } else {
            self.base.config_version
        };
        ProjectSnapshot {
            tree: self.tree.map(Arc::new).unwrap_or_else(|| Arc::clone(&self.base.tree)),
            overrides: self
                .overrides
                .map(Arc::new)
                .unwrap_or_else(|| Arc::clone(&self.base.overrides)),
            config_version,
            saved_version: if self.mark_saved {
                config_version
            } else {
                self.base.saved_version
            },
        }
    }
}

/// Holder of one project's configuration and preset override layer.
pub struct ProjectStore {
    current: RwLock<Arc<ProjectSnapshot>>,
    writer: Mutex<()>,
}

impl ProjectStore {
    pub fn new(tree: ProjectTree) -> Self {
        Self {
            current: RwLock::new(Arc::new(ProjectSnapshot {
                tree: Arc::new(tree),
                overrides: Arc::new(PresetOverrides::default()),
                config_version: 0,
                saved_version: 0,
            })),
            writer: Mutex::new(()),
        }
    }

    pub fn name(&self) -> String {
        self.snapshot().tree.name.clone()
    }

    /// Current published snapshot.
    pub fn snapshot(&self) -> Arc<ProjectSnapshot> {
        Arc::clone(&*self.current.read())
    }

    /// Run `f` against a draft of the current snapshot under the writer lock.
    ///
    /// On `Ok` the draft is published as the new snapshot (if anything
    /// changed); on `Err` it is discarded and readers never see it.
    pub async fn modify<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut SnapshotDraft) -> Result<T, E>,
    {
        let _guard = self.writer.lock().await;
        let mut draft = SnapshotDraft::new(self.snapshot());
        let out = f(&mut draft)?;
        if draft.is_dirty() {
            *self.current.write() = Arc::new(draft.finish());
        }
        Ok(out)
    }
}
