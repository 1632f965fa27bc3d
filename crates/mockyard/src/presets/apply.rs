//! Computing the override set of a preset.
//!
//! Pure functions over a tree; the fleet publishes the result as one snapshot.

use crate::project::{AppliedPreset, Preset, PresetOverrides, ProjectTree, RouteKey};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    ServerNotFound,
    ParentNotFound,
    RouteNotFound,
    ResponseNotFound,
}

/// A binding that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedBinding {
    pub server_id: String,
    pub parent_id: String,
    pub route_id: String,
    pub response_id: String,
    pub reason: SkipReason,
}

/// A route whose served response changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseChange {
    pub server_id: String,
    pub parent_id: String,
    pub route_id: String,
    pub from_response_id: Option<String>,
    pub to_response_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetApplyResult {
    pub success: bool,
    pub applied_count: usize,
    pub skipped: Vec<SkippedBinding>,
    pub changes: Vec<ResponseChange>,
}

/// Validate every binding of `preset` against `tree` and build the override
/// set. Invalid bindings are reported, never fatal. When several bindings
/// target the same route the last valid one wins.
pub fn compute_overrides(
    tree: &ProjectTree,
    folder_name: &str,
    preset: &Preset,
) -> (PresetOverrides, Vec<SkippedBinding>) {
    let mut bindings = HashMap::new();
    let mut skipped = Vec::new();

    for binding in &preset.routes {
        let reason = match tree.servers.get(&binding.server_id) {
            None => Some(SkipReason::ServerNotFound),
            Some(server) => match server.parent(&binding.parent_id) {
                None => Some(SkipReason::ParentNotFound),
                Some(_) => match server.route(&binding.parent_id, &binding.route_id) {
                    None => Some(SkipReason::RouteNotFound),
                    Some(route) if route.response(&binding.response_id).is_none() => {
                        Some(SkipReason::ResponseNotFound)
                    }
                    Some(_) => None,
                },
            },
        };

        match reason {
            Some(reason) => skipped.push(SkippedBinding {
                server_id: binding.server_id.clone(),
                parent_id: binding.parent_id.clone(),
                route_id: binding.route_id.clone(),
                response_id: binding.response_id.clone(),
                reason,
            }),
            None => {
                bindings.insert(
                    RouteKey::new(&binding.server_id, &binding.parent_id, &binding.route_id),
                    binding.response_id.clone(),
                );
            }
        }
    }

    let overrides = PresetOverrides {
        applied: Some(AppliedPreset {
            folder_name: folder_name.to_string(),
            preset_name: preset.name.clone(),
        }),
        bindings,
    };
    (overrides, skipped)
}

/// Response a route serves under `overrides`, ignoring stale overrides.
pub fn effective_response(
    tree: &ProjectTree,
    overrides: &PresetOverrides,
    key: &RouteKey,
) -> Option<String> {
    let route = tree
        .servers
        .get(&key.server_id)?
        .route(&key.parent_id, &key.route_id)?;
    let chosen = overrides
        .response_for(&key.server_id, &key.parent_id, &key.route_id)
        .filter(|id| route.response(id).is_some())
        .unwrap_or_else(|| route.active_response_id());
    route.response(chosen).map(|r| r.id.clone())
}

/// Routes whose effective response differs between `before` and `after`.
pub fn diff(
    tree: &ProjectTree,
    before: &PresetOverrides,
    after: &PresetOverrides,
) -> Vec<ResponseChange> {
    let mut keys: Vec<&RouteKey> = after.bindings.keys().chain(before.bindings.keys()).collect();
    let mut seen = HashSet::new();
    keys.retain(|k| seen.insert(*k));
    keys.sort_by(|a, b| {
        (&a.server_id, &a.parent_id, &a.route_id).cmp(&(&b.server_id, &b.parent_id, &b.route_id))
    });

    keys.into_iter()
        .filter_map(|key| {
            let from = effective_response(tree, before, key);
            let to = effective_response(tree, after, key);
            (from != to).then(|| ResponseChange {
                server_id: key.server_id.clone(),
                parent_id: key.parent_id.clone(),
                route_id: key.route_id.clone(),
                from_response_id: from,
                to_response_id: to,
            })
        })
        .collect()
}

/// Build the new override set and the apply result for `preset`.
pub fn apply_preset(
    tree: &ProjectTree,
    current: &PresetOverrides,
    folder_name: &str,
    preset: &Preset,
) -> (PresetOverrides, PresetApplyResult) {
    let (overrides, skipped) = compute_overrides(tree, folder_name, preset);
    let changes = diff(tree, current, &overrides);
    let result = PresetApplyResult {
        success: true,
        applied_count: overrides.bindings.len(),
        skipped,
        changes,
    };
    (overrides, result)
}
