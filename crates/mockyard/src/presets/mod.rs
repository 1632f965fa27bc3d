//! Presets: named sets of route-to-response bindings.
//!
//! Applying a preset computes a session-scoped override layer; it never
//! rewrites a route's `activeResponseId`.

mod apply;
mod usage;

pub use apply::{
    apply_preset, compute_overrides, diff, effective_response, PresetApplyResult,
    ResponseChange, SkipReason, SkippedBinding,
};
pub use usage::{used_in_presets, PresetUsage, UsageTarget};

use crate::error::EngineError;
use crate::project::{AppliedPreset, Preset, PresetsFolder, PresetsFolderHash};
use serde::{Deserialize, Serialize};

/// One edit of the project's preset file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "action",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum PresetFileAction {
    UpsertFolder {
        folder: PresetsFolder,
    },
    DeleteFolder {
        folder_name: String,
    },
    UpsertPreset {
        folder_name: String,
        preset: Preset,
    },
    DeletePreset {
        folder_name: String,
        preset_name: String,
    },
}

/// What an edit did to the currently applied preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AppliedPresetEffect {
    Unaffected,
    Modified,
    Removed,
}

/// Apply `action` to `presets`. `applied` is the preset currently in effect,
/// if any; the return value says how the edit affected it.
pub fn update_preset_file(
    presets: &mut PresetsFolderHash,
    action: PresetFileAction,
    applied: Option<&AppliedPreset>,
) -> Result<AppliedPresetEffect, EngineError> {
    let touches = |folder: &str, preset: Option<&str>| {
        applied.is_some_and(|a| {
            a.folder_name == folder && preset.map_or(true, |p| a.preset_name == p)
        })
    };

    match action {
        PresetFileAction::UpsertFolder { folder } => {
            if folder.name.trim().is_empty() {
                return Err(EngineError::InvalidConfig(
                    "preset folder name must not be empty".to_string(),
                ));
            }
            let name = folder.name.clone();
            let mut folder = folder;
            let keyed = std::mem::take(&mut folder.presets_hash);
            for (key, mut preset) in keyed {
                if preset.name.is_empty() {
                    preset.name = key;
                }
                folder.presets_hash.insert(preset.name.clone(), preset);
            }
            let still_has_applied = applied.is_some_and(|a| {
                a.folder_name == name && folder.presets_hash.contains_key(&a.preset_name)
            });
            presets.insert(name.clone(), folder);
            Ok(if still_has_applied {
                AppliedPresetEffect::Modified
            } else if touches(&name, None) {
                AppliedPresetEffect::Removed
            } else {
                AppliedPresetEffect::Unaffected
            })
        }
        PresetFileAction::DeleteFolder { folder_name } => {
            if presets.shift_remove(&folder_name).is_none() {
                return Err(EngineError::FolderNotFound(folder_name));
            }
            Ok(if touches(&folder_name, None) {
                AppliedPresetEffect::Removed
            } else {
                AppliedPresetEffect::Unaffected
            })
        }
        PresetFileAction::UpsertPreset {
            folder_name,
            preset,
        } => {
            if preset.name.trim().is_empty() {
                return Err(EngineError::InvalidConfig(
                    "preset name must not be empty".to_string(),
                ));
            }
            let folder = presets
                .get_mut(&folder_name)
                .ok_or_else(|| EngineError::FolderNotFound(folder_name.clone()))?;
            let preset_name = preset.name.clone();
            folder.presets_hash.insert(preset_name.clone(), preset);
            Ok(if touches(&folder_name, Some(&preset_name)) {
                AppliedPresetEffect::Modified
            } else {
                AppliedPresetEffect::Unaffected
            })
        }
        PresetFileAction::DeletePreset {
            folder_name,
            preset_name,
        } => {
            let folder = presets
                .get_mut(&folder_name)
                .ok_or_else(|| EngineError::FolderNotFound(folder_name.clone()))?;
            if folder.presets_hash.shift_remove(&preset_name).is_none() {
                return Err(EngineError::PresetNotFound {
                    folder: folder_name,
                    preset: preset_name,
                });
            }
            Ok(if touches(&folder_name, Some(&preset_name)) {
                AppliedPresetEffect::Removed
            } else {
                AppliedPresetEffect::Unaffected
            })
        }
    }
}
