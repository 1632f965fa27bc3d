//! Reading project trees from disk.
//!
//! The engine itself never touches project files; this is the collaborator the
//! binary uses at startup.

use super::types::ProjectTree;
use anyhow::Context;
use std::path::Path;

/// Load a project tree from a `.json`, `.yaml` or `.yml` file.
///
/// A tree with an empty `name` takes the file stem as its name.
pub fn load_project_file<P: AsRef<Path>>(path: P) -> Result<ProjectTree, anyhow::Error> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read project file {}", path.display()))?;

    let mut tree = parse_project(&contents, path)
        .with_context(|| format!("Failed to parse project file {}", path.display()))?;

    if tree.name.is_empty() {
        tree.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "default".to_string());
    }
    tree.normalize();
    Ok(tree)
}

fn parse_project(contents: &str, path: &Path) -> Result<ProjectTree, anyhow::Error> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(contents)?),
        Some("json") | None => Ok(serde_json::from_str(contents)?),
        Some(other) => anyhow::bail!("Unsupported project file extension: '{other}'"),
    }
}
