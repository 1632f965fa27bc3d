//! Static checks for Mockyard project files.
//!
//! Catches problems before a project reaches the engine: duplicate ports,
//! malformed routes, dangling `activeResponseId`s, invalid proxy URLs and
//! preset bindings that would be skipped when applied.
//!
//! # Example
//!
//! ```no_run
//! use mockyard_lint::{lint_directory, lint_file, LintOptions};
//! use std::path::Path;
//!
//! let result = lint_file(Path::new("shop.json"), &LintOptions::default());
//! let all = lint_directory(Path::new("./projects"), &LintOptions::default());
//!
//! if result.has_errors() || all.has_errors() {
//!     eprintln!("Found {} errors", result.errors + all.errors);
//! }
//! ```

mod types;
mod validator;

use std::path::Path;
use thiserror::Error;

pub use types::{LintIssue, LintOptions, LintResult, Severity};

pub use validator::{
    check_port_conflicts, validate_graphql_route, validate_headers, validate_mock_response,
    validate_parent, validate_presets, validate_project, validate_responses, validate_rest_route,
    validate_server, ServerContext, TreeIndex,
};

/// Why a file could not be turned into a JSON value.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Unsupported file extension: '{0}'")]
    Extension(String),
}

impl LoadError {
    fn code(&self) -> &'static str {
        match self {
            LoadError::Io(_) | LoadError::Extension(_) => "E001",
            LoadError::Json(_) | LoadError::Yaml(_) => "E002",
        }
    }

    fn into_issue(self, path: &Path) -> LintIssue {
        LintIssue::error(self.code(), self.to_string(), path.to_path_buf())
    }
}

/// Whether `path` has an extension the linter reads.
pub fn is_project_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json") | Some("yaml") | Some("yml")
    )
}

/// Read and parse a project file (`.json`, `.yaml`, `.yml`) into a JSON value.
pub fn load_value(path: &Path) -> Result<serde_json::Value, LoadError> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
        Some("json") | None => Ok(serde_json::from_str(&content)?),
        Some(other) => Err(LoadError::Extension(other.to_string())),
    }
}

/// Lint a single project file.
pub fn lint_file(path: &Path, options: &LintOptions) -> LintResult {
    let mut result = LintResult::new();
    result.files_checked = 1;

    match load_value(path) {
        Ok(value) => validator::validate_project(path, &value, &mut result, options),
        Err(e) => result.add_issue(e.into_issue(path)),
    }
    result
}

/// Lint every project file in a directory (non-recursive), in name order.
pub fn lint_directory(path: &Path, options: &LintOptions) -> LintResult {
    let mut result = LintResult::new();

    let entries = match std::fs::read_dir(path) {
        Ok(e) => e,
        Err(e) => {
            result.add_issue(LintIssue::error(
                "E001",
                format!("Failed to read directory: {e}"),
                path.to_path_buf(),
            ));
            return result;
        }
    };

    let mut files: Vec<_> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && is_project_file(p))
        .collect();
    files.sort();

    for file in files {
        result.merge(lint_file(&file, options));
    }
    result
}

/// Lint a JSON string (for in-memory validation).
pub fn lint_json(json: &str, source_name: &str, options: &LintOptions) -> LintResult {
    let path = Path::new(source_name);
    match serde_json::from_str::<serde_json::Value>(json) {
        Ok(value) => lint_value(&value, source_name, options),
        Err(e) => {
            let mut result = LintResult::new();
            result.files_checked = 1;
            result.add_issue(LoadError::from(e).into_issue(path));
            result
        }
    }
}

/// Lint an already parsed project value.
pub fn lint_value(
    value: &serde_json::Value,
    source_name: &str,
    options: &LintOptions,
) -> LintResult {
    let mut result = LintResult::new();
    result.files_checked = 1;
    validator::validate_project(Path::new(source_name), value, &mut result, options);
    result
}
