//! Engine-level error type.
//!
//! Every fleet, instance and configuration operation returns [`EngineError`].
//! The command dispatcher turns these into `{success: false, reason}` replies,
//! so the `Display` text is what callers ultimately see.

use thiserror::Error;

/// Errors raised by fleet, instance and project operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("No project is loaded")]
    NoActiveProject,
    #[error("Project '{0}' is not loaded")]
    ProjectNotLoaded(String),
    #[error("Server '{0}' not found")]
    ServerNotFound(String),
    #[error("Server '{0}' already exists")]
    ServerExists(String),
    #[error("Port {port} is already used by server '{owner}'")]
    PortConflict { port: u16, owner: String },
    #[error("Failed to bind port {port}: {reason}")]
    Bind { port: u16, reason: String },
    #[error("Server '{0}' is already running")]
    AlreadyRunning(String),
    #[error("Start of server '{0}' was cancelled")]
    StartCancelled(String),
    #[error("Route parent '{0}' not found")]
    ParentNotFound(String),
    #[error("Route '{0}' not found")]
    RouteNotFound(String),
    #[error("Response '{0}' not found")]
    ResponseNotFound(String),
    #[error("Route parent '{parent}' is a {actual} parent")]
    ParentTypeMismatch { parent: String, actual: String },
    #[error("Presets folder '{0}' not found")]
    FolderNotFound(String),
    #[error("Preset '{preset}' not found in folder '{folder}'")]
    PresetNotFound { folder: String, preset: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Proxy misconfigured for server '{server}': {reason}")]
    ProxyMisconfigured { server: String, reason: String },
}

impl EngineError {
    /// Stable machine-readable code, used by the control API error body.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NoActiveProject => "NO_ACTIVE_PROJECT",
            EngineError::ProjectNotLoaded(_) => "PROJECT_NOT_LOADED",
            EngineError::ServerNotFound(_) => "SERVER_NOT_FOUND",
            EngineError::ServerExists(_) => "SERVER_EXISTS",
            EngineError::PortConflict { .. } => "PORT_CONFLICT",
            EngineError::Bind { .. } => "BIND_ERROR",
            EngineError::AlreadyRunning(_) => "ALREADY_RUNNING",
            EngineError::StartCancelled(_) => "START_CANCELLED",
            EngineError::ParentNotFound(_) => "PARENT_NOT_FOUND",
            EngineError::RouteNotFound(_) => "ROUTE_NOT_FOUND",
            EngineError::ResponseNotFound(_) => "RESPONSE_NOT_FOUND",
            EngineError::ParentTypeMismatch { .. } => "PARENT_TYPE_MISMATCH",
            EngineError::FolderNotFound(_) => "FOLDER_NOT_FOUND",
            EngineError::PresetNotFound { .. } => "PRESET_NOT_FOUND",
            EngineError::InvalidConfig(_) => "INVALID_CONFIG",
            EngineError::ProxyMisconfigured { .. } => "PROXY_MISCONFIGURED",
        }
    }
}
