//! Project configuration: the data model, its versioned store and the loader.

mod loader;
mod store;
mod types;

#[cfg(test)]
mod tests;

pub use loader::load_project_file;
pub(crate) use types::rekey_responses;
pub use store::{
    AppliedPreset, PresetOverrides, ProjectSnapshot, ProjectStore, RouteKey, SnapshotDraft,
};
pub use types::{
    new_id, CookieRename, DuplicateCookies, GraphQlOperationType, GraphQlParent, GraphQlRoute,
    GraphQlRouteResponse, MockResponse, ParamType, Preset, PresetRoute, PresetsFolder,
    PresetsFolderHash, ProjectServer, ProjectTree, ResponseKind, RestParent, Route, RouteParent,
    RouteEntity, RouteRef, RouteResponse, ServerSettings, ServersHash,
};
