pub mod commands;
pub mod projects;
pub mod system;
