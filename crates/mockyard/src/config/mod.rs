//! Engine configuration.
//!
//! Loaded from YAML:
//!
//! ```yaml
//! control:
//!   host: 127.0.0.1
//!   port: 4040
//! app:
//!   logCapacity: 200
//!   hostIpPollSecs: 10
//! projects:
//!   - ./projects/shop.json
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONTROL_PORT: u16 = 4040;
pub const DEFAULT_MAX_REQUEST_BODY: usize = 16 * 1024 * 1024;

/// Engine-wide settings, reported to clients in the `INIT` snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// Log entries retained per project.
    pub log_capacity: usize,
    /// Interval between host IP checks; 0 disables the watcher.
    pub host_ip_poll_secs: u64,
    pub proxy_timeout_secs: u64,
    /// Interface the mock servers bind to.
    pub bind_host: String,
    /// Largest request body a mock server reads; bigger bodies get a 413.
    pub max_request_body_bytes: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_capacity: crate::logs::DEFAULT_LOG_CAPACITY,
            host_ip_poll_secs: 10,
            proxy_timeout_secs: 30,
            bind_host: "0.0.0.0".to_string(),
            max_request_body_bytes: DEFAULT_MAX_REQUEST_BODY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_CONTROL_PORT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub control: ControlConfig,
    pub app: AppSettings,
    /// Project files loaded at startup. Relative paths resolve against the
    /// config file's directory.
    pub projects: Vec<PathBuf>,
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config: EngineConfig = serde_yaml::from_str(&contents)?;
        if let Some(base) = path.parent() {
            config.projects = config
                .projects
                .into_iter()
                .map(|p| if p.is_relative() { base.join(p) } else { p })
                .collect();
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.app.log_capacity == 0 {
            anyhow::bail!("app.logCapacity must be greater than 0");
        }

        if self.app.proxy_timeout_secs == 0 {
            anyhow::bail!("app.proxyTimeoutSecs must be greater than 0");
        }

        if self.app.max_request_body_bytes == 0 {
            anyhow::bail!("app.maxRequestBodyBytes must be greater than 0");
        }

        if self.app.bind_host.trim().is_empty() {
            anyhow::bail!("app.bindHost must not be empty");
        }

        if self.control.host.trim().is_empty() {
            anyhow::bail!("control.host must not be empty");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.control.port, DEFAULT_CONTROL_PORT);
        assert_eq!(config.app.log_capacity, 200);
        assert_eq!(config.app.host_ip_poll_secs, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: EngineConfig = serde_yaml::from_str(
            r#"
app:
  logCapacity: 50
"#,
        )
        .unwrap();
        assert_eq!(config.app.log_capacity, 50);
        assert_eq!(config.app.proxy_timeout_secs, 30);
        assert_eq!(config.app.max_request_body_bytes, DEFAULT_MAX_REQUEST_BODY);
        assert_eq!(config.control.host, "127.0.0.1");
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let mut config = EngineConfig::default();
        config.app.log_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("logCapacity"));
    }

    #[test]
    fn test_from_file_resolves_project_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mockyard.yaml");
        std::fs::write(&path, "projects:\n  - shop.json\n  - /abs/other.yaml\n").unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.projects[0], dir.path().join("shop.json"));
        assert_eq!(config.projects[1], PathBuf::from("/abs/other.yaml"));
    }
}
