//! Configuration
//! =============
//!
//! Persistent defaults for the command host, stored as TOML by `confy`
//! (`~/.config/procsvc/default-config.toml` on Linux, the platform's config
//! directory elsewhere). A missing file is created with the defaults below.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::{ProcsvcError, ProcsvcResult},
    logging::LoggingConfig,
    service::{ControlMask, ServiceRegistry},
};

pub const APP_NAME: &str = "procsvc";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcsvcConfig {
    /// Service name `procsvc-cli serve` uses when none is given.
    pub service_name: Option<String>,
    pub control_mask: u32,
    /// Command the control code is appended to.
    pub command_template: Option<String>,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    /// Where Unix service units are written.
    pub unit_dir: Option<PathBuf>,
}

impl Default for ProcsvcConfig {
    fn default() -> Self {
        Self {
            service_name: None,
            control_mask: (ControlMask::STOP | ControlMask::SHUTDOWN).bits(),
            command_template: None,
            log_level: "warn".to_owned(),
            log_dir: None,
            unit_dir: None,
        }
    }
}

impl ProcsvcConfig {
    /// Reads `path`, or the default location when `None`.
    pub fn load(path: Option<&Path>) -> ProcsvcResult<Self> {
        let loaded = match path {
            Some(path) => confy::load_path(path),
            None => confy::load(APP_NAME, None),
        };
        loaded.map_err(|e| ProcsvcError::Config {
            reason: e.to_string(),
        })
    }

    pub fn store(&self, path: Option<&Path>) -> ProcsvcResult<()> {
        let stored = match path {
            Some(path) => confy::store_path(path, self),
            None => confy::store(APP_NAME, None, self),
        };
        stored.map_err(|e| ProcsvcError::Config {
            reason: e.to_string(),
        })
    }

    pub fn level(&self) -> ProcsvcResult<tracing::Level> {
        self.log_level
            .parse()
            .map_err(|_| ProcsvcError::InvalidConfig {
                field: "log_level",
                reason: format!("'{}' is not a log level", self.log_level),
            })
    }

    pub fn logging(&self) -> ProcsvcResult<LoggingConfig> {
        let mut logging = LoggingConfig::new();
        logging.level = self.level()?;
        logging.log_dir = self.log_dir.clone();
        Ok(logging)
    }

    pub fn registry(&self) -> ServiceRegistry {
        match &self.unit_dir {
            Some(dir) => ServiceRegistry::with_unit_dir(dir),
            None => ServiceRegistry::system(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("procsvc.toml");

        let config = ProcsvcConfig::load(Some(&path)).unwrap();
        assert_eq!(config, ProcsvcConfig::default());
        assert!(path.exists());
        assert_eq!(config.level().unwrap(), tracing::Level::WARN);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("procsvc.toml");
        std::fs::write(
            &path,
            "service_name = \"demo\"\ncontrol_mask = 7\nunit_dir = \"/tmp/units\"\n",
        )
        .unwrap();

        let config = ProcsvcConfig::load(Some(&path)).unwrap();
        assert_eq!(config.service_name.as_deref(), Some("demo"));
        assert_eq!(config.control_mask, 7);
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.registry().unit_dir(), Some(Path::new("/tmp/units")));
    }

    #[test]
    fn bad_log_level_is_rejected() {
        let config = ProcsvcConfig {
            log_level: "chatty".into(),
            ..Default::default()
        };
        assert!(matches!(
            config.level(),
            Err(ProcsvcError::InvalidConfig { field: "log_level", .. })
        ));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("procsvc.toml");
        std::fs::write(&path, "control_mask = \"lots\"\n").unwrap();
        assert!(matches!(
            ProcsvcConfig::load(Some(&path)),
            Err(ProcsvcError::Config { .. })
        ));
    }
}
