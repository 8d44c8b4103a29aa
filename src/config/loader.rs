//! Configuration loading functionality
//!
//! Settings are layered with the `config` crate:
//! 1. Default values (serde defaults, lowest priority)
//! 2. Settings file (YAML or JSON, picked by extension)
//! 3. Environment variables (`PLEXER_SERVER__LISTEN=...`)
//! 4. Command line overrides (highest priority)

use std::path::{Path, PathBuf};

use ::config::{Config, Environment, File};
use log::{debug, info};

use crate::config::defaults;
use crate::config::error::{ConfigError, Result};
use crate::config::types::Settings;

/// Builder that collects settings sources in priority order
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    /// Settings file and whether it must exist
    file: Option<(PathBuf, bool)>,
    /// Environment variable prefix; `None` skips the environment layer
    env_prefix: Option<String>,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self {
            file: Some((PathBuf::from(defaults::DEFAULT_SETTINGS_FILE), false)),
            env_prefix: Some(defaults::ENV_PREFIX.to_string()),
        }
    }
}

impl SettingsLoader {
    /// Loader reading `settings.yaml` (if present) and `PLEXER_*` variables
    pub fn new() -> Self {
        Self::default()
    }

    /// Read settings from `path`, failing if it does not exist
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file = Some((path.as_ref().to_path_buf(), true));
        self
    }

    /// Read settings from `path` only if it exists
    pub fn optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file = Some((path.as_ref().to_path_buf(), false));
        self
    }

    /// Skip the settings file entirely
    pub fn without_file(mut self) -> Self {
        self.file = None;
        self
    }

    /// Use a different environment variable prefix
    pub fn env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self
    }

    /// Skip the environment layer entirely
    pub fn without_env(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    /// Build the layered settings
    ///
    /// The result is not validated; call [`Settings::validate`] before use.
    pub fn load(&self) -> Result<Settings> {
        let mut builder = Config::builder();

        if let Some((path, required)) = &self.file {
            if path.exists() {
                info!("Loading settings from {}", path.display());
            } else if *required {
                return Err(ConfigError::InvalidValue(
                    "config".to_string(),
                    format!("settings file not found: {}", path.display()),
                ));
            } else {
                debug!("Optional settings file {} not found, skipping", path.display());
            }
            builder = builder.add_source(File::from(path.as_path()).required(*required));
        }

        if let Some(prefix) = &self.env_prefix {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator(defaults::ENV_SEPARATOR)
                    .try_parsing(true),
            );
        }

        let settings = builder.build()?.try_deserialize::<Settings>()?;
        debug!(
            "Loaded {} service(s), listen address {}",
            settings.services.len(),
            settings.server.listen
        );

        Ok(settings)
    }
}

/// Command line values that win over every other source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Listen address
    pub listen: Option<String>,
    /// Connection cap
    pub max_connections: Option<usize>,
    /// Force debug logging on
    pub debug: bool,
    /// Log level
    pub log_level: Option<String>,
}

impl Settings {
    /// Load settings from a single file, ignoring the environment
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        SettingsLoader::new().without_env().file(path).load()
    }

    /// Apply command line overrides on top of the loaded settings
    pub fn apply_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(listen) = &overrides.listen {
            self.server.listen = listen.clone();
        }
        if let Some(max) = overrides.max_connections {
            self.server.max_connections = max;
        }
        if overrides.debug {
            self.server.debug = true;
        }
        if let Some(level) = &overrides.log_level {
            self.server.log_level = level.clone();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_settings(extension: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(extension)
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_yaml_file() {
        let file = write_settings(
            ".yaml",
            r#"
server:
  listen: ":9000"
  debug: true
  maxconnections: 16
services:
  - type: http
    keyword: get
    location: 127.0.0.1:8000
  - type: tls
    keywordbytes: [22, 3]
    location: 127.0.0.1:8443
"#,
        );

        let settings = Settings::from_file(file.path()).unwrap();

        assert_eq!(settings.server.listen, ":9000");
        assert!(settings.server.debug);
        assert_eq!(settings.server.max_connections, 16);
        assert_eq!(settings.server.log_level, "info");
        assert_eq!(settings.services.len(), 2);
        assert_eq!(settings.services[0].keyword, "get");
        assert_eq!(settings.services[1].keyword_bytes, vec![22, 3]);
        assert_eq!(settings.services[1].location, "127.0.0.1:8443");
    }

    #[test]
    fn test_load_json_file() {
        let file = write_settings(
            ".json",
            r#"{
                "server": { "listen": "127.0.0.1:7000", "max_connections": 4, "idle_timeout": 30 },
                "services": [ { "type": "redis", "keyword": "*", "location": "127.0.0.1:6379" } ]
            }"#,
        );

        let settings = Settings::from_file(file.path()).unwrap();

        assert_eq!(settings.server.listen, "127.0.0.1:7000");
        assert_eq!(settings.server.max_connections, 4);
        assert_eq!(settings.server.idle_timeout, Some(30));
        assert_eq!(settings.services[0].kind, "redis");
    }

    #[test]
    fn test_missing_required_file() {
        let result = Settings::from_file("/definitely/not/here/settings.yaml");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_optional_file_uses_defaults() {
        let settings = SettingsLoader::new()
            .without_env()
            .optional_file("/definitely/not/here/settings.yaml")
            .load()
            .unwrap();

        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_apply_overrides() {
        let overrides = Overrides {
            listen: Some("127.0.0.1:1234".to_string()),
            max_connections: Some(2),
            debug: true,
            log_level: None,
        };

        let settings = Settings::default().apply_overrides(&overrides);

        assert_eq!(settings.server.listen, "127.0.0.1:1234");
        assert_eq!(settings.server.max_connections, 2);
        assert!(settings.server.debug);
        assert_eq!(settings.server.log_level, "info");
    }
}
