//! Configuration validator
//!
//! Startup must abort on invalid settings, so [`validate_settings`] returns the
//! first hard error. Suspicious but usable settings are reported by
//! [`ConfigValidator::check_warnings`] instead.

use tokio::sync::Semaphore;

use crate::common::parse_socket_addr;
use crate::config::error::{ConfigError, Result};
use crate::config::types::{ServerSettings, ServiceEntry, Settings};

/// Log levels understood by `env_logger`
const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Validate the settings
pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_server_settings(&settings.server)?;
    validate_services(&settings.services)?;

    Ok(())
}

/// Validate the server block
fn validate_server_settings(server: &ServerSettings) -> Result<()> {
    if parse_socket_addr(&server.listen).is_err() {
        return Err(ConfigError::InvalidValue(
            "server.listen".to_string(),
            format!("not a valid listen address: {}", server.listen),
        ));
    }

    if server.max_connections == 0 {
        return Err(ConfigError::InvalidValue(
            "server.max_connections".to_string(),
            "must be greater than 0".to_string(),
        ));
    }

    if server.max_connections > Semaphore::MAX_PERMITS {
        return Err(ConfigError::InvalidValue(
            "server.max_connections".to_string(),
            format!("must not exceed {}", Semaphore::MAX_PERMITS),
        ));
    }

    if server.buffer_size == 0 {
        return Err(ConfigError::InvalidValue(
            "server.buffer_size".to_string(),
            "Buffer size must be greater than 0".to_string(),
        ));
    }

    if server.connect_timeout == Some(0) {
        return Err(ConfigError::InvalidValue(
            "server.connect_timeout".to_string(),
            "must be greater than 0 when set".to_string(),
        ));
    }

    if server.idle_timeout == Some(0) {
        return Err(ConfigError::InvalidValue(
            "server.idle_timeout".to_string(),
            "must be greater than 0 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validate the service list
fn validate_services(services: &[ServiceEntry]) -> Result<()> {
    if services.is_empty() {
        return Err(ConfigError::MissingRequiredValue("services".to_string()));
    }

    for (index, service) in services.iter().enumerate() {
        if service.location.trim().is_empty() {
            return Err(ConfigError::MissingRequiredValue(format!(
                "services[{}].location",
                index
            )));
        }

        // An empty prefix would match every client and shadow all later routes
        if service.keyword.is_empty() && service.keyword_bytes.is_empty() {
            return Err(ConfigError::InvalidCombination(format!(
                "services[{}] ({}) needs a keyword or keyword_bytes",
                index,
                service.location
            )));
        }
    }

    Ok(())
}

/// Configuration validator trait
pub trait ConfigValidator {
    /// Hard validation; the caller must not start with invalid settings
    fn validate(&self) -> Result<()>;

    /// Check configuration for warnings
    fn check_warnings(&self) -> Vec<String>;
}

impl ConfigValidator for Settings {
    fn validate(&self) -> Result<()> {
        validate_settings(self)
    }

    fn check_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let level = self.server.log_level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            warnings.push(format!(
                "Unknown log level '{}', env_logger will ignore it",
                self.server.log_level
            ));
        }

        for (later_index, later) in self.services.iter().enumerate() {
            if let Some(earlier_index) = shadowed_by(&self.services[..later_index], later) {
                warnings.push(format!(
                    "services[{}] ({}) can never match: services[{}] ({}) matches first",
                    later_index, later.location, earlier_index, self.services[earlier_index].location
                ));
            }
        }

        warnings
    }
}

/// Index of an earlier service that matches every buffer `service` matches
fn shadowed_by(earlier: &[ServiceEntry], service: &ServiceEntry) -> Option<usize> {
    earlier.iter().position(|candidate| {
        let covers_keyword = service.keyword.is_empty()
            || covers_text(candidate, service.keyword.as_bytes());
        let covers_bytes = service.keyword_bytes.is_empty()
            || covers_raw(candidate, &service.keyword_bytes);
        covers_keyword && covers_bytes
    })
}

/// Whether `candidate` matches every buffer starting with `keyword` (any case)
fn covers_text(candidate: &ServiceEntry, keyword: &[u8]) -> bool {
    let prefix = candidate.keyword.as_bytes();
    !prefix.is_empty()
        && keyword.len() >= prefix.len()
        && keyword[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Whether `candidate` matches every buffer starting with exactly `bytes`
fn covers_raw(candidate: &ServiceEntry, bytes: &[u8]) -> bool {
    let text = candidate.keyword.as_bytes();
    let raw = &candidate.keyword_bytes;
    (!text.is_empty() && bytes.len() >= text.len() && bytes[..text.len()].eq_ignore_ascii_case(text))
        || (!raw.is_empty() && bytes.starts_with(raw))
}
