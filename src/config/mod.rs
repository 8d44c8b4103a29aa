//! Configuration module
//!
//! This module handles application configuration: layered loading from a
//! settings file, environment variables and command line overrides, plus
//! validation that aborts startup on bad input.
//!
//! A minimal `settings.yaml`:
//!
//! ```yaml
//! server:
//!   listen: ":8080"
//!   debug: false
//!   max_connections: 512
//! services:
//!   - type: http
//!     keyword: get
//!     location: 127.0.0.1:8000
//!   - type: tls
//!     keyword_bytes: [22, 3]
//!     location: 127.0.0.1:8443
//! ```

pub mod defaults;
mod error;
mod loader;
mod types;
mod validator;

pub use self::defaults::{DEFAULT_SETTINGS_FILE, ENV_PREFIX};
pub use self::error::{ConfigError, Result};
pub use self::loader::{Overrides, SettingsLoader};
pub use self::types::{ServerSettings, ServiceEntry, Settings};
pub use self::validator::{validate_settings, ConfigValidator};
