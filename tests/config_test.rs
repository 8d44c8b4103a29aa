//! Configuration layering tests
//!
//! Priority order: command line > environment variables > settings file > defaults

use std::env;
use std::io::Write;

use plexer::config::{ConfigValidator, Overrides, SettingsLoader, Settings};
use plexer::Multiplexer;
use serial_test::serial;

const FILE_CONTENT: &str = r#"
server:
  listen: "127.0.0.1:7000"
  max_connections: 5
  log_level: warn
services:
  - type: ssh
    keyword: SSH-
    location: 127.0.0.1:22
  - type: http
    keyword: get
    location: 127.0.0.1:8000
"#;

fn settings_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(FILE_CONTENT.as_bytes()).unwrap();
    file
}

fn clear_env() {
    for key in [
        "PLEXER_SERVER__LISTEN",
        "PLEXER_SERVER__MAX_CONNECTIONS",
        "PLEXER_SERVER__DEBUG",
    ] {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_file_only() {
    clear_env();
    let file = settings_file();

    let settings = SettingsLoader::new().file(file.path()).load().unwrap();

    assert_eq!(settings.server.listen, "127.0.0.1:7000");
    assert_eq!(settings.server.max_connections, 5);
    assert_eq!(settings.server.log_level, "warn");
    assert_eq!(settings.services.len(), 2);
    assert!(settings.validate().is_ok());
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    let file = settings_file();
    env::set_var("PLEXER_SERVER__MAX_CONNECTIONS", "7");
    env::set_var("PLEXER_SERVER__DEBUG", "true");

    let result = SettingsLoader::new().file(file.path()).load();
    clear_env();
    let settings = result.unwrap();

    assert_eq!(settings.server.max_connections, 7);
    assert!(settings.server.debug);
    // Untouched by the environment
    assert_eq!(settings.server.listen, "127.0.0.1:7000");
    assert_eq!(settings.services[0].location, "127.0.0.1:22");
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    clear_env();
    let file = settings_file();
    env::set_var("PLEXER_SERVER__LISTEN", "127.0.0.1:7001");
    env::set_var("PLEXER_SERVER__MAX_CONNECTIONS", "7");

    let result = SettingsLoader::new().file(file.path()).load();
    clear_env();

    let overrides = Overrides {
        listen: Some(":7002".to_string()),
        ..Overrides::default()
    };
    let settings = result.unwrap().apply_overrides(&overrides);

    assert_eq!(settings.server.listen, ":7002");
    assert_eq!(settings.server.max_connections, 7);
    assert_eq!(settings.server.listen_addr().unwrap().port(), 7002);
}

#[test]
#[serial]
fn test_defaults_without_sources() {
    clear_env();

    let settings = SettingsLoader::new().without_file().load().unwrap();

    assert_eq!(settings, Settings::default());
    assert_eq!(settings.server.listen, "0.0.0.0:8080");
    assert_eq!(settings.server.max_connections, 1024);
    // No services configured: startup must refuse
    assert!(settings.validate().is_err());
}

#[test]
#[serial]
fn test_bundled_sample_settings() {
    clear_env();
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/settings.yaml");

    let settings = Settings::from_file(path).unwrap();
    assert!(settings.validate().is_ok());
    assert!(settings.check_warnings().is_empty());

    let mux = Multiplexer::from_settings(&settings);
    assert_eq!(mux.routes().len(), settings.services.len());
    assert!(mux.routes().detect(b"SSH-2.0-OpenSSH\r\n").is_ok());
}
