//! Logging helpers
//!
//! The whole crate logs through the `log` facade. Without an installed logger
//! every call is a no-op, so proxying behaves the same with or without one.

/// Pick the effective log level
///
/// The `debug` switch from the settings file wins over the configured level.
pub fn effective_level(level: &str, debug: bool) -> &str {
    if debug {
        "debug"
    } else {
        level
    }
}

/// Initialize the logger
///
/// `RUST_LOG` still takes precedence over `level` when it is set.
///
/// # Parameters
///
/// * `level` - Log level
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // A second initialisation (tests, embedding) is harmless
    let _ = env_logger::Builder::from_env(env).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_level() {
        assert_eq!(effective_level("warn", false), "warn");
        assert_eq!(effective_level("warn", true), "debug");
    }

    #[test]
    fn test_init_logger_twice() {
        init_logger("debug");
        init_logger("info");
    }
}
