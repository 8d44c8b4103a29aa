//! Plexer Command Line Tool
//!
//! This binary is the command-line interface for the Plexer multiplexer.

use clap::Parser;
use log::{error, info, warn};

use plexer::common::{bind_listener, effective_level, init_logger, Result};
use plexer::config::{ConfigValidator, Overrides, SettingsLoader, DEFAULT_SETTINGS_FILE};
use plexer::{Multiplexer, APP_NAME, VERSION};

/// Plexer: protocol-sniffing TCP multiplexer
#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Settings file (YAML or JSON); `settings.yaml` is read if present
    #[arg(short, long, env = "PLEXER_CONFIG")]
    config: Option<String>,

    /// Listen address, e.g. `0.0.0.0:8080` or `:8080`
    #[arg(short, long)]
    listen: Option<String>,

    /// Maximum number of simultaneously active connections
    #[arg(long)]
    max_connections: Option<usize>,

    /// Log every connection at debug level
    #[arg(short, long)]
    debug: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Print the effective settings as JSON and exit
    #[arg(long)]
    check: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            listen: self.listen.clone(),
            max_connections: self.max_connections,
            debug: self.debug,
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loader = match &args.config {
        Some(path) => SettingsLoader::new().file(path),
        None => SettingsLoader::new().optional_file(DEFAULT_SETTINGS_FILE),
    };
    let settings = loader.load()?.apply_overrides(&args.overrides());

    init_logger(effective_level(&settings.server.log_level, settings.server.debug));

    info!("Starting {} v{}", APP_NAME, VERSION);

    if let Err(e) = settings.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e.into());
    }
    for warning in settings.check_warnings() {
        warn!("{}", warning);
    }

    if args.check {
        println!("{}", settings.to_json_pretty()?);
        return Ok(());
    }

    let listener = bind_listener(settings.server.listen_addr()?)?;
    let mux = Multiplexer::from_settings(&settings);

    info!("Multiplexer ready, press Ctrl+C to stop");

    mux.serve_with_shutdown(listener, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    })
    .await
}
