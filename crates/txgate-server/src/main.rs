use std::{env, sync::Arc};

use txgate_server::config::loader::{DEFAULT_CONFIG_FILE, load_config};
use txgate_server::{Gateway, serve, shutdown_signal, shutdown_tracing};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From TXGATE_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (txgate.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (TXGATE_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    txgate_server::observability::init_tracing();

    let (config_path, source) = resolve_config_path();

    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );

    txgate_server::observability::apply_logging_level(&cfg.logging.level);
    txgate_server::metrics::init_metrics();

    let gateway = match Gateway::build(cfg).await {
        Ok(g) => Arc::new(g),
        Err(e) => {
            eprintln!("Gateway initialization failed: {e:#}");
            std::process::exit(2);
        }
    };

    if let Err(e) = gateway.start().await {
        eprintln!("Gateway start failed: {e:#}");
        std::process::exit(2);
    }

    if let Err(err) = serve(gateway.clone(), shutdown_signal()).await {
        eprintln!("Server error: {err:#}");
    }

    if let Err(err) = gateway.shutdown().await {
        tracing::warn!(error = %err, "Gateway shutdown incomplete");
    }

    shutdown_tracing();
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: TXGATE_CONFIG
/// 3. Default: txgate.toml
fn resolve_config_path() -> (String, ConfigSource) {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, ConfigSource::CliArgument);
            }
        }
    }

    if let Ok(path) = env::var("TXGATE_CONFIG") {
        if !path.is_empty() {
            return (path, ConfigSource::EnvironmentVariable);
        }
    }

    (DEFAULT_CONFIG_FILE.to_string(), ConfigSource::Default)
}
