//! FlowLite CLI: runs the catalog and image server next to a node-graph host.

use clap::Parser;
use flowlite_core::catalog::CatalogCache;
use flowlite_core::server::{self, AppState};
use flowlite_core::{FlowliteConfig, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// FlowLite: slim catalog and compressed image delivery
#[derive(Parser, Debug)]
#[command(name = "flowlite", version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, global = true)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Host registry root URL (e.g. http://127.0.0.1:8188)
    #[arg(long, global = true)]
    registry_url: Option<String>,

    /// Read the registry from a JSON dump instead of the host
    #[arg(long, global = true)]
    registry_file: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Subcommand (defaults to `serve`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server
    Serve,
    /// Build one catalog from the configured registry and print it as JSON
    Catalog {
        /// Include extraction provenance and registry samples
        #[arg(long)]
        debug: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}

impl Cli {
    fn apply_overrides(&self, config: &mut FlowliteConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(url) = &self.registry_url {
            config.registry.url = url.clone();
            config.registry.file = None;
        }
        if let Some(file) = &self.registry_file {
            config.registry.file = Some(file.clone());
        }
    }
}

/// Human-readable stderr plus JSON file logging. The returned guard must
/// live as long as the process so buffered file logs are flushed.
fn init_tracing(verbose: u8, quiet: bool) -> tracing_appender::non_blocking::WorkerGuard {
    let level = match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let stderr_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(stderr_filter);

    let log_dir = directories::ProjectDirs::from("dev", "flowlite", "flowlite")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "flowlite.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.quiet);

    let mut config = flowlite_core::load_config(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            tracing::info!(
                ttl_secs = config.catalog_ttl,
                jpeg_quality = config.jpeg_quality,
                delete_after_send = config.delete_after_send,
                output = %config.directories.output.display(),
                "Starting FlowLite"
            );
            let state = Arc::new(AppState::from_config(&config)?);
            server::run(state, &config).await?;
        }
        Commands::Catalog { debug } => {
            let cache = CatalogCache::new(
                server::registry_source(&config)?,
                Arc::new(SystemClock),
                config.catalog_ttl(),
            );
            let response = cache.get(true, debug).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_parses_serve_defaults() {
        let cli = Cli::try_parse_from(["flowlite"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_cli_overrides_apply() {
        let cli = Cli::try_parse_from([
            "flowlite",
            "serve",
            "--host",
            "0.0.0.0",
            "-p",
            "9001",
            "--registry-file",
            "/tmp/object_info.json",
            "-vv",
        ])
        .unwrap();
        let mut config = FlowliteConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9001);
        assert_eq!(
            config.registry.file,
            Some(PathBuf::from("/tmp/object_info.json"))
        );
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_catalog_debug() {
        let cli = Cli::try_parse_from(["flowlite", "catalog", "--debug"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Catalog { debug: true })));
    }

    #[test]
    fn test_registry_url_clears_file() {
        let cli =
            Cli::try_parse_from(["flowlite", "--registry-url", "http://gpu:8188"]).unwrap();
        let mut config = FlowliteConfig::default();
        config.registry.file = Some("/tmp/old.json".into());
        cli.apply_overrides(&mut config);
        assert_eq!(config.registry.url, "http://gpu:8188");
        assert!(config.registry.file.is_none());
    }
}
