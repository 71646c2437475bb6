//! Photopack - Entry point
//!
//! Serves photo albums from the catalog directory as ZIP archives that are
//! built and streamed on demand.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use photopack_config::{parse_bool, ConfigLoader, PhotopackConfig};
use photopack_server::Server;
use photopack_telemetry::{init_logging, LogConfig};

const ENV_PREFIX: &str = "PHOTOPACK";
const DEFAULT_CONFIG_FILE: &str = "photopack.toml";

/// Command-line arguments. Each one overrides the matching config key.
#[derive(Debug, Parser)]
#[command(name = "photopack", version)]
#[command(about = "Streams photo albums as ZIP archives", long_about = None)]
struct Cli {
    /// Path to configuration file (TOML or JSON).
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Root directory of the photo catalog.
    #[arg(short, long, value_name = "DIR")]
    path: Option<PathBuf>,

    /// Pace archive chunks to simulate a slow link.
    #[arg(short, long, value_name = "BOOL", value_parser = flag)]
    delay: Option<bool>,

    /// Enable logging.
    #[arg(short, long, value_name = "BOOL", value_parser = flag)]
    logging: Option<bool>,

    /// Address to listen on.
    #[arg(short, long, value_name = "ADDR")]
    addr: Option<String>,
}

impl Cli {
    fn load_config(&self) -> Result<PhotopackConfig> {
        let loader = match &self.config {
            Some(path) => ConfigLoader::new()
                .with_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => ConfigLoader::new().with_optional_file(DEFAULT_CONFIG_FILE)?,
        };

        let mut config = loader
            .with_dotenv()
            .with_env_prefix(ENV_PREFIX)
            .load()
            .context("invalid configuration")?;

        self.apply(&mut config);
        config.validate().context("invalid command-line override")?;
        Ok(config)
    }

    fn apply(&self, config: &mut PhotopackConfig) {
        if let Some(path) = &self.path {
            config.catalog.root.clone_from(path);
        }
        if let Some(delay) = self.delay {
            config.streaming.throttle = delay;
        }
        if let Some(logging) = self.logging {
            config.logging.enabled = logging;
        }
        if let Some(addr) = &self.addr {
            config.server.http_addr.clone_from(addr);
        }
    }
}

fn flag(value: &str) -> Result<bool, String> {
    parse_bool(value).ok_or_else(|| format!("expected true or false, got '{value}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    init_logging(&LogConfig::from(&config.logging))?;

    if !config.catalog.root.exists() {
        println!(
            "The photos catalog {} doesn't exist",
            config.catalog.root.display()
        );
        return Ok(());
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.http_addr,
        catalog = %config.catalog.root.display(),
        throttle = config.streaming.throttle,
        "Starting photopack"
    );

    Server::from_config(&config)
        .run()
        .await
        .context("server error")?;

    Ok(())
}
