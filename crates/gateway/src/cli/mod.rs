pub mod config;
pub mod demo;

use clap::{Parser, Subcommand};

/// Runfence: per-user isolation for concurrent agent runs.
#[derive(Debug, Parser)]
#[command(name = "runfence", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the runtime and its background sweeper (default when no
    /// subcommand is given).
    Serve,
    /// Run one agent against the in-memory transport and print the
    /// event-stream report as JSON.
    Demo(demo::DemoArgs),
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `RF_CONFIG` (or `config.toml`
/// by default).  A missing file yields the built-in defaults.  Returns the
/// parsed [`Config`](rf_domain::config::Config) and the path that was used.
pub fn load_config() -> anyhow::Result<(rf_domain::config::Config, String)> {
    let config_path = std::env::var("RF_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

pub fn load_config_from(config_path: &str) -> anyhow::Result<rf_domain::config::Config> {
    if !std::path::Path::new(config_path).exists() {
        return Ok(rf_domain::config::Config::default());
    }
    let raw = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))
}
