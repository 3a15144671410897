use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared by every command
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, global = true, env = "CHADMIN_CONFIG", help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Subcommands that only look at the configuration
#[derive(Subcommand, Debug, Clone)]
pub enum CommonCommands {
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Level used when `RUST_LOG` is not set
    pub fn default_level(args: &CommonArgs) -> &'static str {
        if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Initialize logging based on CLI arguments. Logs go to stderr so command
    /// output on stdout stays machine readable.
    pub fn init_logging(args: &CommonArgs) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level(args)));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let mut redacted = config.clone();
            if redacted.clickhouse.password.is_some() {
                redacted.clickhouse.password = Some("***".to_string());
            }
            let json = serde_json::to_string_pretty(&redacted)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("chadmin configuration:");
            println!("======================");
            println!("ClickHouse URL: {}", config.clickhouse.url);
            println!("ClickHouse user: {}", config.clickhouse.user);
            println!(
                "Query timeout: {:?}, detach: {:?}, attach: {:?}, system: {:?}",
                config.clickhouse.timeouts.query,
                config.clickhouse.timeouts.detach_table,
                config.clickhouse.timeouts.attach_table,
                config.clickhouse.timeouts.system
            );
            println!("ClickHouse root: {}", config.paths.clickhouse.display());
            println!(
                "Object storage mount: {}",
                config.paths.object_storage.display()
            );
            println!("Disk remover: {}", config.disks.remover);
            println!("Disk remover config: {}", config.disks.config.display());
            println!("Excluded disks: {:?}", config.disks.excluded);
            println!(
                "Lenient missing paths: {}",
                config.disks.lenient_missing_paths
            );
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");

        let url = url::Url::parse(&config.clickhouse.url)
            .with_context(|| format!("Invalid ClickHouse URL '{}'", config.clickhouse.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!(
                "Unsupported ClickHouse URL scheme: {}. Supported: http, https",
                url.scheme()
            );
        }

        let timeouts = &config.clickhouse.timeouts;
        for (name, timeout) in [
            ("query", timeouts.query),
            ("detach_table", timeouts.detach_table),
            ("attach_table", timeouts.attach_table),
            ("system", timeouts.system),
            ("remover", config.disks.remover_timeout),
        ] {
            if timeout.is_zero() {
                anyhow::bail!("Timeout '{name}' cannot be zero");
            }
        }

        if config.disks.remover.is_empty() {
            anyhow::bail!("Disk remover binary cannot be empty");
        }

        for (name, path) in [
            ("paths.clickhouse", &config.paths.clickhouse),
            ("paths.object_storage", &config.paths.object_storage),
        ] {
            if !path.is_absolute() {
                anyhow::bail!("{name} must be an absolute path, got {}", path.display());
            }
        }

        log::info!("Configuration validation passed");
        Ok(())
    }

    /// Handle commands that only need the configuration
    pub fn handle_common_command(command: &CommonCommands, config: &Configuration) -> Result<()> {
        match command {
            CommonCommands::Config { json } => display_config(config, *json),
            CommonCommands::Validate => validate_config(config),
            CommonCommands::Version => {
                println!("{}", version_info());
                Ok(())
            }
        }
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}
