pub mod database;
pub mod table;

use std::sync::Arc;

use anyhow::Context;
use ch_client::{HttpClient, QueryExecutor};
use clap::{Parser, Subcommand};
use common::Configuration;
use common::cli::{CommonArgs, CommonCommands, utils};
use serde::Serialize;

/// chadmin: ClickHouse catalog and table identity maintenance
#[derive(Parser)]
#[command(name = "chadmin", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Change, purge, detach and inspect tables
    Table {
        #[command(subcommand)]
        action: table::TableAction,
    },
    /// Inspect and rewrite database catalog files
    Database {
        #[command(subcommand)]
        action: database::DatabaseAction,
    },
    #[command(flatten)]
    Common(CommonCommands),
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = utils::load_config(self.common.config.as_ref())?;

        match self.command {
            Commands::Table { action } => action.run(&config).await,
            Commands::Database { action } => action.run(&config),
            Commands::Common(command) => utils::handle_common_command(&command, &config),
        }
    }
}

fn connect(config: &Configuration) -> anyhow::Result<Arc<dyn QueryExecutor>> {
    let client = HttpClient::new(&config.clickhouse)
        .with_context(|| format!("Failed to create client for {}", config.clickhouse.url))?;
    Ok(Arc::new(client))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
