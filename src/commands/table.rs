use std::sync::Arc;

use clap::Subcommand;
use common::Configuration;
use metadata::{CatalogLayout, TableSelector, parse_catalog_file};
use table::{
    ClickhouseCoordination, ClickhouseDisksRemover, DetachedTablePurger, LiveCatalog,
    UuidChangeCoordinator,
};
use uuid::Uuid;

use super::{connect, print_json};

#[derive(Subcommand)]
pub enum TableAction {
    /// Change the UUID of a table. The table is left detached.
    ChangeUuid {
        /// Database name
        database: String,
        /// Table name
        table: String,
        /// UUID to assign
        new_uuid: Uuid,
    },
    /// Remove a detached table's data, replica node and catalog file
    DeleteDetached {
        /// Database name
        database: String,
        /// Table name
        table: String,
    },
    /// Detach a table
    Detach {
        database: String,
        table: String,
        /// Keep the table detached across server restarts
        #[arg(long)]
        permanently: bool,
    },
    /// Attach a detached table
    Attach { database: String, table: String },
    /// Print the parsed catalog file of a table
    Metadata { database: String, table: String },
}

impl TableAction {
    pub async fn run(self, config: &Configuration) -> anyhow::Result<()> {
        match self {
            TableAction::ChangeUuid {
                database,
                table,
                new_uuid,
            } => {
                let selector = TableSelector::new(database, table);
                let executor = connect(config)?;
                let coordination = Arc::new(ClickhouseCoordination::new(
                    executor.clone(),
                    config.clickhouse.timeouts.clone(),
                ));
                let report = UuidChangeCoordinator::new(executor, coordination, config)
                    .change_uuid(&selector, new_uuid)
                    .await?;
                print_json(&report)?;
            }
            TableAction::DeleteDetached { database, table } => {
                let selector = TableSelector::new(database, table);
                let executor = connect(config)?;
                let coordination = Arc::new(ClickhouseCoordination::new(
                    executor.clone(),
                    config.clickhouse.timeouts.clone(),
                ));
                let remover = Arc::new(ClickhouseDisksRemover::new(&config.disks));
                let report = DetachedTablePurger::new(executor, remover, coordination, config)
                    .purge(&selector)
                    .await?;
                print_json(&report)?;
            }
            TableAction::Detach {
                database,
                table,
                permanently,
            } => {
                let selector = TableSelector::new(database, table);
                live_catalog(config)?
                    .detach_table(&selector, permanently)
                    .await?;
                log::info!("Table {selector} detached");
            }
            TableAction::Attach { database, table } => {
                let selector = TableSelector::new(database, table);
                live_catalog(config)?.attach_table(&selector).await?;
                log::info!("Table {selector} attached");
            }
            TableAction::Metadata { database, table } => {
                let selector = TableSelector::new(database, table);
                let path =
                    CatalogLayout::new(&config.paths.clickhouse).table_metadata_path(&selector);
                let record = parse_catalog_file(&path)?;
                print_json(&serde_json::json!({
                    "table": selector,
                    "path": path,
                    "record": record,
                }))?;
            }
        }
        Ok(())
    }
}

fn live_catalog(config: &Configuration) -> anyhow::Result<LiveCatalog> {
    Ok(LiveCatalog::new(
        connect(config)?,
        config.clickhouse.timeouts.clone(),
    ))
}
