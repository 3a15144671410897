//! Permanent removal of a detached table.
//!
//! Physical data and coordination state go first and the catalog file goes
//! last, so an interrupted purge leaves the table discoverable for a retry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ch_client::QueryExecutor;
use common::Configuration;
use metadata::{CatalogLayout, TableSelector, parse_catalog_file, store_relative_path};
use serde::Serialize;
use uuid::Uuid;

use crate::catalog::LiveCatalog;
use crate::coordination::{CoordinationService, ReplicaCleanup};
use crate::disks::{DiskRemover, DiskResolver};
use crate::error::{TableError, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub table: TableSelector,
    pub uuid: Uuid,
    pub catalog_path: PathBuf,
    /// Disks the store directory was removed from, in removal order
    pub disks: Vec<String>,
    /// Expanded replica path whose replica node was removed
    pub replica_path: Option<String>,
    pub data_link_removed: bool,
    pub detached_flag_removed: bool,
}

pub struct DetachedTablePurger {
    catalog: LiveCatalog,
    disks: DiskResolver,
    coordination: Arc<dyn CoordinationService>,
    layout: CatalogLayout,
}

impl DetachedTablePurger {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        remover: Arc<dyn DiskRemover>,
        coordination: Arc<dyn CoordinationService>,
        config: &Configuration,
    ) -> Self {
        let disks = DiskResolver::new(
            executor.clone(),
            remover,
            config.paths.clone(),
            config.disks.clone(),
            config.clickhouse.timeouts.query,
        );
        Self {
            catalog: LiveCatalog::new(executor, config.clickhouse.timeouts.clone()),
            disks,
            coordination,
            layout: CatalogLayout::new(&config.paths.clickhouse),
        }
    }

    pub async fn purge(&self, table: &TableSelector) -> Result<PurgeReport, TableError> {
        let result = self.run(table).await.map_err(|e| e.on_table(table));
        if let Err(e) = &result {
            tracing::error!(
                database = %table.database,
                table = %table.table,
                error = %e,
                "Purge of detached table failed"
            );
        }
        result
    }

    async fn run(&self, table: &TableSelector) -> Result<PurgeReport, TableError> {
        if self.catalog.is_attached(table).await? {
            return Err(ValidationError::TableAttached {
                table: table.clone(),
            }
            .into());
        }

        let catalog_path = self.layout.table_metadata_path(table);
        let exists = tokio::fs::try_exists(&catalog_path)
            .await
            .map_err(|e| TableError::io("inspect", &catalog_path, e))?;
        if !exists {
            return Err(ValidationError::MissingCatalogFile {
                table: table.clone(),
                path: catalog_path,
            }
            .into());
        }

        let record = parse_catalog_file(&catalog_path)?;
        tracing::info!(
            database = %table.database,
            table = %table.table,
            uuid = %record.uuid,
            engine = %record.engine_name,
            "Purging detached table"
        );

        let disks = self.disks.list_disks().await?;
        let syntax = self.disks.remover_syntax().await?;
        let store_path = store_relative_path(&record.uuid);
        let mut cleaned = Vec::with_capacity(disks.len());
        for disk in &disks {
            self.disks.remove_from_disk(disk, &store_path, syntax).await?;
            cleaned.push(disk.name.clone());
        }

        let replica_path = match record.engine.replica() {
            Some(replica) => {
                let root_path = self
                    .coordination
                    .expand_macros(&replica.replica_path, table, record.uuid)
                    .await?;
                let replica_name = self
                    .coordination
                    .expand_macros(&replica.replica_name, table, record.uuid)
                    .await?;
                self.coordination
                    .remove_replica(&ReplicaCleanup::replica_only(&root_path, replica_name))
                    .await?;
                Some(root_path)
            }
            None => None,
        };

        let data_link_removed = remove_path(&self.layout.table_data_link(table)).await?;
        let detached_flag_removed = remove_path(&self.layout.detached_flag_path(table)).await?;

        tokio::fs::remove_file(&catalog_path)
            .await
            .map_err(|e| TableError::io("remove catalog file", &catalog_path, e))?;
        tracing::info!(path = %catalog_path.display(), "Removed catalog file");

        Ok(PurgeReport {
            table: table.clone(),
            uuid: record.uuid,
            catalog_path,
            disks: cleaned,
            replica_path,
            data_link_removed,
            detached_flag_removed,
        })
    }
}

/// Remove a file, symlink or directory. `Ok(false)` if nothing was there.
async fn remove_path(path: &Path) -> Result<bool, TableError> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Nothing to remove");
            return Ok(false);
        }
        Err(e) => return Err(TableError::io("inspect", path, e)),
    };

    let removed = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    removed.map_err(|e| TableError::io("remove", path, e))?;
    tracing::info!(path = %path.display(), "Removed");
    Ok(true)
}
