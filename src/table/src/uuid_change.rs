//! Changing the durable UUID of a table.
//!
//! `Validating -> Detaching -> RewritingCatalog -> RelocatingStore -> Done`, with
//! `Failed` reachable from every step after validation started. Once the catalog
//! file has been rewritten, a failure to move the store directory is reported as
//! [`TableError::InconsistentState`] and left for an operator.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ch_client::QueryExecutor;
use common::Configuration;
use common::config::PathsConfig;
use metadata::{CatalogLayout, CatalogRecord, TableSelector, parse_catalog_file, rewrite_uuid};
use serde::Serialize;
use uuid::Uuid;

use crate::catalog::LiveCatalog;
use crate::coordination::CoordinationService;
use crate::error::{TableError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UuidChangeState {
    Validating,
    Detaching,
    RewritingCatalog,
    RelocatingStore,
    Done,
    Failed,
}

impl fmt::Display for UuidChangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UuidChangeState::Validating => "validating",
            UuidChangeState::Detaching => "detaching",
            UuidChangeState::RewritingCatalog => "rewriting catalog",
            UuidChangeState::RelocatingStore => "relocating store",
            UuidChangeState::Done => "done",
            UuidChangeState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UuidChangeReport {
    pub table: TableSelector,
    pub catalog_path: PathBuf,
    pub old_uuid: Uuid,
    pub new_uuid: Uuid,
    /// The table was attached and has been detached
    pub detached: bool,
    /// A store directory existed and was moved
    pub store_relocated: bool,
    /// The `data/<db>/<table>` link was pointed at the new store directory
    pub data_link_updated: bool,
}

struct Progress<'a> {
    table: &'a TableSelector,
    state: UuidChangeState,
}

impl Progress<'_> {
    fn advance(&mut self, next: UuidChangeState) {
        tracing::info!(
            database = %self.table.database,
            table = %self.table.table,
            from = %self.state,
            to = %next,
            "UUID change state transition"
        );
        self.state = next;
    }
}

pub struct UuidChangeCoordinator {
    catalog: LiveCatalog,
    coordination: Arc<dyn CoordinationService>,
    layout: CatalogLayout,
    paths: PathsConfig,
}

impl UuidChangeCoordinator {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        coordination: Arc<dyn CoordinationService>,
        config: &Configuration,
    ) -> Self {
        Self {
            catalog: LiveCatalog::new(executor, config.clickhouse.timeouts.clone()),
            coordination,
            layout: CatalogLayout::new(&config.paths.clickhouse),
            paths: config.paths.clone(),
        }
    }

    /// Give `table` the UUID `new_uuid`.
    ///
    /// The table is left detached; attaching it again is up to the caller.
    pub async fn change_uuid(
        &self,
        table: &TableSelector,
        new_uuid: Uuid,
    ) -> Result<UuidChangeReport, TableError> {
        let mut progress = Progress {
            table,
            state: UuidChangeState::Validating,
        };

        let result = self
            .run(&mut progress, new_uuid)
            .await
            .map_err(|e| e.on_table(table));
        match &result {
            Ok(_) => progress.advance(UuidChangeState::Done),
            Err(e) => {
                tracing::error!(
                    database = %table.database,
                    table = %table.table,
                    state = %progress.state,
                    error = %e,
                    "UUID change failed"
                );
                progress.advance(UuidChangeState::Failed);
            }
        }
        result
    }

    async fn run(
        &self,
        progress: &mut Progress<'_>,
        new_uuid: Uuid,
    ) -> Result<UuidChangeReport, TableError> {
        let table = progress.table;

        let info = self.catalog.table_info(table).await?;
        let attached = info.is_some();
        let catalog_path = match &info {
            Some(info) => self.paths.resolve(&info.metadata_path),
            None => self.layout.table_metadata_path(table),
        };

        let record = self.validate(table, &catalog_path, new_uuid).await?;

        progress.advance(UuidChangeState::Detaching);
        if attached {
            self.catalog.detach_table(table, false).await?;
        }

        progress.advance(UuidChangeState::RewritingCatalog);
        let old_uuid = rewrite_uuid(&catalog_path, new_uuid)?;
        if old_uuid != record.uuid {
            tracing::warn!(
                validated = %record.uuid,
                found = %old_uuid,
                "Catalog file changed between validation and rewrite"
            );
        }

        progress.advance(UuidChangeState::RelocatingStore);
        let store_from = self.layout.store_dir(&old_uuid);
        let store_to = self.layout.store_dir(&new_uuid);
        let (store_relocated, data_link_updated) = self
            .relocate_store(table, &store_from, &store_to)
            .await
            .map_err(|source| TableError::InconsistentState {
                table: table.clone(),
                old_uuid,
                new_uuid,
                catalog_path: catalog_path.clone(),
                store_from: store_from.clone(),
                store_to: store_to.clone(),
                source,
            })?;

        Ok(UuidChangeReport {
            table: table.clone(),
            catalog_path,
            old_uuid,
            new_uuid,
            detached: attached,
            store_relocated,
            data_link_updated,
        })
    }

    async fn validate(
        &self,
        table: &TableSelector,
        catalog_path: &Path,
        new_uuid: Uuid,
    ) -> Result<CatalogRecord, TableError> {
        let record = parse_catalog_file(catalog_path)?;

        if record.uuid == new_uuid {
            return Err(ValidationError::SameUuid {
                table: table.clone(),
                uuid: new_uuid,
            }
            .into());
        }

        if let Some(replica) = record.engine.replica() {
            tracing::info!(
                path = %catalog_path.display(),
                replica_name = %replica.replica_name,
                replica_path = %replica.replica_path,
                "Table has a replicated engine"
            );

            if replica.contains_macro("uuid") {
                return Err(ValidationError::UuidMacroInReplicaPath {
                    table: table.clone(),
                    replica_path: replica.replica_path.clone(),
                }
                .into());
            }

            let replica_path = self
                .coordination
                .expand_macros(&replica.replica_path, table, record.uuid)
                .await?;
            let shared_id = self.coordination.table_shared_id(&replica_path).await?;
            if shared_id != new_uuid {
                return Err(ValidationError::SharedIdMismatch {
                    table: table.clone(),
                    replica_path,
                    requested: new_uuid,
                    shared_id,
                }
                .into());
            }
        }

        Ok(record)
    }

    /// Move the store directory and re-point the table's data link at it.
    /// A missing store directory is not an error.
    async fn relocate_store(
        &self,
        table: &TableSelector,
        from: &Path,
        to: &Path,
    ) -> std::io::Result<(bool, bool)> {
        if !tokio::fs::try_exists(from).await? {
            tracing::info!(path = %from.display(), "No store directory to relocate");
            return Ok((false, false));
        }
        if tokio::fs::try_exists(to).await? {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", to.display()),
            ));
        }
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(from, to).await?;
        tracing::info!(from = %from.display(), to = %to.display(), "Relocated store directory");

        let link = self.layout.table_data_link(table);
        let points_to_old = match tokio::fs::read_link(&link).await {
            Ok(target) => target.components().eq(from.components()),
            Err(_) => false,
        };
        if points_to_old {
            tokio::fs::remove_file(&link).await?;
            tokio::fs::symlink(to, &link).await?;
            tracing::info!(link = %link.display(), target = %to.display(), "Updated data link");
        }
        Ok((true, points_to_old))
    }
}
