//! Queries against the live catalog view (`system.tables`).

use std::sync::Arc;

use ch_client::{Query, QueryExecutor, fetch_as, quote_identifier};
use common::config::TimeoutConfig;
use metadata::TableSelector;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::TableError;

/// What the server reports about an attached table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableInfo {
    pub uuid: Uuid,
    /// Absolute on older servers, relative to the server root on newer ones
    pub metadata_path: String,
}

/// Read and DDL access to attached tables.
#[derive(Clone)]
pub struct LiveCatalog {
    executor: Arc<dyn QueryExecutor>,
    timeouts: TimeoutConfig,
}

impl LiveCatalog {
    pub fn new(executor: Arc<dyn QueryExecutor>, timeouts: TimeoutConfig) -> Self {
        Self { executor, timeouts }
    }

    /// Whether the table is registered in the live catalog.
    pub async fn is_attached(&self, table: &TableSelector) -> Result<bool, TableError> {
        let query = Query::new(
            "SELECT 1 FROM system.tables WHERE database = {database:String} AND name = {table:String}",
        )
        .param("database", &table.database)
        .param("table", &table.table)
        .timeout(self.timeouts.query);

        let rows = self
            .executor
            .fetch(&query)
            .await
            .map_err(|e| TableError::query(format!("checking whether {table} is attached"), e))?;
        Ok(!rows.is_empty())
    }

    /// UUID and catalog file location of an attached table, `None` if detached.
    pub async fn table_info(&self, table: &TableSelector) -> Result<Option<TableInfo>, TableError> {
        let query = Query::new(
            "SELECT toString(uuid) AS uuid, metadata_path FROM system.tables \
             WHERE database = {database:String} AND name = {table:String}",
        )
        .param("database", &table.database)
        .param("table", &table.table)
        .timeout(self.timeouts.query);

        let rows: Vec<TableInfo> = fetch_as(self.executor.as_ref(), &query)
            .await
            .map_err(|e| TableError::query(format!("reading system.tables for {table}"), e))?;
        Ok(rows.into_iter().next())
    }

    /// `DETACH TABLE`. A non-permanent detach keeps the table registered for the
    /// next server start.
    pub async fn detach_table(
        &self,
        table: &TableSelector,
        permanently: bool,
    ) -> Result<(), TableError> {
        tracing::info!(database = %table.database, table = %table.table, permanently, "Detaching table");

        let mut sql = format!(
            "DETACH TABLE {}.{}",
            quote_identifier(&table.database),
            quote_identifier(&table.table)
        );
        if permanently {
            sql.push_str(" PERMANENTLY");
        }
        let query = Query::new(sql).timeout(self.timeouts.detach_table);

        self.executor
            .execute(&query)
            .await
            .map_err(|e| TableError::query(format!("detaching {table}"), e))
    }

    pub async fn attach_table(&self, table: &TableSelector) -> Result<(), TableError> {
        tracing::info!(database = %table.database, table = %table.table, "Attaching table");

        let query = Query::new(format!(
            "ATTACH TABLE {}.{}",
            quote_identifier(&table.database),
            quote_identifier(&table.table)
        ))
        .timeout(self.timeouts.attach_table);

        self.executor
            .execute(&query)
            .await
            .map_err(|e| TableError::query(format!("attaching {table}"), e))
    }
}
