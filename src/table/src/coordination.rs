//! Contract with the distributed coordination service (ZooKeeper/Keeper).
//!
//! Only the calls the orchestrators need are defined here. The bundled
//! implementation goes through the server itself: `system.zookeeper` for reads
//! and `SYSTEM DROP REPLICA ... FROM ZKPATH` for removing a replica's subtree.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ch_client::{Query, QueryExecutor, fetch_as, quote_literal};
use common::config::TimeoutConfig;
use metadata::TableSelector;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::TableError;

/// Node under a replica path holding the table's shared identifier.
pub const TABLE_SHARED_ID_NODE: &str = "table_shared_id";

/// Which subtree to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaCleanup {
    pub root_path: String,
    pub replica_name: String,
    /// Also remove the database-level replica nodes
    pub cleanup_database: bool,
    /// Also remove the replica's entries from the DDL queue
    pub cleanup_ddl_queue: bool,
}

impl ReplicaCleanup {
    /// Only the replica's own node under `root_path`.
    pub fn replica_only(root_path: impl Into<String>, replica_name: impl Into<String>) -> Self {
        Self {
            root_path: root_path.into(),
            replica_name: replica_name.into(),
            cleanup_database: false,
            cleanup_ddl_queue: false,
        }
    }
}

#[async_trait]
pub trait CoordinationService: Send + Sync {
    /// Substitute `{macro}` placeholders in a replica path or replica name.
    async fn expand_macros(
        &self,
        template: &str,
        table: &TableSelector,
        uuid: Uuid,
    ) -> Result<String, TableError>;

    /// UUID recorded as authoritative for the replicated table at `replica_path`.
    async fn table_shared_id(&self, replica_path: &str) -> Result<Uuid, TableError>;

    /// Recursively delete the replica's subtree.
    async fn remove_replica(&self, cleanup: &ReplicaCleanup) -> Result<(), TableError>;
}

/// Substitute every `{name}` in `template` using `lookup`.
pub fn expand_macros(
    template: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, TableError> {
    let mut expanded = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        expanded.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            TableError::Coordination(format!("unterminated macro in '{template}'"))
        })?;
        let name = &after[..close];
        let value = lookup(name).ok_or_else(|| {
            TableError::Coordination(format!("unknown macro {{{name}}} in '{template}'"))
        })?;
        expanded.push_str(&value);
        rest = &after[close + 1..];
    }
    expanded.push_str(rest);
    Ok(expanded)
}

#[derive(Deserialize)]
struct MacroRow {
    #[serde(rename = "macro")]
    name: String,
    substitution: String,
}

#[derive(Deserialize)]
struct NodeValue {
    value: String,
}

/// Coordination access through the server's system tables.
pub struct ClickhouseCoordination {
    executor: Arc<dyn QueryExecutor>,
    timeouts: TimeoutConfig,
}

impl ClickhouseCoordination {
    pub fn new(executor: Arc<dyn QueryExecutor>, timeouts: TimeoutConfig) -> Self {
        Self { executor, timeouts }
    }

    async fn server_macros(&self) -> Result<HashMap<String, String>, TableError> {
        let query = Query::new("SELECT macro, substitution FROM system.macros")
            .timeout(self.timeouts.query);
        let rows: Vec<MacroRow> = fetch_as(self.executor.as_ref(), &query)
            .await
            .map_err(|e| TableError::query("reading system.macros", e))?;
        Ok(rows
            .into_iter()
            .map(|row| (row.name, row.substitution))
            .collect())
    }
}

#[async_trait]
impl CoordinationService for ClickhouseCoordination {
    async fn expand_macros(
        &self,
        template: &str,
        table: &TableSelector,
        uuid: Uuid,
    ) -> Result<String, TableError> {
        if !template.contains('{') {
            return Ok(template.to_string());
        }
        let macros = self.server_macros().await?;
        expand_macros(template, |name| match name {
            "database" => Some(table.database.clone()),
            "table" => Some(table.table.clone()),
            "uuid" => Some(uuid.to_string()),
            other => macros.get(other).cloned(),
        })
    }

    async fn table_shared_id(&self, replica_path: &str) -> Result<Uuid, TableError> {
        let path = replica_path.trim_end_matches('/');
        let query = Query::new(
            "SELECT value FROM system.zookeeper WHERE path = {path:String} AND name = {name:String}",
        )
        .param("path", path)
        .param("name", TABLE_SHARED_ID_NODE)
        .timeout(self.timeouts.query);

        let rows: Vec<NodeValue> = fetch_as(self.executor.as_ref(), &query)
            .await
            .map_err(|e| TableError::query(format!("reading {path}/{TABLE_SHARED_ID_NODE}"), e))?;
        let value = rows.into_iter().next().ok_or_else(|| {
            TableError::Coordination(format!("no {TABLE_SHARED_ID_NODE} node under '{path}'"))
        })?;

        Uuid::parse_str(value.value.trim()).map_err(|_| {
            TableError::Coordination(format!(
                "{path}/{TABLE_SHARED_ID_NODE} holds '{}', not a UUID",
                value.value
            ))
        })
    }

    async fn remove_replica(&self, cleanup: &ReplicaCleanup) -> Result<(), TableError> {
        if cleanup.cleanup_database || cleanup.cleanup_ddl_queue {
            return Err(TableError::Coordination(
                "database and DDL queue cleanup are not supported through the server".to_string(),
            ));
        }

        let path = cleanup.root_path.trim_end_matches('/');
        tracing::info!(replica = %cleanup.replica_name, path = %path, "Removing replica node");

        let query = Query::new(format!(
            "SYSTEM DROP REPLICA {} FROM ZKPATH {}",
            quote_literal(&cleanup.replica_name),
            quote_literal(path)
        ))
        .timeout(self.timeouts.system);

        self.executor.execute(&query).await.map_err(|e| {
            TableError::query(
                format!("removing replica {} at {path}", cleanup.replica_name),
                e,
            )
        })
    }
}
