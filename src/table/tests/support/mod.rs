//! In-process stand-ins for the server, the remover and the coordination service.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ch_client::{ClientError, Query, QueryExecutor, Row};
use metadata::TableSelector;
use serde_json::{Value, json};
use table::{
    CoordinationService, DiskRemover, RemoverOutput, RemoverSyntax, ReplicaCleanup, TableError,
};
use uuid::Uuid;

pub const OLD_UUID: &str = "11111111-1111-4111-8111-111111111111";
pub const NEW_UUID: &str = "22222222-2222-4222-8222-222222222222";

pub fn uuid(value: &str) -> Uuid {
    Uuid::parse_str(value).unwrap()
}

pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("row must be an object, got {other}"),
    }
}

/// Answers queries by the first registered SQL fragment they contain.
/// Unmatched `fetch` calls return no rows.
#[derive(Default)]
pub struct FakeExecutor {
    responses: Mutex<Vec<(String, Vec<Row>)>>,
    failures: Mutex<Vec<String>>,
    log: Mutex<Vec<Query>>,
}

impl FakeExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Later registrations for the same fragment replace earlier ones.
    pub fn respond(&self, fragment: &str, rows: Vec<Row>) {
        let mut responses = self.responses.lock().unwrap();
        responses.retain(|(existing, _)| existing != fragment);
        responses.push((fragment.to_string(), rows));
    }

    pub fn fail_on(&self, fragment: &str) {
        self.failures.lock().unwrap().push(fragment.to_string());
    }

    /// Report `table` as attached with its catalog file at `metadata_path`.
    pub fn attached(&self, table_uuid: &str, metadata_path: &Path) {
        self.respond(
            "FROM system.tables",
            vec![row(json!({
                "1": 1,
                "uuid": table_uuid,
                "metadata_path": metadata_path.to_string_lossy(),
            }))],
        );
    }

    pub fn disks(&self, disks: &[(&str, &str)]) {
        let rows = disks
            .iter()
            .map(|(name, kind)| row(json!({ "name": name, "type": kind })))
            .collect();
        self.respond("FROM system.disks", rows);
    }

    pub fn version(&self, version: &str) {
        self.respond("version()", vec![row(json!({ "version": version }))]);
    }

    pub fn queries(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|query| query.sql().to_string())
            .collect()
    }

    /// Every query seen so far, with its bound parameters.
    pub fn recorded(&self) -> Vec<Query> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, query: &Query) -> Result<(), ClientError> {
        self.log.lock().unwrap().push(query.clone());
        let failures = self.failures.lock().unwrap();
        if failures.iter().any(|fragment| query.sql().contains(fragment)) {
            return Err(ClientError::Server {
                status: 500,
                message: format!("injected failure for {}", query.sql()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl QueryExecutor for FakeExecutor {
    async fn execute(&self, query: &Query) -> Result<(), ClientError> {
        self.record(query)
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<Row>, ClientError> {
        self.record(query)?;
        let responses = self.responses.lock().unwrap();
        Ok(responses
            .iter()
            .find(|(fragment, _)| query.sql().contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoverCall {
    pub disk: String,
    pub path: String,
    pub disk_config: PathBuf,
    pub syntax: RemoverSyntax,
}

/// Records every call; exits with the code registered for the disk, 0 otherwise.
#[derive(Default)]
pub struct FakeRemover {
    exit_codes: Mutex<HashMap<String, i32>>,
    calls: Mutex<Vec<RemoverCall>>,
}

impl FakeRemover {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn exit_with(&self, disk: &str, code: i32) {
        self.exit_codes
            .lock()
            .unwrap()
            .insert(disk.to_string(), code);
    }

    pub fn calls(&self) -> Vec<RemoverCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DiskRemover for FakeRemover {
    fn tool_name(&self) -> &str {
        "fake-disks"
    }

    async fn remove(
        &self,
        disk: &str,
        relative_path: &str,
        disk_config: &Path,
        syntax: RemoverSyntax,
    ) -> Result<RemoverOutput, TableError> {
        self.calls.lock().unwrap().push(RemoverCall {
            disk: disk.to_string(),
            path: relative_path.to_string(),
            disk_config: disk_config.to_path_buf(),
            syntax,
        });
        let code = self
            .exit_codes
            .lock()
            .unwrap()
            .get(disk)
            .copied()
            .unwrap_or(0);
        Ok(RemoverOutput {
            exit_code: Some(code),
            stderr: if code == 0 {
                Vec::new()
            } else {
                b"Code: 1001. DB::Exception: injected".to_vec()
            },
        })
    }
}

/// Macros are expanded from a fixed map; unknown ones stay as written.
#[derive(Default)]
pub struct FakeCoordination {
    shared_id: Mutex<Option<Uuid>>,
    macros: Mutex<HashMap<String, String>>,
    shared_id_lookups: Mutex<Vec<String>>,
    removed: Mutex<Vec<ReplicaCleanup>>,
}

impl FakeCoordination {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_shared_id(shared_id: Uuid) -> Arc<Self> {
        let fake = Self::default();
        *fake.shared_id.lock().unwrap() = Some(shared_id);
        Arc::new(fake)
    }

    pub fn define(&self, name: &str, value: &str) {
        self.macros
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    pub fn shared_id_lookups(&self) -> Vec<String> {
        self.shared_id_lookups.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<ReplicaCleanup> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl CoordinationService for FakeCoordination {
    async fn expand_macros(
        &self,
        template: &str,
        table: &TableSelector,
        uuid: Uuid,
    ) -> Result<String, TableError> {
        let macros = self.macros.lock().unwrap().clone();
        table::expand_macros(template, |name| match name {
            "database" => Some(table.database.clone()),
            "table" => Some(table.table.clone()),
            "uuid" => Some(uuid.to_string()),
            other => Some(
                macros
                    .get(other)
                    .cloned()
                    .unwrap_or_else(|| format!("{{{other}}}")),
            ),
        })
    }

    async fn table_shared_id(&self, replica_path: &str) -> Result<Uuid, TableError> {
        self.shared_id_lookups
            .lock()
            .unwrap()
            .push(replica_path.to_string());
        self.shared_id
            .lock()
            .unwrap()
            .ok_or_else(|| TableError::Coordination(format!("no table_shared_id at {replica_path}")))
    }

    async fn remove_replica(&self, cleanup: &ReplicaCleanup) -> Result<(), TableError> {
        self.removed.lock().unwrap().push(cleanup.clone());
        Ok(())
    }
}

/// Write `metadata/<db>/<table>.sql` under `root` and return its path.
pub fn write_catalog_file(root: &Path, table: &TableSelector, contents: &str) -> PathBuf {
    let path = metadata::CatalogLayout::new(root).table_metadata_path(table);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, contents).unwrap();
    path
}

pub fn table_sql(table_uuid: &str, engine: &str) -> String {
    format!(
        "ATTACH TABLE _ UUID '{table_uuid}'\n(\n    `id` UInt64\n)\nENGINE = {engine}\nORDER BY id\nSETTINGS index_granularity = 8192\n"
    )
}
