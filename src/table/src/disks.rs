//! Disk inventory and physical removal of table data.
//!
//! The server reports every storage backend in `system.disks`. Each disk is
//! classified as local or object storage. Removal goes through an external
//! per-disk tool (`clickhouse-disks`), which knows how to delete both local
//! directories and the objects behind an object-storage disk.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ch_client::{Query, QueryExecutor, ServerVersion, fetch_as, server_version};
use common::config::{DisksConfig, PathsConfig};
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{TableError, ValidationError};

/// `system.disks.type` values that denote object storage. Everything else is local.
pub const OBJECT_STORAGE_DISK_TYPES: &[&str] = &["s3", "s3_plain", "ObjectStorage"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskRole {
    Local,
    ObjectStorage,
}

impl DiskRole {
    pub fn classify(disk_type: &str) -> Self {
        if OBJECT_STORAGE_DISK_TYPES.contains(&disk_type) {
            DiskRole::ObjectStorage
        } else {
            DiskRole::Local
        }
    }
}

impl fmt::Display for DiskRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskRole::Local => f.write_str("local"),
            DiskRole::ObjectStorage => f.write_str("object storage"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskDescriptor {
    pub name: String,
    pub disk_type: String,
    pub role: DiskRole,
}

#[derive(Debug, Clone, Deserialize)]
struct DiskRow {
    name: String,
    #[serde(rename = "type")]
    disk_type: String,
}

/// How the remover expects its command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoverSyntax {
    /// `remove <path>` as positional arguments
    Positional,
    /// `--query 'remove -r <path>'`, used by the tool shipped with 24.7 and later
    Query,
}

impl RemoverSyntax {
    pub fn for_version(version: &ServerVersion) -> Self {
        if version.at_least(24, 7) {
            RemoverSyntax::Query
        } else {
            RemoverSyntax::Positional
        }
    }

    pub fn command_args(&self, path: &str) -> Vec<String> {
        match self {
            RemoverSyntax::Positional => vec!["remove".to_string(), path.to_string()],
            RemoverSyntax::Query => vec!["--query".to_string(), format!("remove -r {path}")],
        }
    }
}

/// Exit status and captured stderr of one remover run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoverOutput {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stderr: Vec<u8>,
}

impl RemoverOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait DiskRemover: Send + Sync {
    /// Name used in diagnostics.
    fn tool_name(&self) -> &str;

    /// Remove `relative_path` from `disk`. A nonzero exit is reported through the
    /// output, not as an error.
    async fn remove(
        &self,
        disk: &str,
        relative_path: &str,
        disk_config: &Path,
        syntax: RemoverSyntax,
    ) -> Result<RemoverOutput, TableError>;
}

/// Runs the `clickhouse-disks` binary.
pub struct ClickhouseDisksRemover {
    binary: String,
    timeout: Duration,
}

impl ClickhouseDisksRemover {
    pub fn new(config: &DisksConfig) -> Self {
        Self {
            binary: config.remover.clone(),
            timeout: config.remover_timeout,
        }
    }
}

#[async_trait]
impl DiskRemover for ClickhouseDisksRemover {
    fn tool_name(&self) -> &str {
        &self.binary
    }

    async fn remove(
        &self,
        disk: &str,
        relative_path: &str,
        disk_config: &Path,
        syntax: RemoverSyntax,
    ) -> Result<RemoverOutput, TableError> {
        let mut command = Command::new(&self.binary);
        command
            .arg("-C")
            .arg(disk_config)
            .arg("--disk")
            .arg(disk)
            .args(syntax.command_args(relative_path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(command = ?command, "Running disk remover");

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| TableError::Timeout {
                operation: format!("{} on disk {disk}", self.binary),
                timeout: self.timeout,
            })?
            .map_err(|e| TableError::io("run", PathBuf::from(&self.binary), e))?;

        Ok(RemoverOutput {
            exit_code: output.status.code(),
            stderr: output.stderr,
        })
    }
}

/// Disk inventory and per-disk removal.
pub struct DiskResolver {
    executor: Arc<dyn QueryExecutor>,
    remover: Arc<dyn DiskRemover>,
    paths: PathsConfig,
    disks: DisksConfig,
    query_timeout: Duration,
}

impl DiskResolver {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        remover: Arc<dyn DiskRemover>,
        paths: PathsConfig,
        disks: DisksConfig,
        query_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            remover,
            paths,
            disks,
            query_timeout,
        }
    }

    /// Fetch and classify the disk inventory. Excluded disks are left out; any
    /// other disk is classified, never dropped.
    pub async fn list_disks(&self) -> Result<Vec<DiskDescriptor>, TableError> {
        let query = Query::new("SELECT name, type FROM system.disks ORDER BY name")
            .timeout(self.query_timeout);
        let rows: Vec<DiskRow> = fetch_as(self.executor.as_ref(), &query)
            .await
            .map_err(|e| TableError::query("listing disks", e))?;

        let rows: Vec<(String, String)> = rows
            .into_iter()
            .filter(|row| !self.disks.excluded.contains(&row.name))
            .map(|row| (row.name, row.disk_type))
            .collect();
        tracing::info!(disks = ?rows, "Found disks");

        let disks = classify_disks(rows)?;
        tracing::info!(disks = ?disks, "Table disks");
        Ok(disks)
    }

    /// Remover syntax matching the running server.
    pub async fn remover_syntax(&self) -> Result<RemoverSyntax, TableError> {
        let version = server_version(self.executor.as_ref(), self.query_timeout)
            .await
            .map_err(|e| TableError::query("reading server version", e))?;
        Ok(RemoverSyntax::for_version(&version))
    }

    /// Where `relative_path` on `disk` would be visible on this host.
    pub fn local_path(&self, disk: &DiskDescriptor, relative_path: &str) -> PathBuf {
        let mount = match disk.role {
            DiskRole::Local => &self.paths.clickhouse,
            DiskRole::ObjectStorage => &self.paths.object_storage,
        };
        mount.join(relative_path)
    }

    /// Remove `relative_path` from `disk` with the external remover.
    ///
    /// A path that is not visible locally is only reported: older servers keep
    /// object-storage metadata elsewhere, so the remover still runs unless
    /// lenient missing-path mode is turned off.
    pub async fn remove_from_disk(
        &self,
        disk: &DiskDescriptor,
        relative_path: &str,
        syntax: RemoverSyntax,
    ) -> Result<(), TableError> {
        let visible = self.local_path(disk, relative_path);
        let exists = tokio::fs::try_exists(&visible)
            .await
            .map_err(|e| TableError::io("inspect", &visible, e))?;
        if !exists {
            if !self.disks.lenient_missing_paths {
                return Err(ValidationError::PathNotVisible {
                    disk: disk.name.clone(),
                    path: visible,
                }
                .into());
            }
            tracing::warn!(
                disk = %disk.name,
                path = %visible.display(),
                "Path is not visible locally, running the remover anyway"
            );
        }

        tracing::info!(disk = %disk.name, path = %relative_path, "Removing table data from disk");
        let output = self
            .remover
            .remove(
                &disk.name,
                relative_path,
                self.disks.config_for(&disk.name),
                syntax,
            )
            .await?;

        if !output.success() {
            return Err(TableError::ExternalTool {
                tool: self.remover.tool_name().to_string(),
                disk: disk.name.clone(),
                path: relative_path.to_string(),
                code: output.exit_code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Classify `(name, type)` pairs. At most one disk may hold each role.
pub fn classify_disks(
    rows: impl IntoIterator<Item = (String, String)>,
) -> Result<Vec<DiskDescriptor>, TableError> {
    let mut assigned: HashMap<DiskRole, String> = HashMap::new();
    let mut disks = Vec::new();

    for (name, disk_type) in rows {
        let role = DiskRole::classify(&disk_type);
        if let Some(first) = assigned.get(&role) {
            return Err(TableError::DiskLayout {
                role,
                first: first.clone(),
                second: name,
            });
        }
        assigned.insert(role, name.clone());
        disks.push(DiskDescriptor {
            name,
            disk_type,
            role,
        });
    }
    Ok(disks)
}
