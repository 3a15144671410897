use std::path::PathBuf;
use std::time::Duration;

use ch_client::ClientError;
use metadata::{MetadataError, TableSelector};
use uuid::Uuid;

use crate::disks::DiskRole;

/// A precondition that does not hold. Nothing was modified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error(
        "replica path '{replica_path}' of {table} contains the {{uuid}} macro; changing its UUID is not allowed"
    )]
    UuidMacroInReplicaPath {
        table: TableSelector,
        replica_path: String,
    },
    #[error(
        "UUID {requested} for {table} differs from table_shared_id {shared_id} recorded at '{replica_path}'"
    )]
    SharedIdMismatch {
        table: TableSelector,
        replica_path: String,
        requested: Uuid,
        shared_id: Uuid,
    },
    #[error("{table} already has UUID {uuid}")]
    SameUuid { table: TableSelector, uuid: Uuid },
    #[error("table {table} is attached; delete it with DROP TABLE instead")]
    TableAttached { table: TableSelector },
    #[error("no catalog file for {table} at {}", path.display())]
    MissingCatalogFile { table: TableSelector, path: PathBuf },
    #[error(
        "{} is not visible on disk {disk} and lenient missing-path mode is disabled",
        path.display()
    )]
    PathNotVisible { disk: String, path: PathBuf },
}

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("query failed while {context}: {source}")]
    Query {
        context: String,
        #[source]
        source: ClientError,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{tool} failed on disk {disk} for {path}: exit code {code:?}, stderr: {stderr}")]
    ExternalTool {
        tool: String,
        disk: String,
        path: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error(
        "{table} is inconsistent: catalog file {} now holds UUID {new_uuid}, but moving {} to {} failed: {source}. \
         Restore UUID {old_uuid} in the catalog file or move the store directory by hand before attaching the table",
        catalog_path.display(),
        store_from.display(),
        store_to.display()
    )]
    InconsistentState {
        table: TableSelector,
        old_uuid: Uuid,
        new_uuid: Uuid,
        catalog_path: PathBuf,
        store_from: PathBuf,
        store_to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("disks '{first}' and '{second}' are both {role}; at most one disk per role is supported")]
    DiskLayout {
        role: DiskRole,
        first: String,
        second: String,
    },

    #[error("coordination service: {0}")]
    Coordination(String),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An error from an operation on `table` whose own message does not name it.
    #[error("{table}: {error}")]
    OnTable {
        table: TableSelector,
        error: Box<TableError>,
    },
}

/// Broad class of a [`TableError`], used to pick a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Query,
    Validation,
    ExternalTool,
    InconsistentState,
    DiskLayout,
    Coordination,
    Timeout,
    Io,
}

impl ErrorKind {
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Validation => 2,
            ErrorKind::Parse => 3,
            ErrorKind::ExternalTool => 4,
            ErrorKind::InconsistentState => 5,
            _ => 1,
        }
    }
}

impl TableError {
    pub(crate) fn query(context: impl Into<String>, source: ClientError) -> Self {
        match source {
            ClientError::Timeout(timeout) => Self::Timeout {
                operation: context.into(),
                timeout,
            },
            source => Self::Query {
                context: context.into(),
                source,
            },
        }
    }

    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Attach `table` unless the error already names it.
    pub(crate) fn on_table(self, table: &TableSelector) -> Self {
        match self {
            TableError::Validation(ValidationError::PathNotVisible { .. }) => Self::OnTable {
                table: table.clone(),
                error: Box::new(self),
            },
            TableError::Validation(_)
            | TableError::InconsistentState { .. }
            | TableError::OnTable { .. } => self,
            other => Self::OnTable {
                table: table.clone(),
                error: Box::new(other),
            },
        }
    }

    /// The error underneath any [`TableError::OnTable`] wrapping.
    pub fn inner(&self) -> &TableError {
        match self {
            TableError::OnTable { error, .. } => error.inner(),
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TableError::Metadata(MetadataError::Parse { .. }) => ErrorKind::Parse,
            TableError::Metadata(MetadataError::Io { .. }) => ErrorKind::Io,
            TableError::Query { .. } => ErrorKind::Query,
            TableError::Validation(_) => ErrorKind::Validation,
            TableError::ExternalTool { .. } => ErrorKind::ExternalTool,
            TableError::InconsistentState { .. } => ErrorKind::InconsistentState,
            TableError::DiskLayout { .. } => ErrorKind::DiskLayout,
            TableError::Coordination(_) => ErrorKind::Coordination,
            TableError::Timeout { .. } => ErrorKind::Timeout,
            TableError::Io { .. } => ErrorKind::Io,
            TableError::OnTable { error, .. } => error.kind(),
        }
    }

    /// Always `false`: the operations here are never retried automatically.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
