//! Where the server keeps catalog files, data links and UUID-keyed stores.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

/// A `(database, table)` pair naming one table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableSelector {
    pub database: String,
    pub table: String,
}

impl TableSelector {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// Escape a database or table name the way the server does for file names:
/// ASCII alphanumerics and `_` are kept, every other byte becomes `%XX`.
pub fn escape_for_file_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' {
            escaped.push(char::from(byte));
        } else {
            escaped.push_str(&format!("%{byte:02X}"));
        }
    }
    escaped
}

/// `store/<first three chars>/<uuid>`, relative to a disk root.
pub fn store_relative_path(uuid: &Uuid) -> String {
    let uuid = uuid.hyphenated().to_string();
    format!("store/{}/{}", &uuid[..3], uuid)
}

/// Paths under the server root (`/var/lib/clickhouse` by default).
#[derive(Debug, Clone)]
pub struct CatalogLayout {
    root: PathBuf,
}

impl CatalogLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join("metadata")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    /// `metadata/<db>.sql`
    pub fn database_metadata_path(&self, database: &str) -> PathBuf {
        self.metadata_dir()
            .join(format!("{}.sql", escape_for_file_name(database)))
    }

    /// `metadata/<db>/<table>.sql`
    pub fn table_metadata_path(&self, table: &TableSelector) -> PathBuf {
        self.metadata_dir()
            .join(escape_for_file_name(&table.database))
            .join(format!("{}.sql", escape_for_file_name(&table.table)))
    }

    /// Marker left next to the catalog file by `DETACH ... PERMANENTLY`.
    pub fn detached_flag_path(&self, table: &TableSelector) -> PathBuf {
        let mut path = self.table_metadata_path(table).into_os_string();
        path.push(".detached");
        PathBuf::from(path)
    }

    /// `data/<db>/<table>`, the link from the table name to its store directory.
    pub fn table_data_link(&self, table: &TableSelector) -> PathBuf {
        self.data_dir()
            .join(escape_for_file_name(&table.database))
            .join(escape_for_file_name(&table.table))
    }

    /// Local UUID-keyed store directory.
    pub fn store_dir(&self, uuid: &Uuid) -> PathBuf {
        self.root.join(store_relative_path(uuid))
    }
}
