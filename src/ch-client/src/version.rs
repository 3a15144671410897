use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ClientError;
use crate::query::Query;
use crate::{QueryExecutor, fetch_as};

/// Server version as reported by `version()`, e.g. `24.8.4.13`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    raw: String,
}

impl ServerVersion {
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl FromStr for ServerVersion {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let mut next = || {
            parts
                .next()
                .and_then(|part| part.parse::<u32>().ok())
                .ok_or_else(|| ClientError::Unexpected(format!("invalid server version '{s}'")))
        };
        let major = next()?;
        let minor = next()?;

        Ok(Self {
            major,
            minor,
            raw: s.trim().to_string(),
        })
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Deserialize)]
struct VersionRow {
    version: String,
}

/// Ask the server for its version.
pub async fn server_version(
    executor: &dyn QueryExecutor,
    query_timeout: std::time::Duration,
) -> Result<ServerVersion, ClientError> {
    let query = Query::new("SELECT version() AS version").timeout(query_timeout);
    let rows: Vec<VersionRow> = fetch_as(executor, &query).await?;
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::Unexpected("version() returned no rows".to_string()))?;
    row.version.parse()
}
