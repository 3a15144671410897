//! Query execution against the live server.
//!
//! Everything above this crate talks to ClickHouse through [`QueryExecutor`], so
//! orchestration logic can be exercised without a server.

pub mod error;
pub mod http;
pub mod query;
pub mod version;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

pub use error::ClientError;
pub use http::HttpClient;
pub use query::{Query, quote_identifier, quote_literal};
pub use version::{ServerVersion, server_version};

/// One result row as returned by `FORMAT JSON`.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a statement whose result is not needed.
    async fn execute(&self, query: &Query) -> Result<(), ClientError>;

    /// Run a query and return its rows.
    async fn fetch(&self, query: &Query) -> Result<Vec<Row>, ClientError>;
}

/// Run a query and deserialize each row into `T`.
pub async fn fetch_as<T: DeserializeOwned>(
    executor: &dyn QueryExecutor,
    query: &Query,
) -> Result<Vec<T>, ClientError> {
    executor
        .fetch(query)
        .await?
        .into_iter()
        .map(|row| serde_json::from_value(serde_json::Value::Object(row)).map_err(Into::into))
        .collect()
}
