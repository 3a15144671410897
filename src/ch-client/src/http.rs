//! Executor backed by the ClickHouse HTTP interface.

use std::time::Duration;

use async_trait::async_trait;
use common::config::ClickhouseConfig;
use reqwest::Client;
use serde::Deserialize;

use crate::error::ClientError;
use crate::query::Query;
use crate::{QueryExecutor, Row};

const USER_HEADER: &str = "X-ClickHouse-User";
const KEY_HEADER: &str = "X-ClickHouse-Key";

#[derive(Deserialize)]
struct JsonResponse {
    data: Vec<Row>,
}

/// HTTP client for one ClickHouse server.
pub struct HttpClient {
    client: Client,
    url: String,
    user: String,
    password: Option<String>,
    default_timeout: Duration,
}

impl HttpClient {
    /// Creates a client from configuration. Queries without an explicit timeout
    /// use the configured read-only query timeout.
    pub fn new(config: &ClickhouseConfig) -> Result<Self, ClientError> {
        let client = Client::builder().build()?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            password: config.password.clone(),
            default_timeout: config.timeouts.query,
        })
    }

    async fn send(&self, query: &Query, format_json: bool) -> Result<String, ClientError> {
        let timeout = query.get_timeout().unwrap_or(self.default_timeout);

        let mut body = query.sql().trim().trim_end_matches(';').to_string();
        if format_json {
            body.push_str("\nFORMAT JSON");
        }

        let mut params = vec![(
            "max_execution_time".to_string(),
            timeout.as_secs().max(1).to_string(),
        )];
        params.extend(
            query
                .params()
                .iter()
                .map(|(name, value)| (format!("param_{name}"), value.clone())),
        );

        let mut request = self
            .client
            .post(format!("{}/", self.url))
            .timeout(timeout)
            .header(USER_HEADER, &self.user)
            .query(&params)
            .body(body);
        if let Some(password) = &self.password {
            request = request.header(KEY_HEADER, password);
        }

        tracing::debug!(query = %query, timeout = ?timeout, "Executing query");

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(timeout)
            } else {
                ClientError::Http(e)
            }
        })?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Server {
                status: status.as_u16(),
                message: text.trim().to_string(),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl QueryExecutor for HttpClient {
    async fn execute(&self, query: &Query) -> Result<(), ClientError> {
        self.send(query, false).await.map(|_| ())
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<Row>, ClientError> {
        let text = self.send(query, true).await?;
        let response: JsonResponse = serde_json::from_str(&text)?;
        Ok(response.data)
    }
}
