//! HTTP producer for provider-backed data sources.
//!
//! Every request carries its own timeout; the read path imposes none. Responses
//! are classified into the two outcomes the cache cares about: `404` is a
//! confirmed absence, anything else that is not a success is transient.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::error::DataSourceError;

#[derive(Clone)]
pub struct NetworkClient {
    http_client: Client,
}

impl NetworkClient {
    pub fn new(timeout: Duration) -> Result<Self, DataSourceError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataSourceError::upstream(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http_client })
    }

    pub fn with_client(http_client: Client) -> Self {
        Self { http_client }
    }

    /// GET `url` and decode the JSON body.
    pub async fn get_json(&self, url: &str) -> Result<Value, DataSourceError> {
        let response = self.http_client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                DataSourceError::upstream(format!("timed out requesting {url}"))
            } else {
                DataSourceError::upstream(format!("request to {url} failed: {e}"))
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DataSourceError::not_found(url));
        }
        if !status.is_success() {
            tracing::debug!(url = %url, status = status.as_u16(), "Upstream returned error status");
            return Err(DataSourceError::from_status(status.as_u16(), url));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| DataSourceError::upstream(format!("invalid JSON from {url}: {e}")))
    }
}

impl Default for NetworkClient {
    fn default() -> Self {
        Self::with_client(Client::new())
    }
}
