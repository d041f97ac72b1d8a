//! Error types for the cache read path.

use thiserror::Error;

use crate::dedup::Cancelled;

/// Error returned by upstream producers and by the cache-first read path.
///
/// This is the one classification every producer must provide: `NotFound`
/// results are cached negatively, everything else is propagated without
/// touching the cache. The type is `Clone` so a single settled result can be
/// handed to every deduplicated waiter unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataSourceError {
    /// Upstream confirmed the resource does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Network failure, non-404 status, timeout or cancelled computation.
    #[error("Upstream request failed{}: {message}", status_suffix(.status))]
    Upstream {
        status: Option<u16>,
        message: String,
    },
}

impl DataSourceError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            status: None,
            message: message.into(),
        }
    }

    /// Classify an HTTP status returned by a provider.
    pub fn from_status(status: u16, resource: impl Into<String>) -> Self {
        let resource = resource.into();
        if status == 404 {
            Self::NotFound(resource)
        } else {
            Self::Upstream {
                status: Some(status),
                message: resource,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// HTTP status to surface to end users.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Upstream { .. } => 503,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(status) => format!(" with status {status}"),
        None => String::new(),
    }
}

impl From<Cancelled> for DataSourceError {
    fn from(e: Cancelled) -> Self {
        Self::upstream(e.to_string())
    }
}

/// Failure of a key-value store operation.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache pool error: {0}")]
    Pool(String),

    #[error("Cache command error: {0}")]
    Command(String),

    #[error("Cache codec error: {0}")]
    Codec(String),
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Self::Pool(e.to_string())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        Self::Command(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for CacheError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CacheError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Self::Codec(e.to_string())
    }
}
