use thiserror::Error;

/// Core error types for txgate identifiers and events
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid chain id: {0}")]
    InvalidChainId(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new MalformedEvent error
    pub fn malformed_event(message: impl Into<String>) -> Self {
        Self::MalformedEvent(message.into())
    }

    /// Check if this error was caused by bad input rather than by the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidChainId(_)
                | Self::InvalidAddress(_)
                | Self::InvalidHash(_)
                | Self::MalformedEvent(_)
                | Self::JsonError(_)
        )
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
