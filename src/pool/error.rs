use std::time::Duration;

/// Error types for connection pool operations
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("Target set is empty, no backend to dial")]
    NoTargetsAvailable,

    #[error("Pool is closed")]
    PoolClosed,

    #[error("Connection is empty, rejecting")]
    InvalidConnection,

    #[error("Dial timed out after {0:?}")]
    DialTimeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PoolError {
    /// Whether the caller can reasonably retry the same operation later
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PoolError::NoTargetsAvailable | PoolError::DialTimeout(_) | PoolError::Io(_)
        )
    }
}
