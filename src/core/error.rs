use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Buffer gate not acquired within {0:?}")]
    GateTimeout(Duration),

    #[error("Controller error: {0}")]
    Controller(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Closed: {0}")]
    Closed(String),

    #[error("Task error: {0}")]
    Task(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

impl AlertError {
    /// Whether the caller may simply try the same call again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GateTimeout(_) | Self::Controller(_) | Self::Store(_) | Self::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AlertError>;

impl<T> From<std::sync::PoisonError<T>> for AlertError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

impl From<tokio_postgres::Error> for AlertError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for AlertError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Closed => Self::Closed("postgres pool is closed".into()),
            deadpool_postgres::PoolError::Timeout(kind) => {
                Self::Timeout(format!("postgres pool {:?} timed out", kind))
            }
            deadpool_postgres::PoolError::Backend(err) => Self::Store(err.to_string()),
            other => Self::Store(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for AlertError {
    fn from(err: reqwest::Error) -> Self {
        Self::Controller(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AlertError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(AlertError::GateTimeout(Duration::from_millis(5)).is_retryable());
        assert!(AlertError::Controller("refused".into()).is_retryable());
        assert!(AlertError::Store("broken pipe".into()).is_retryable());
        assert!(!AlertError::Config("parallelism must be > 0".into()).is_retryable());
    }

    #[test]
    fn test_closed_pool_error() {
        let closed = AlertError::from(deadpool_postgres::PoolError::Closed);
        assert!(matches!(closed, AlertError::Closed(_)));
        assert!(!closed.is_retryable());
    }

    #[test]
    fn test_gate_timeout_message() {
        let err = AlertError::GateTimeout(Duration::from_secs(2));
        assert_eq!(err.to_string(), "Buffer gate not acquired within 2s");
    }
}
