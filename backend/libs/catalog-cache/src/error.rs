//! Cache error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Cache backend unavailable")]
    Unavailable,
}

impl CacheError {
    /// True when the error means the backend could not be reached at all,
    /// as opposed to a bad value or a rejected command.
    pub fn is_connection_error(&self) -> bool {
        match self {
            CacheError::Redis(e) => {
                e.is_io_error()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
                    || e.is_timeout()
            }
            CacheError::Timeout(_) | CacheError::Unavailable => true,
            CacheError::Serialization(_) => false,
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
