//! Storage error mapping into the shared error type.

use pontual_core::errors::{DatabaseError, Error};
use thiserror::Error;

/// Faults raised by the SQLite layer before conversion into the shared
/// [`Error`] currency.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Query(inner) => {
                Error::Database(DatabaseError::QueryFailed(inner.to_string()))
            }
            StorageError::Pool(inner) => {
                Error::Database(DatabaseError::ConnectionFailed(inner.to_string()))
            }
        }
    }
}
