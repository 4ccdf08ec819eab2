use fleet_common::error::DatabaseError;
use thiserror::Error;

/// Logical error kinds (§7), independent of transport. Mapped to OpAMP
/// `ErrorResponse` types in `opamp::session` and to HTTP statuses in
/// `api::error`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage temporarily unavailable")]
    Unavailable(#[source] DatabaseError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Storage errors are surfaced as `Unavailable` (transient, agent/caller
    /// may retry) except `NotFound`, which callers are expected to map to
    /// their own domain-specific not-found message via `.or_not_found(..)`.
    pub fn from_storage(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound => ServiceError::NotFound("record not found".to_owned()),
            other => ServiceError::Unavailable(other),
        }
    }
}

/// Maps a storage `NotFound` to a domain-specific message; passes other
/// variants through `from_storage` unchanged.
pub trait NotFoundContext<T> {
    fn or_not_found(self, message: impl Into<String>) -> Result<T, ServiceError>;
}

impl<T> NotFoundContext<T> for Result<T, DatabaseError> {
    fn or_not_found(self, message: impl Into<String>) -> Result<T, ServiceError> {
        self.map_err(|e| match e {
            DatabaseError::NotFound => ServiceError::NotFound(message.into()),
            other => ServiceError::from_storage(other),
        })
    }
}
