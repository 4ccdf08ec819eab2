use thiserror::Error;

/// Error kind returned by the KV substrate and the typed record stores built
/// on top of it. `NotFound` is distinguished so callers can decide whether an
/// absent record is a domain error or something to enrich around.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("not found")]
    NotFound,
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl DatabaseError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound)
    }
}
