use thiserror::Error;

use crate::PostingId;

/// Errors raised by the analytics core.
///
/// `InvalidQuery` and `NotFound` are caller mistakes; everything else is a
/// collaborator failure scoped to the operation that hit it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("job posting {0} not found")]
    NotFound(PostingId),
    #[error("record store is open read-only")]
    ReadOnly,
    #[error("feature space generation {handle} is stale (current is {current})")]
    StaleSpace { handle: u64, current: u64 },
    #[error(transparent)]
    Store(#[from] sled::Error),
    #[error(transparent)]
    Codec(#[from] bincode::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors the caller can fix by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidQuery(_) | Error::NotFound(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
