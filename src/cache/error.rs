use thiserror::Error;

use crate::domain::track::TrackId;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("track {0} is not cached")]
    NotFound(TrackId),

    #[error("requested range is outside of {total} cached bytes")]
    RangeNotSatisfiable { total: u64 },

    #[error("invalid cache file name {0:?}")]
    InvalidFileName(String),

    #[error("filesystem error: {0}")]
    Fs(#[from] std::io::Error),
}

impl From<tempfile::PersistError> for CacheError {
    fn from(err: tempfile::PersistError) -> Self {
        CacheError::Fs(err.error)
    }
}
