use rouille::Response;
use serde::Serialize;
use thiserror::Error;

use crate::{
    cache::CacheError, domain::track::InvalidTrackId, playback::PlaybackError,
    storage::error::StorageError,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("requested range not satisfiable")]
    RangeNotSatisfiable { total: u64 },

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        log::error!("storage failure: {err}");
        ApiError::Internal("internal server error".into())
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::NotFound(id) => ApiError::NotFound(format!("track {id} is not cached")),
            CacheError::RangeNotSatisfiable { total } => ApiError::RangeNotSatisfiable { total },
            CacheError::InvalidFileName(name) => {
                ApiError::BadRequest(format!("invalid cache file name {name:?}"))
            }
            CacheError::Fs(e) => {
                log::error!("cache failure: {e}");
                ApiError::Internal("internal server error".into())
            }
        }
    }
}

impl From<PlaybackError> for ApiError {
    fn from(err: PlaybackError) -> Self {
        match err {
            PlaybackError::NotFound { .. } => ApiError::NotFound("Could not find song".into()),
            PlaybackError::Upstream(e) => {
                log::warn!("resolver failure: {e}");
                ApiError::Upstream("could not reach audio source".into())
            }
        }
    }
}

impl From<InvalidTrackId> for ApiError {
    fn from(err: InvalidTrackId) -> Self {
        ApiError::BadRequest(format!("invalid track id: {err}"))
    }
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Unauthorized => 401,
            ApiError::NotFound(_) => 404,
            ApiError::BadRequest(_) => 400,
            ApiError::RangeNotSatisfiable { .. } => 416,
            ApiError::Upstream(_) => 502,
            ApiError::Internal(_) => 500,
        }
    }

    fn with_range_headers(&self, response: Response) -> Response {
        match self {
            ApiError::RangeNotSatisfiable { total } => response
                .with_unique_header("Content-Range", format!("bytes */{total}"))
                .with_unique_header("Accept-Ranges", "bytes"),
            _ => response,
        }
    }

    /// `{"error": ...}` body, for JSON endpoints
    pub fn into_response(self) -> Response {
        let status = self.status_code();
        let response = Response::json(&ErrorBody {
            error: self.to_string(),
        })
        .with_status_code(status);
        self.with_range_headers(response)
    }

    /// short plain text body, for audio endpoints
    pub fn into_text_response(self) -> Response {
        let status = self.status_code();
        let response = Response::text(self.to_string()).with_status_code(status);
        self.with_range_headers(response)
    }
}
