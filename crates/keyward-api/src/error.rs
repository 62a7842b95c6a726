//! Error types for the admission HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    TooManyRequests(String),

    #[error(transparent)]
    Cache(#[from] keyward_cache::CacheError),

    #[error(transparent)]
    Queue(#[from] keyward_queue::QueueError),

    #[error(transparent)]
    Blob(#[from] keyward_blobstore::BlobStoreError),

    #[error(transparent)]
    Codec(#[from] keyward_vault::VaultCodecError),

    #[error(transparent)]
    State(#[from] keyward_state::StateError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Codec(keyward_vault::VaultCodecError::BadPassword) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Blob(keyward_blobstore::BlobStoreError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::State(keyward_state::StateError::Blob(
                keyward_blobstore::BlobStoreError::NotFound(_),
            )) => StatusCode::NOT_FOUND,
            ApiError::State(keyward_state::StateError::Codec(
                keyward_vault::VaultCodecError::BadPassword,
            )) => StatusCode::BAD_REQUEST,
            ApiError::State(keyward_state::StateError::ShareNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Cache(_) | ApiError::Queue(_) | ApiError::Blob(_) | ApiError::Codec(_)
            | ApiError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Internal error detail never reaches the client; only the 4xx
        // branches surface a message worth showing.
        let body = match status {
            StatusCode::INTERNAL_SERVER_ERROR => "internal error".to_string(),
            _ => self.to_string(),
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        (status, body).into_response()
    }
}
