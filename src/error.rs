use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::response::RangeRejection;
use crate::store::StoreError;

const TRACING_TARGET: &str = "blobserve:http";

/// Errors a request can end with.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The id is unknown, unparseable, or the object is not served.
    #[error("object not found")]
    NotFound,
    #[error(transparent)]
    Range(#[from] RangeRejection),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::NotFound => StatusCode::NOT_FOUND.into_response(),
            Error::Range(rejection) => rejection.into_response(),
            Error::Store(error) => {
                tracing::error!(target: TRACING_TARGET, %error, "store failed while serving a request");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
