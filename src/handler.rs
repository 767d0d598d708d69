use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::conditional::Precondition;
use crate::error::{Error, Result};
use crate::response::Responder;
use crate::store::{Blob, ObjectStore};

const TRACING_TARGET: &str = "blobserve:http";

struct AppState<S> {
    store: Arc<S>,
    chunk_size: usize,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        AppState {
            store: self.store.clone(),
            chunk_size: self.chunk_size,
        }
    }
}

/// Builds the router serving `GET /{object_id}`. axum answers `HEAD` for the
/// same path from this handler, dropping the body after the headers.
pub fn router<S: ObjectStore + 'static>(store: Arc<S>, chunk_size: usize) -> Router {
    Router::new()
        .route("/{object_id}", get(get_object::<S>))
        .with_state(AppState { store, chunk_size })
}

#[tracing::instrument(skip_all, fields(id = %object_id))]
async fn get_object<S: ObjectStore>(
    State(state): State<AppState<S>>,
    Path(object_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    let id = object_id.parse().map_err(|_| Error::NotFound)?;

    let Some(Blob { meta, reader }) = state.store.open(id).await? else {
        tracing::debug!(target: TRACING_TARGET, %id, "no such object");
        return Err(Error::NotFound);
    };

    if meta.unavailable() {
        tracing::debug!(
            target: TRACING_TARGET,
            %id,
            pending = meta.pending,
            deleted = meta.deleted,
            blocked = meta.blocked,
            "object is not served",
        );
        return Err(Error::NotFound);
    }

    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    let response = Responder::new(meta, reader)
        .with_precondition(Precondition::from_headers(&headers))
        .with_range(range)
        .with_chunk_size(state.chunk_size)
        .try_respond()?;

    Ok(response.into_response())
}
