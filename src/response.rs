//! Response assembly: precondition checks first, then range resolution,
//! then the streaming body with its validator and representation headers.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{AcceptRanges, ContentLength, ContentRange, ETag, LastModified};
use axum_extra::TypedHeader;

use crate::conditional::Precondition;
use crate::disposition;
use crate::range::RangeRequest;
use crate::store::ObjectMeta;
use crate::stream::{ChunkStream, DEFAULT_READ_CHUNK};
use crate::BlobRead;

fn entity_tag(digest: &str) -> Option<ETag> {
    format!("\"{digest}\"").parse().ok()
}

fn content_type(meta: &ObjectMeta) -> HeaderValue {
    meta.content_type
        .as_deref()
        .and_then(|value| HeaderValue::from_str(value).ok())
        .unwrap_or_else(|| {
            let guessed = mime_guess::from_path(&meta.filename)
                .first_raw()
                .unwrap_or("application/octet-stream");
            HeaderValue::from_static(guessed)
        })
}

/// Builds the response for one object read: evaluates the request's
/// preconditions, resolves the requested byte window against the object's
/// length and hands back either a short-circuit status or a streaming body.
pub struct Responder<B: BlobRead + Send + 'static> {
    meta: ObjectMeta,
    reader: B,
    range: Option<String>,
    precondition: Precondition,
    chunk_size: usize,
}

impl<B: BlobRead + Send + 'static> Responder<B> {
    pub fn new(meta: ObjectMeta, reader: B) -> Self {
        Responder {
            meta,
            reader,
            range: None,
            precondition: Precondition::default(),
            chunk_size: DEFAULT_READ_CHUNK,
        }
    }

    /// Raw `Range` header value, if the request carried one.
    pub fn with_range(mut self, range: Option<&str>) -> Self {
        self.range = range.map(str::to_owned);
        self
    }

    pub fn with_precondition(mut self, precondition: Precondition) -> Self {
        self.precondition = precondition;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn try_respond(self) -> Result<BlobResponse<B>, RangeRejection> {
        let Responder {
            meta,
            reader,
            range,
            precondition,
            chunk_size,
        } = self;

        let etag = entity_tag(&meta.digest);
        let modified = meta.modified_at();

        // Preconditions come first. A request whose cache is current gets a
        // 304 no matter what window it asked for, and the reader drops here
        // before a body stream ever exists.
        if precondition.not_modified(modified, etag.as_ref()) {
            return Ok(BlobResponse::NotModified);
        }

        let total = meta.length;
        let byte_range = match RangeRequest::parse(range.as_deref(), total) {
            RangeRequest::Absent | RangeRequest::Full => None,
            RangeRequest::Range(range) => Some(range),
            RangeRequest::Malformed => return Err(RangeRejection::UnsupportedUnit),
            RangeRequest::Unsatisfiable => {
                return Err(RangeRejection::Unsatisfiable(
                    ContentRange::unsatisfied_bytes(total),
                ));
            }
        };

        let content_range = byte_range.map(|range| {
            ContentRange::bytes(range.start..range.end, total)
                .expect("ContentRange::bytes cannot fail for a validated window")
        });

        let (start, window) = match byte_range {
            Some(range) => (range.start, range.len()),
            None => (0, total),
        };

        Ok(BlobResponse::Content(BlobContent {
            content_range,
            content_length: ContentLength(window),
            content_type: content_type(&meta),
            content_disposition: disposition::inline_utf8(&meta.filename),
            etag,
            last_modified: LastModified::from(modified),
            stream: ChunkStream::new(reader, start, window, chunk_size),
        }))
    }
}

impl<B: BlobRead + Send + 'static> IntoResponse for Responder<B> {
    fn into_response(self) -> Response {
        match self.try_respond() {
            Ok(response) => response.into_response(),
            Err(rejection) => rejection.into_response(),
        }
    }
}

/// A response that passed range resolution: either a bare `304 Not Modified`
/// or a full or partial body.
pub enum BlobResponse<B: BlobRead + Send + 'static> {
    NotModified,
    Content(BlobContent<B>),
}

impl<B: BlobRead + Send + 'static> IntoResponse for BlobResponse<B> {
    fn into_response(self) -> Response {
        match self {
            BlobResponse::NotModified => StatusCode::NOT_MODIFIED.into_response(),
            BlobResponse::Content(content) => content.into_response(),
        }
    }
}

/// Streaming body plus the headers describing it. Responds with `206 Partial
/// Content` when a window was requested and `200 OK` otherwise.
pub struct BlobContent<B: BlobRead + Send + 'static> {
    pub content_range: Option<ContentRange>,
    pub content_length: ContentLength,
    pub content_type: HeaderValue,
    pub content_disposition: HeaderValue,
    pub etag: Option<ETag>,
    pub last_modified: LastModified,
    pub stream: ChunkStream<B>,
}

impl<B: BlobRead + Send + 'static> IntoResponse for BlobContent<B> {
    fn into_response(self) -> Response {
        let status = if self.content_range.is_some() {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        };

        (
            status,
            self.content_range.map(TypedHeader),
            self.etag.map(TypedHeader),
            TypedHeader(self.content_length),
            TypedHeader(self.last_modified),
            TypedHeader(AcceptRanges::bytes()),
            [
                (header::CONTENT_TYPE, self.content_type),
                (header::CONTENT_DISPOSITION, self.content_disposition),
            ],
            self.stream,
        )
            .into_response()
    }
}

/// Rejections produced while resolving the `Range` header.
#[derive(Debug, thiserror::Error)]
pub enum RangeRejection {
    /// The request asked for a unit other than bytes.
    #[error("unsupported range unit")]
    UnsupportedUnit,
    /// The window does not overlap the object.
    #[error("range not satisfiable")]
    Unsatisfiable(ContentRange),
}

impl IntoResponse for RangeRejection {
    fn into_response(self) -> Response {
        match self {
            RangeRejection::UnsupportedUnit => StatusCode::BAD_REQUEST.into_response(),
            RangeRejection::Unsatisfiable(content_range) => {
                (StatusCode::RANGE_NOT_SATISFIABLE, TypedHeader(content_range), ()).into_response()
            }
        }
    }
}
