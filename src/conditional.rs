//! Conditional `GET` evaluation.

use std::time::SystemTime;

use axum::http::HeaderMap;
use axum_extra::headers::{ETag, HeaderMapExt, IfModifiedSince, IfNoneMatch};

/// The conditional request headers relevant to cache revalidation.
#[derive(Debug, Clone, Default)]
pub struct Precondition {
    if_modified_since: Option<IfModifiedSince>,
    if_none_match: Option<IfNoneMatch>,
}

impl Precondition {
    /// Decodes the conditional headers from a request. A header that fails
    /// to decode is treated as absent.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Precondition {
            if_modified_since: headers.typed_get(),
            if_none_match: headers.typed_get(),
        }
    }

    /// True when the transfer can be replaced by `304 Not Modified`.
    ///
    /// The two checks are independent: a last-modified not newer than the
    /// client's copy short-circuits on its own, and so does a match of the
    /// entity tag set, regardless of what the other header says.
    pub fn not_modified(&self, last_modified: SystemTime, etag: Option<&ETag>) -> bool {
        if let Some(since) = &self.if_modified_since {
            if !since.is_modified(last_modified) {
                return true;
            }
        }

        if let (Some(none_match), Some(etag)) = (&self.if_none_match, etag) {
            if !none_match.precondition_passes(etag) {
                return true;
            }
        }

        false
    }
}
