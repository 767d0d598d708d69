//! # blobserve
//!
//! HTTP byte-range and conditional `GET` serving over chunked blob stores.
//!
//! The [`ObjectStore`](store::ObjectStore) trait abstracts a store of
//! immutable blobs addressed by [`ObjectId`](store::ObjectId); the bundled
//! [`FsStore`](store::FsStore) keeps each object as numbered segment files
//! on disk. [`router`] mounts a single `GET /{object_id}` route over any
//! store, answering single `bytes` ranges with `206 Partial Content` and
//! `If-Modified-Since` / `If-None-Match` with `304 Not Modified`.
//!
//! The response machinery is also usable directly: anything implementing
//! [`BlobRead`] can be served through a [`Responder`], and any reader with
//! a known size can be adapted with [`SizedReader`].
//!
//! [`AsyncSeekStart`] is a trait defined by this crate which only allows
//! seeking from the start of an object. It is automatically implemented for
//! any type implementing [`AsyncSeek`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use blobserve::store::FsStore;
//! use blobserve::DEFAULT_READ_CHUNK;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(FsStore::new("/var/lib/blobserve"));
//!     let app = blobserve::router(store, DEFAULT_READ_CHUNK);
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:5000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

mod conditional;
mod disposition;
mod error;
mod handler;
mod range;
mod response;
mod stream;

pub mod store;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncSeek};

pub use conditional::Precondition;
pub use error::{Error, Result};
pub use handler::router;
pub use range::{ByteRange, RangeRequest};
pub use response::{BlobContent, BlobResponse, RangeRejection, Responder};
pub use stream::{ChunkStream, SizedReader, DEFAULT_READ_CHUNK};

/// [`AsyncSeek`] narrowed to only allow seeking from start.
pub trait AsyncSeekStart {
    /// Same semantics as [`AsyncSeek::start_seek`], always passing position as the `SeekFrom::Start` variant.
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()>;

    /// Same semantics as [`AsyncSeek::poll_complete`], returning `()` instead of the new stream position.
    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

impl<T: AsyncSeek> AsyncSeekStart for T {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        AsyncSeek::start_seek(self, io::SeekFrom::Start(position))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncSeek::poll_complete(self, cx).map_ok(|_| ())
    }
}

/// An [`AsyncRead`] and [`AsyncSeekStart`] with a fixed known byte size.
pub trait BlobRead: AsyncRead + AsyncSeekStart {
    /// The total size of the underlying object.
    ///
    /// This should not change for the lifetime of the object once queried.
    /// Behaviour is not guaranteed if it does change.
    fn byte_size(&self) -> u64;
}
