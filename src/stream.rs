use std::{io, mem};
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use pin_project::pin_project;
use tokio::io::{AsyncRead, ReadBuf};

use crate::{AsyncSeekStart, BlobRead};

/// Default read size for body streaming, in bytes.
pub const DEFAULT_READ_CHUNK: usize = 8192;

/// Response body stream over a window of a [`BlobRead`]: seeks once to the
/// window start, then yields at most one read of the underlying reader per
/// chunk. Implements [`Stream`], [`Body`], and [`IntoResponse`].
#[pin_project]
pub struct ChunkStream<B> {
    state: StreamState,
    length: u64,
    chunk_size: usize,
    #[pin]
    reader: B,
}

impl<B: BlobRead + Send + 'static> ChunkStream<B> {
    pub(crate) fn new(reader: B, start: u64, length: u64, chunk_size: usize) -> Self {
        ChunkStream {
            state: StreamState::Seek { start },
            length,
            chunk_size: chunk_size.max(1),
            reader,
        }
    }
}

#[derive(Debug)]
enum StreamState {
    Seek { start: u64 },
    Seeking { remaining: u64 },
    Reading { buffer: BytesMut, remaining: u64 },
}

fn allocate_buffer(chunk_size: usize) -> BytesMut {
    BytesMut::with_capacity(chunk_size)
}

impl<B: BlobRead + Send + 'static> IntoResponse for ChunkStream<B> {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl<B: BlobRead> Body for ChunkStream<B> {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.length)
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl<B: BlobRead> Stream for ChunkStream<B> {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<io::Result<Bytes>>> {
        let mut this = self.project();

        if let StreamState::Seek { start } = *this.state {
            match this.reader.as_mut().start_seek(start) {
                Err(e) => { return Poll::Ready(Some(Err(e))); }
                Ok(()) => {
                    let remaining = *this.length;
                    *this.state = StreamState::Seeking { remaining };
                }
            }
        }

        if let StreamState::Seeking { remaining } = *this.state {
            match this.reader.as_mut().poll_complete(cx) {
                Poll::Pending => { return Poll::Pending; }
                Poll::Ready(Err(e)) => { return Poll::Ready(Some(Err(e))); }
                Poll::Ready(Ok(())) => {
                    let buffer = allocate_buffer(*this.chunk_size);
                    *this.state = StreamState::Reading { buffer, remaining };
                }
            }
        }

        if let StreamState::Reading { buffer, remaining } = this.state {
            if *remaining == 0 {
                return Poll::Ready(None);
            }

            let uninit = buffer.spare_capacity_mut();

            // max number of bytes to read in this iteration, the smaller of
            // the chunk size and the number of bytes left in the window
            let nbytes = std::cmp::min(
                uninit.len(),
                usize::try_from(*remaining).unwrap_or(usize::MAX),
            );

            let mut read_buf = ReadBuf::uninit(&mut uninit[0..nbytes]);

            match this.reader.as_mut().poll_read(cx, &mut read_buf) {
                Poll::Pending => { return Poll::Pending; }
                Poll::Ready(Err(e)) => { return Poll::Ready(Some(Err(e))); }
                Poll::Ready(Ok(())) => {
                    match read_buf.filled().len() {
                        0 => { return Poll::Ready(None); }
                        n => {
                            // SAFETY: poll_read has filled the buffer with `n`
                            // additional bytes. `buffer.len` should always be
                            // 0 here, but include it for rigorous correctness
                            unsafe { buffer.set_len(buffer.len() + n); }

                            // replace state buffer and take this one to return
                            let chunk = mem::replace(buffer, allocate_buffer(*this.chunk_size));

                            // this usize->u64 conversion always succeeds:
                            // n cannot exceed remaining due to the min above
                            *remaining -= u64::try_from(n).unwrap_or(u64::MAX);

                            return Poll::Ready(Some(Ok(chunk.freeze())));
                        }
                    }
                }
            }
        }

        unreachable!();
    }
}

/// Attaches an explicit byte size to a reader, implementing [`BlobRead`].
///
/// Useful when the caller already knows the object length, for example for
/// a [`Cursor`](std::io::Cursor) over in-memory bytes.
#[pin_project]
pub struct SizedReader<R> {
    byte_size: u64,
    #[pin]
    reader: R,
}

impl<R: AsyncRead + AsyncSeekStart> SizedReader<R> {
    /// Wraps `reader`, trusting `byte_size` as its total length.
    pub fn new(reader: R, byte_size: u64) -> Self {
        SizedReader { byte_size, reader }
    }
}

impl<R: AsyncRead> AsyncRead for SizedReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().reader.poll_read(cx, buf)
    }
}

impl<R: AsyncSeekStart> AsyncSeekStart for SizedReader<R> {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        self.project().reader.start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().reader.poll_complete(cx)
    }
}

impl<R: AsyncRead + AsyncSeekStart> BlobRead for SizedReader<R> {
    fn byte_size(&self) -> u64 {
        self.byte_size
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use bytes::Bytes;
    use futures::{pin_mut, Stream, StreamExt};

    use super::{ChunkStream, SizedReader};

    const FIXTURE: &str = "Hello world this is a file to test range requests on!\n";

    fn reader() -> SizedReader<Cursor<&'static str>> {
        SizedReader::new(Cursor::new(FIXTURE), FIXTURE.len() as u64)
    }

    async fn collect(stream: impl Stream<Item = io::Result<Bytes>>) -> Vec<Bytes> {
        pin_mut!(stream);
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk.unwrap());
        }
        chunks
    }

    #[tokio::test]
    async fn test_whole_object() {
        let stream = ChunkStream::new(reader(), 0, FIXTURE.len() as u64, 8192);
        let chunks = collect(stream).await;

        assert_eq!(1, chunks.len());
        assert_eq!(FIXTURE.as_bytes(), &chunks[0][..]);
    }

    #[tokio::test]
    async fn test_chunk_sizing() {
        let stream = ChunkStream::new(reader(), 0, FIXTURE.len() as u64, 10);
        let chunks = collect(stream).await;

        let sizes: Vec<usize> = chunks.iter().map(|chunk| chunk.len()).collect();
        assert_eq!(vec![10, 10, 10, 10, 10, 4], sizes);
        assert_eq!(FIXTURE.as_bytes(), &chunks.concat()[..]);
    }

    #[tokio::test]
    async fn test_window() {
        let stream = ChunkStream::new(reader(), 50, 4, 8192);
        let chunks = collect(stream).await;

        assert_eq!(b"on!\n", &chunks.concat()[..]);
    }

    #[tokio::test]
    async fn test_window_with_small_chunks() {
        let stream = ChunkStream::new(reader(), 6, 5, 2);
        let chunks = collect(stream).await;

        let sizes: Vec<usize> = chunks.iter().map(|chunk| chunk.len()).collect();
        assert_eq!(vec![2, 2, 1], sizes);
        assert_eq!(b"world", &chunks.concat()[..]);
    }

    #[tokio::test]
    async fn test_zero_window() {
        let stream = ChunkStream::new(reader(), 0, 0, 8192);
        let chunks = collect(stream).await;

        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_ends_at_reader_eof() {
        // the window claims more bytes than the reader holds; the stream
        // must end at the underlying end of data instead of polling forever
        let reader = SizedReader::new(Cursor::new(FIXTURE), 1000);
        let stream = ChunkStream::new(reader, 0, 1000, 8192);
        let chunks = collect(stream).await;

        assert_eq!(FIXTURE.len(), chunks.concat().len());
    }
}
