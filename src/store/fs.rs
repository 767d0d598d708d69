use std::future::Future;
use std::io::{self, SeekFrom};
use std::mem;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncSeekExt, ReadBuf};

use super::{Blob, Lease, ObjectId, ObjectMeta, ObjectStore, Result, StoreError};
use crate::{AsyncSeekStart, BlobRead};

const TRACING_TARGET: &str = "blobserve:store";

const DEFAULT_CHUNK_LEN: u64 = 256 * 1024;
const META_FILE: &str = "meta.json";

fn chunk_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("{index:06}.chunk"))
}

async fn open_chunk(path: PathBuf, offset: u64) -> io::Result<File> {
    let mut file = File::open(path).await?;
    if offset > 0 {
        file.seek(SeekFrom::Start(offset)).await?;
    }
    Ok(file)
}

async fn read_meta(dir: &Path) -> Result<Option<ObjectMeta>> {
    let bytes = match fs::read(dir.join(META_FILE)).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let meta: ObjectMeta =
        serde_json::from_slice(&bytes).map_err(|err| StoreError::metadata(err.to_string()))?;

    if meta.chunk_len == 0 {
        return Err(StoreError::metadata("chunk_len must be positive"));
    }

    if meta.digest.len() != 64 || !meta.digest.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(StoreError::metadata("digest is not a hex sha-256"));
    }

    Ok(Some(meta))
}

async fn write_meta(dir: &Path, meta: &ObjectMeta) -> Result<()> {
    let json =
        serde_json::to_vec_pretty(meta).map_err(|err| StoreError::metadata(err.to_string()))?;
    fs::write(dir.join(META_FILE), json).await?;
    Ok(())
}

/// Filesystem-backed [`ObjectStore`]. Each object lives in its own directory
/// named after the id, holding a `meta.json` record and the content split
/// into fixed-size numbered segment files:
///
/// ```text
/// <root>/6593dbe0cfc9a0435b7b3bb1/meta.json
/// <root>/6593dbe0cfc9a0435b7b3bb1/000000.chunk
/// <root>/6593dbe0cfc9a0435b7b3bb1/000001.chunk
/// ```
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    chunk_len: u64,
    open_leases: Arc<AtomicUsize>,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsStore {
            root: root.into(),
            chunk_len: DEFAULT_CHUNK_LEN,
            open_leases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sets the segment size used for newly inserted objects.
    pub fn with_chunk_len(mut self, chunk_len: u64) -> Self {
        self.chunk_len = chunk_len.max(1);
        self
    }

    /// Number of read leases currently held against this store.
    pub fn open_leases(&self) -> usize {
        self.open_leases.load(Ordering::SeqCst)
    }

    fn object_dir(&self, id: ObjectId) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Stores `data` under an id derived from its digest and returns the id.
    /// Re-inserting identical content overwrites the same record in place.
    pub async fn insert(
        &self,
        filename: &str,
        content_type: Option<&str>,
        data: &[u8],
    ) -> Result<ObjectId> {
        let digest: [u8; 32] = Sha256::digest(data).into();
        let id = ObjectId::from_digest(&digest);
        let dir = self.object_dir(id);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let meta = ObjectMeta {
            id,
            length: data.len() as u64,
            chunk_len: self.chunk_len,
            content_type: content_type.map(str::to_owned),
            filename: filename.to_owned(),
            last_modified: now,
            digest: hex::encode(digest),
            pending: false,
            deleted: false,
            blocked: false,
        };

        fs::create_dir_all(&dir).await?;

        // Segments land before the record does. A record without all of its
        // segments must never become visible to readers.
        let chunk_len = usize::try_from(self.chunk_len).unwrap_or(usize::MAX);
        for (index, chunk) in data.chunks(chunk_len).enumerate() {
            fs::write(chunk_path(&dir, index as u64), chunk).await?;
        }

        write_meta(&dir, &meta).await?;
        tracing::debug!(target: TRACING_TARGET, %id, length = meta.length, "stored object");

        Ok(id)
    }

    /// Rewrites the object's metadata record through `apply`.
    pub async fn update_meta<F>(&self, id: ObjectId, apply: F) -> Result<()>
    where
        F: FnOnce(&mut ObjectMeta),
    {
        let dir = self.object_dir(id);
        let mut meta = read_meta(&dir)
            .await?
            .ok_or_else(|| StoreError::metadata("no such object"))?;

        apply(&mut meta);
        write_meta(&dir, &meta).await
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    type Reader = ChunkReader;

    async fn open(&self, id: ObjectId) -> Result<Option<Blob<ChunkReader>>> {
        let dir = self.object_dir(id);
        let Some(meta) = read_meta(&dir).await? else {
            return Ok(None);
        };

        let lease = Lease::acquire(id, self.open_leases.clone());
        let reader = ChunkReader::new(dir, meta.length, meta.chunk_len, lease);

        Ok(Some(Blob { meta, reader }))
    }
}

enum ReadState {
    Idle,
    Opening(u64, Pin<Box<dyn Future<Output = io::Result<File>> + Send>>),
    Reading(u64, File),
}

/// Reader over one stored object's segment files. Segments are opened
/// lazily, so seeking costs nothing until the next read.
pub struct ChunkReader {
    dir: PathBuf,
    length: u64,
    chunk_len: u64,
    pos: u64,
    state: ReadState,
    _lease: Lease,
}

impl ChunkReader {
    pub(crate) fn new(dir: PathBuf, length: u64, chunk_len: u64, lease: Lease) -> Self {
        ChunkReader {
            dir,
            length,
            chunk_len,
            pos: 0,
            state: ReadState::Idle,
            _lease: lease,
        }
    }
}

impl AsyncRead for ChunkReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            if this.pos >= this.length {
                return Poll::Ready(Ok(()));
            }

            match mem::replace(&mut this.state, ReadState::Idle) {
                ReadState::Idle => {
                    let index = this.pos / this.chunk_len;
                    let offset = this.pos % this.chunk_len;
                    let path = chunk_path(&this.dir, index);
                    this.state = ReadState::Opening(index, Box::pin(open_chunk(path, offset)));
                }
                ReadState::Opening(index, mut open) => match open.as_mut().poll(cx) {
                    Poll::Pending => {
                        this.state = ReadState::Opening(index, open);
                        return Poll::Pending;
                    }
                    Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),
                    Poll::Ready(Ok(file)) => {
                        this.state = ReadState::Reading(index, file);
                    }
                },
                ReadState::Reading(index, mut file) => {
                    let chunk_end = (index + 1).saturating_mul(this.chunk_len);
                    if this.pos >= chunk_end {
                        // Exhausted this segment, open the next one.
                        continue;
                    }

                    // Cap the read at the segment boundary so a segment file
                    // longer than chunk_len cannot leak bytes out of order.
                    let window = usize::try_from(chunk_end - this.pos).unwrap_or(usize::MAX);
                    let mut limited = buf.take(window);

                    match Pin::new(&mut file).poll_read(cx, &mut limited) {
                        Poll::Pending => {
                            this.state = ReadState::Reading(index, file);
                            return Poll::Pending;
                        }
                        Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),
                        Poll::Ready(Ok(())) => {
                            let n = limited.filled().len();
                            if n == 0 {
                                return Poll::Ready(Err(io::Error::new(
                                    io::ErrorKind::UnexpectedEof,
                                    "segment file ended before the recorded length",
                                )));
                            }

                            // SAFETY: the inner read initialized `n` bytes of
                            // the window it was handed.
                            unsafe { buf.assume_init(n) };
                            buf.advance(n);
                            this.pos += n as u64;
                            this.state = ReadState::Reading(index, file);
                            return Poll::Ready(Ok(()));
                        }
                    }
                }
            }
        }
    }
}

impl AsyncSeekStart for ChunkReader {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        let this = self.get_mut();
        this.pos = position;
        this.state = ReadState::Idle;
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl BlobRead for ChunkReader {
    fn byte_size(&self) -> u64 {
        self.length
    }
}
