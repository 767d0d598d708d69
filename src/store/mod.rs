//! Object store abstraction and the chunked filesystem implementation.

mod fs;
mod lease;

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::BlobRead;

pub use fs::{ChunkReader, FsStore};
pub(crate) use lease::Lease;

/// Errors raised by a backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The object's metadata record is corrupt or inconsistent.
    #[error("invalid object record: {0}")]
    Metadata(String),
    /// The underlying storage failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn metadata(message: impl Into<String>) -> Self {
        StoreError::Metadata(message.into())
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Identifier of a stored object: twelve bytes rendered as twenty-four hex
/// characters. Ids are derived from the object's content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    pub(crate) fn from_digest(digest: &[u8; 32]) -> Self {
        let mut bytes = [0u8; 12];
        bytes.copy_from_slice(&digest[..12]);
        ObjectId(bytes)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Error parsing an [`ObjectId`] from its hex form.
#[derive(Debug, thiserror::Error)]
#[error("object ids are 24 hex characters")]
pub struct ParseObjectIdError;

impl FromStr for ObjectId {
    type Err = ParseObjectIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.len() != 24 {
            return Err(ParseObjectIdError);
        }

        let mut bytes = [0u8; 12];
        hex::decode_to_slice(value, &mut bytes).map_err(|_| ParseObjectIdError)?;
        Ok(ObjectId(bytes))
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(D::Error::custom)
    }
}

/// Metadata record for one stored object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Identifier, derived from the content digest.
    pub id: ObjectId,
    /// Total content length in bytes.
    pub length: u64,
    /// Size of the on-disk segments the content is split into.
    pub chunk_len: u64,
    /// Declared media type, if one was recorded at insert time.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Original filename, advertised via `Content-Disposition`.
    pub filename: String,
    /// Last modification time, unix seconds.
    pub last_modified: u64,
    /// Lowercase hex SHA-256 of the content. Doubles as the entity tag.
    pub digest: String,
    /// The upload has not finished yet.
    #[serde(default)]
    pub pending: bool,
    /// Tombstoned, awaiting garbage collection.
    #[serde(default)]
    pub deleted: bool,
    /// Administratively hidden.
    #[serde(default)]
    pub blocked: bool,
}

impl ObjectMeta {
    /// True when the object must not be served.
    pub fn unavailable(&self) -> bool {
        self.pending || self.deleted || self.blocked
    }

    /// Last modification time as a [`SystemTime`].
    pub fn modified_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.last_modified)
    }
}

/// A read handle over one object: its metadata and a reader positioned at
/// the start of the content.
pub struct Blob<R> {
    pub meta: ObjectMeta,
    pub reader: R,
}

/// Backing store of immutable blobs addressed by [`ObjectId`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Reader type produced by [`open`](ObjectStore::open).
    type Reader: BlobRead + Send + 'static;

    /// Fetches the object's metadata and acquires a read lease. Returns
    /// `Ok(None)` for ids the store has never seen.
    async fn open(&self, id: ObjectId) -> Result<Option<Blob<Self::Reader>>>;
}
