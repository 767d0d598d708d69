use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::ObjectId;

const TRACING_TARGET: &str = "blobserve:store";

/// Read lease over one object. The lease is owned by the reader, which in
/// turn is owned by the response body, so dropping any of them releases it.
/// Release happens exactly once, whether the transfer completed or the
/// client went away mid-stream.
pub(crate) struct Lease {
    id: ObjectId,
    counter: Arc<AtomicUsize>,
}

impl Lease {
    pub(crate) fn acquire(id: ObjectId, counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Lease { id, counter }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(target: TRACING_TARGET, id = %self.id, "released read lease");
    }
}
