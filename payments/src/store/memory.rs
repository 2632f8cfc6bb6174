use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::PaymentsResult;
use crate::store::base::{BatchFlusher, QueueStore};
use crate::types::PaymentRecord;

/// Default number of records persisted by one flush.
pub const DEFAULT_FLUSH_BATCH_SIZE: usize = 500;

#[derive(Debug, Default)]
struct Inner {
    queue: Vec<Bytes>,
    /// Number of queue entries already persisted, counted from the front.
    persisted_upto: usize,
    persisted: Vec<Bytes>,
}

/// In-memory queue and durable store.
///
/// Flushing copies pending entries into the durable list without removing them from the live
/// queue, so summary reads never depend on how far draining has progressed.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    max_batch_size: usize,
}

impl MemoryStore {
    /// Creates an empty store flushing [`DEFAULT_FLUSH_BATCH_SIZE`] records at a time.
    pub fn new() -> Self {
        Self::with_batch_size(DEFAULT_FLUSH_BATCH_SIZE)
    }

    /// Creates an empty store flushing at most `max_batch_size` records at a time.
    pub fn with_batch_size(max_batch_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            max_batch_size: max_batch_size.max(1),
        }
    }

    /// Appends a raw entry to the queue, as an external producer would.
    pub async fn push_raw(&self, entry: impl Into<Bytes>) {
        let mut inner = self.inner.lock().await;
        inner.queue.push(entry.into());
    }

    /// Serializes `record` and appends it to the queue.
    pub async fn push(&self, record: &PaymentRecord) -> PaymentsResult<()> {
        let entry = serde_json::to_vec(record)?;
        self.push_raw(entry).await;

        Ok(())
    }

    /// Returns a copy of every persisted entry.
    pub async fn persisted(&self) -> Vec<Bytes> {
        let inner = self.inner.lock().await;
        inner.persisted.clone()
    }

    /// Returns how many queued entries are not persisted yet.
    pub async fn pending(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.queue.len() - inner.persisted_upto
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueStore for MemoryStore {
    async fn snapshot(&self) -> PaymentsResult<Vec<Bytes>> {
        let inner = self.inner.lock().await;
        Ok(inner.queue.clone())
    }
}

impl BatchFlusher for MemoryStore {
    async fn flush_batch(&self) -> PaymentsResult<usize> {
        let mut inner = self.inner.lock().await;

        let start = inner.persisted_upto;
        let end = inner.queue.len().min(start + self.max_batch_size);
        if start == end {
            return Ok(0);
        }

        let batch = inner.queue[start..end].to_vec();
        inner.persisted.extend(batch);
        inner.persisted_upto = end;

        debug!(persisted = end - start, "persisted payment batch");

        Ok(end - start)
    }
}
