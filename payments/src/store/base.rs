use std::future::Future;

use bytes::Bytes;

use crate::error::PaymentsResult;

/// Shared ordered queue of serialized payment records.
pub trait QueueStore: Send + Sync + 'static {
    /// Returns a full snapshot of the queue in order.
    ///
    /// Entries are returned as stored by the producer; malformed entries are the reader's concern.
    fn snapshot(&self) -> impl Future<Output = PaymentsResult<Vec<Bytes>>> + Send;
}

/// Operation persisting pending payment records to durable storage.
pub trait BatchFlusher: Send + Sync + 'static {
    /// Persists a batch of pending records and returns how many were persisted.
    ///
    /// Must be cheap and safe to call repeatedly when nothing is pending, returning `0`.
    fn flush_batch(&self) -> impl Future<Output = PaymentsResult<usize>> + Send;
}
