use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::error::PaymentsResult;
use crate::store::BatchFlusher;

/// [`BatchFlusher`] returning queued results in order and `Ok(0)` once the script is exhausted.
#[derive(Debug, Default)]
pub struct ScriptedFlusher {
    script: Mutex<VecDeque<PaymentsResult<usize>>>,
    calls: AtomicUsize,
}

impl ScriptedFlusher {
    /// Creates a flusher that always reports nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a flusher returning `results` on its first calls.
    pub fn with_script(results: impl IntoIterator<Item = PaymentsResult<usize>>) -> Self {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns how many times [`BatchFlusher::flush_batch`] was called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Waits until at least `expected` flushes were attempted.
    ///
    /// # Panics
    ///
    /// Panics if `timeout` elapses first.
    pub async fn wait_for_calls(&self, expected: usize, timeout: Duration) {
        let started = Instant::now();
        while self.calls() < expected {
            if started.elapsed() > timeout {
                panic!(
                    "flusher was called {} times, expected at least {expected} within {timeout:?}",
                    self.calls()
                );
            }

            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

impl BatchFlusher for ScriptedFlusher {
    async fn flush_batch(&self) -> PaymentsResult<usize> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front());

        next.unwrap_or(Ok(0))
    }
}
