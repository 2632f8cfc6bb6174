use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::concurrency::bounded_wait::InFlight;
use crate::error::PaymentsResult;
use crate::gate::{GateController, GateId, GateObserver, GateRegistry};
use crate::store::QueueStore;
use crate::summary::aggregator::aggregate;
use crate::transport::BroadcastTransport;
use crate::types::{SummaryRange, SummaryResponse};

/// Label under which the admission wait is logged.
const ADMISSION_LABEL: &str = "summary admission";

/// Wait for the busy gates to clear, shared by every request of a handler and its clones.
///
/// At most one wait is in flight at a time. Requests arriving while it runs reuse it, and a new
/// one is spawned only after the previous one resolved, so timed-out requests never pile up
/// background work even when a gate stays blocked for good.
struct Admission {
    observers: [GateObserver; 2],
    in_flight: Mutex<Option<InFlight<()>>>,
}

impl Admission {
    fn is_clear(&self) -> bool {
        self.observers.iter().all(|observer| !observer.is_blocked())
    }

    fn current_wait(&self) -> InFlight<()> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(wait) = in_flight.as_ref().filter(|wait| !wait.is_finished()) {
            return wait.clone();
        }

        let observers = self.observers.clone();
        let wait = InFlight::spawn(ADMISSION_LABEL, async move {
            wait_until_all_unblocked(&observers).await;
            Ok(())
        });
        *in_flight = Some(wait.clone());

        wait
    }
}

/// Serves summary queries over the live payment queue.
///
/// Every query holds the [`GateId::SUMMARY_READERS`] gate while it runs, so other replicas can
/// react to active readers. Before reading, it waits a bounded amount of time for the
/// [`GateId::STORAGE_BUSY`] and [`GateId::TRANSPORT_BUSY`] gates to clear and proceeds anyway
/// once that budget is exhausted.
pub struct SummaryRequestHandler<T, Q> {
    readers: GateController<T>,
    admission: Arc<Admission>,
    queue: Arc<Q>,
    admission_timeout: Duration,
}

impl<T, Q> SummaryRequestHandler<T, Q>
where
    T: BroadcastTransport,
    Q: QueueStore,
{
    /// Creates a handler reading from `queue` and coordinating through `registry`.
    pub async fn new(
        registry: &GateRegistry<T>,
        queue: Arc<Q>,
        admission_timeout: Duration,
    ) -> PaymentsResult<Self> {
        let readers = registry.controller(&GateId::SUMMARY_READERS).await;
        let storage_busy = registry.observer(&GateId::STORAGE_BUSY).await?;
        let transport_busy = registry.observer(&GateId::TRANSPORT_BUSY).await?;

        Ok(Self {
            readers,
            admission: Arc::new(Admission {
                observers: [storage_busy, transport_busy],
                in_flight: Mutex::new(None),
            }),
            queue,
            admission_timeout,
        })
    }

    /// Returns the per-processor totals of the payments requested within `range`.
    ///
    /// The readers gate is released on every exit path, including when this future is dropped
    /// before completion. Failures to read the queue are returned after the release.
    pub async fn summarize(&self, range: SummaryRange) -> PaymentsResult<SummaryResponse> {
        let guard = self.readers.acquire().await;

        let result = self.admit_and_read(&range).await;

        guard.release().await;

        result
    }

    async fn admit_and_read(&self, range: &SummaryRange) -> PaymentsResult<SummaryResponse> {
        if !self.admission.is_clear() {
            let outcome = self
                .admission
                .current_wait()
                .wait_for(self.admission_timeout)
                .await?;

            if outcome.is_timed_out() {
                warn!(
                    timeout_ms = self.admission_timeout.as_millis() as u64,
                    "summary admission timed out, reading the queue without waiting for busy gates"
                );
            }
        }

        let entries = self.queue.snapshot().await?;
        let response = aggregate(&entries, range);

        debug!(
            entries = entries.len(),
            default_count = response.default.count,
            fallback_count = response.fallback.count,
            "summarized payment queue"
        );

        Ok(response)
    }
}

/// Waits until a single pass over `observers` finds none of them blocked.
async fn wait_until_all_unblocked(observers: &[GateObserver]) {
    loop {
        for observer in observers {
            observer.wait_until_unblocked().await;
        }

        if observers.iter().all(|observer| !observer.is_blocked()) {
            return;
        }
    }
}

impl<T, Q> Clone for SummaryRequestHandler<T, Q> {
    fn clone(&self) -> Self {
        Self {
            readers: self.readers.clone(),
            admission: self.admission.clone(),
            queue: self.queue.clone(),
            admission_timeout: self.admission_timeout,
        }
    }
}

impl<T, Q> fmt::Debug for SummaryRequestHandler<T, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SummaryRequestHandler")
            .field("readers", &self.readers)
            .field("admission_timeout", &self.admission_timeout)
            .finish_non_exhaustive()
    }
}
