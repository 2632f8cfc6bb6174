use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::error::{ErrorKind, PaymentsResult};
use crate::payments_error;

/// Outcome of a [`bounded_wait`] race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundedWaitOutcome<T> {
    /// The operation finished before the deadline.
    Completed(T),
    /// The deadline fired first; the operation keeps running in the background.
    TimedOut,
}

impl<T> BoundedWaitOutcome<T> {
    /// Returns `true` when the deadline fired before the operation finished.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, BoundedWaitOutcome::TimedOut)
    }
}

/// Operation running in its own task that any number of callers can wait on with a deadline.
///
/// The operation is never cancelled: callers giving up only stop listening. When it ends while
/// nobody is listening, its failure or panic is logged from the task that ran it, so an abandoned
/// operation costs exactly one task. Clones refer to the same operation.
pub struct InFlight<T> {
    label: &'static str,
    outcome_tx: Arc<watch::Sender<Option<PaymentsResult<T>>>>,
}

impl<T> InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Spawns `operation` onto the runtime.
    pub fn spawn<F>(label: &'static str, operation: F) -> Self
    where
        F: Future<Output = PaymentsResult<T>> + Send + 'static,
    {
        Self::spawn_watched(label, operation).0
    }

    /// Spawns `operation` with a listener registered before it can finish.
    fn spawn_watched<F>(
        label: &'static str,
        operation: F,
    ) -> (Self, watch::Receiver<Option<PaymentsResult<T>>>)
    where
        F: Future<Output = PaymentsResult<T>> + Send + 'static,
    {
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let outcome_tx = Arc::new(outcome_tx);

        let task_outcome_tx = outcome_tx.clone();
        tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(operation).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(payments_error!(
                    ErrorKind::TaskPanicked,
                    "Background task panicked",
                    label
                )),
            };

            if task_outcome_tx.receiver_count() == 0 {
                log_abandoned(label, &outcome);
            }
            task_outcome_tx.send_replace(Some(outcome));
        });

        (Self { label, outcome_tx }, outcome_rx)
    }

    /// Returns `true` once the operation ended.
    pub fn is_finished(&self) -> bool {
        self.outcome_tx.borrow().is_some()
    }

    /// Waits at most `deadline` for the operation to end.
    ///
    /// A value is returned as [`BoundedWaitOutcome::Completed`], a failure or panic as `Err`.
    /// The caller decides whether and how to log [`BoundedWaitOutcome::TimedOut`].
    pub async fn wait_for(&self, deadline: Duration) -> PaymentsResult<BoundedWaitOutcome<T>> {
        self.wait_on(self.outcome_tx.subscribe(), deadline).await
    }

    async fn wait_on(
        &self,
        mut outcome_rx: watch::Receiver<Option<PaymentsResult<T>>>,
        deadline: Duration,
    ) -> PaymentsResult<BoundedWaitOutcome<T>> {
        let outcome = match tokio::time::timeout(deadline, outcome_rx.wait_for(Option::is_some))
            .await
        {
            Ok(Ok(outcome)) => outcome.clone(),
            Ok(Err(_)) => {
                return Err(payments_error!(
                    ErrorKind::InvalidState,
                    "Bounded operation outcome channel closed",
                    self.label
                ));
            }
            Err(_) => None,
        };

        match outcome {
            Some(result) => result.map(BoundedWaitOutcome::Completed),
            None => Ok(BoundedWaitOutcome::TimedOut),
        }
    }
}

impl<T> Clone for InFlight<T> {
    fn clone(&self) -> Self {
        Self {
            label: self.label,
            outcome_tx: self.outcome_tx.clone(),
        }
    }
}

fn log_abandoned<T>(label: &'static str, outcome: &PaymentsResult<T>) {
    match outcome {
        Ok(_) => {
            debug!(operation = label, "abandoned operation completed after its deadline");
        }
        Err(err) if err.kind() == ErrorKind::TaskPanicked => {
            error!(operation = label, error = %err, "abandoned operation panicked after its deadline");
        }
        Err(err) => {
            error!(operation = label, error = %err, "abandoned operation failed after its deadline");
        }
    }
}

/// Races `operation` against `deadline` without cancelling it.
///
/// Shorthand for [`InFlight::spawn`] followed by a single [`InFlight::wait_for`].
pub async fn bounded_wait<F, T>(
    label: &'static str,
    deadline: Duration,
    operation: F,
) -> PaymentsResult<BoundedWaitOutcome<T>>
where
    F: Future<Output = PaymentsResult<T>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    let (in_flight, outcome_rx) = InFlight::spawn_watched(label, operation);
    in_flight.wait_on(outcome_rx, deadline).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use futures::future::join_all;
    use tokio::sync::oneshot;

    use super::*;
    use crate::test_utils::logs::LogCapture;

    #[tokio::test]
    async fn operation_finishing_first_returns_its_value() {
        let outcome = bounded_wait("fast", Duration::from_secs(1), async { Ok(42) })
            .await
            .unwrap();

        assert_eq!(outcome, BoundedWaitOutcome::Completed(42));
    }

    #[tokio::test]
    async fn operation_failure_before_deadline_propagates() {
        let result: PaymentsResult<BoundedWaitOutcome<()>> =
            bounded_wait("failing", Duration::from_secs(1), async {
                Err(payments_error!(ErrorKind::QueueReadFailed, "Queue read failed"))
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::QueueReadFailed);
    }

    #[tokio::test]
    async fn operation_panic_before_deadline_is_reported() {
        let result: PaymentsResult<BoundedWaitOutcome<()>> =
            bounded_wait("panicking", Duration::from_secs(1), async {
                if true {
                    panic!("boom");
                }
                Ok(())
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::TaskPanicked);
    }

    #[tokio::test]
    async fn slow_operation_times_out_but_keeps_running() {
        let finished = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = oneshot::channel();

        let operation_finished = finished.clone();
        let outcome = bounded_wait("slow", Duration::from_millis(20), async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            operation_finished.store(true, Ordering::SeqCst);
            let _ = done_tx.send(());
            Ok(())
        })
        .await
        .unwrap();

        assert!(outcome.is_timed_out());
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::timeout(Duration::from_secs(2), done_rx)
            .await
            .unwrap()
            .unwrap();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn late_failure_of_abandoned_operation_is_logged() {
        let capture = LogCapture::new();
        let _guard = capture.set_default();

        let outcome: BoundedWaitOutcome<()> =
            bounded_wait("late-failure", Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err(payments_error!(ErrorKind::FlushFailed, "Flush failed"))
            })
            .await
            .unwrap();
        assert!(outcome.is_timed_out());

        capture
            .wait_for("abandoned operation failed after its deadline", Duration::from_secs(2))
            .await;
        let failure = capture
            .events()
            .into_iter()
            .find(|event| event.message.contains("abandoned operation failed"))
            .unwrap();
        assert_eq!(failure.level, tracing::Level::ERROR);
        assert!(
            failure
                .fields
                .iter()
                .any(|(name, value)| name == "operation" && value.contains("late-failure"))
        );
    }

    #[tokio::test]
    async fn waiters_share_a_single_run_of_the_operation() {
        let runs = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let operation_runs = runs.clone();
        let in_flight = InFlight::spawn("shared", async move {
            operation_runs.fetch_add(1, Ordering::SeqCst);
            let _ = release_rx.await;
            Ok(7)
        });

        let early = in_flight.wait_for(Duration::from_millis(10)).await.unwrap();
        assert!(early.is_timed_out());
        assert!(!in_flight.is_finished());

        let waiters = (0..8).map(|_| {
            let in_flight = in_flight.clone();
            async move { in_flight.wait_for(Duration::from_secs(2)).await }
        });
        let _ = release_tx.send(());
        for outcome in join_all(waiters).await {
            assert_eq!(outcome.unwrap(), BoundedWaitOutcome::Completed(7));
        }

        assert!(in_flight.is_finished());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
