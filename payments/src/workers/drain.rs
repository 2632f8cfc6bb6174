//! Background draining of the payment queue while summary readers are active.
//!
//! A [`DrainWorker`] waits for its [`DrainTrigger`] to become active and then runs one
//! [`BatchDrainLoop`] episode, flushing batches to durable storage until the trigger clears.
//! The default trigger is the observer of the summary readers gate, so queue flushing is scheduled
//! while reads are in flight anywhere in the cluster. Summary reads never depend on it: they read
//! the live queue directly.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{PaymentsError, PaymentsResult};
use crate::gate::GateObserver;
use crate::store::BatchFlusher;

/// Condition under which the queue is drained.
pub trait DrainTrigger: Send + Sync + 'static {
    /// Returns `true` while draining should happen.
    fn is_active(&self) -> bool;

    /// Resolves once the trigger is active.
    fn activated(&self) -> impl Future<Output = ()> + Send;

    /// Runs `on_each` repeatedly, at most every `delay`, until the trigger is no longer active.
    ///
    /// Returns immediately when the trigger is inactive.
    fn drain_while_active<F, Fut>(
        &self,
        delay: Duration,
        on_each: F,
    ) -> impl Future<Output = ()> + Send
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = PaymentsResult<()>> + Send;
}

impl DrainTrigger for GateObserver {
    fn is_active(&self) -> bool {
        self.is_blocked()
    }

    async fn activated(&self) {
        self.wait_until_blocked().await;
    }

    async fn drain_while_active<F, Fut>(&self, delay: Duration, on_each: F)
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = PaymentsResult<()>> + Send,
    {
        self.wait_if_blocked_with(delay, on_each).await;
    }
}

/// What one drain episode did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainEpisodeReport {
    /// Number of flush attempts.
    pub iterations: u64,
    /// Number of records persisted across all attempts.
    pub flushed: u64,
    /// Number of failed flush attempts.
    pub failures: u64,
}

#[derive(Debug, Default)]
struct EpisodeCounters {
    iterations: AtomicU64,
    flushed: AtomicU64,
    failures: AtomicU64,
}

impl EpisodeCounters {
    fn report(&self) -> DrainEpisodeReport {
        DrainEpisodeReport {
            iterations: self.iterations.load(Ordering::Relaxed),
            flushed: self.flushed.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Flushes batches while a trigger is active.
#[derive(Debug)]
pub struct BatchDrainLoop<Tr, F> {
    trigger: Tr,
    flusher: Arc<F>,
    iteration_delay: Duration,
}

impl<Tr, F> BatchDrainLoop<Tr, F>
where
    Tr: DrainTrigger,
    F: BatchFlusher,
{
    pub fn new(trigger: Tr, flusher: Arc<F>, iteration_delay: Duration) -> Self {
        Self {
            trigger,
            flusher,
            iteration_delay,
        }
    }

    /// Returns the trigger driving this loop.
    pub fn trigger(&self) -> &Tr {
        &self.trigger
    }

    /// Drains one active episode of the trigger.
    ///
    /// Returns immediately when the trigger is inactive. Otherwise it flushes once per iteration
    /// until the trigger clears. Failed flushes are logged and the episode continues.
    pub async fn run_episode(&self) -> DrainEpisodeReport {
        let counters = Arc::new(EpisodeCounters::default());
        if !self.trigger.is_active() {
            return counters.report();
        }

        self.trigger
            .drain_while_active(self.iteration_delay, || {
                let flusher = self.flusher.clone();
                let counters = counters.clone();

                async move {
                    counters.iterations.fetch_add(1, Ordering::Relaxed);

                    match flusher.flush_batch().await {
                        Ok(0) => {}
                        Ok(flushed) => {
                            counters.flushed.fetch_add(flushed as u64, Ordering::Relaxed);
                            info!(flushed, "flushed payment batch");
                        }
                        Err(err) => {
                            counters.failures.fetch_add(1, Ordering::Relaxed);
                            error!(error = %err, "payment batch flush failed, retrying on next iteration");
                        }
                    }

                    Ok(())
                }
            })
            .await;

        counters.report()
    }
}

/// Handle to a running [`DrainWorker`].
#[derive(Debug)]
pub struct DrainWorkerHandle {
    join_handle: JoinHandle<PaymentsResult<()>>,
}

impl DrainWorkerHandle {
    /// Waits for the worker to stop.
    ///
    /// A panic of the worker is returned as [`crate::error::ErrorKind::TaskPanicked`].
    pub async fn wait(self) -> PaymentsResult<()> {
        match self.join_handle.await {
            Ok(result) => result,
            Err(err) => {
                error!(error = %err, "drain worker task panicked");
                Err(PaymentsError::from(err))
            }
        }
    }
}

/// Perpetual worker running one [`BatchDrainLoop`] episode every time its trigger activates.
pub struct DrainWorker<Tr, F> {
    drain_loop: BatchDrainLoop<Tr, F>,
    shutdown_rx: ShutdownRx,
}

impl<Tr, F> DrainWorker<Tr, F>
where
    Tr: DrainTrigger,
    F: BatchFlusher,
{
    pub fn new(drain_loop: BatchDrainLoop<Tr, F>, shutdown_rx: ShutdownRx) -> Self {
        Self {
            drain_loop,
            shutdown_rx,
        }
    }

    /// Starts the worker in a background task.
    pub fn start(self) -> DrainWorkerHandle {
        let join_handle = tokio::spawn(self.run());
        DrainWorkerHandle { join_handle }
    }

    async fn run(mut self) -> PaymentsResult<()> {
        info!(
            iteration_delay_ms = self.drain_loop.iteration_delay.as_millis() as u64,
            "starting drain worker"
        );

        loop {
            if self.shutdown_rx.is_shutdown() {
                info!("drain worker shutting down");
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = self.shutdown_rx.wait_for_shutdown() => {
                    info!("drain worker shutting down");
                    return Ok(());
                }
                _ = self.drain_loop.trigger().activated() => {}
            }

            info!("gate blocked, draining payment queue");

            let report = tokio::select! {
                biased;
                _ = self.shutdown_rx.wait_for_shutdown() => {
                    info!("drain worker shutting down during a drain episode");
                    return Ok(());
                }
                report = self.drain_loop.run_episode() => report,
            };

            info!(
                iterations = report.iterations,
                flushed = report.flushed,
                failures = report.failures,
                "drain episode finished"
            );
        }
    }
}
