use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{broadcast, watch};
use tokio::task::AbortHandle;
use tracing::{debug, error, warn};

use crate::error::PaymentsResult;
use crate::gate::id::{GateId, InstanceId};
use crate::gate::signal::GateSignal;
use crate::transport::BroadcastTransport;

/// Identity of one signal source: an instance announcing on one gate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceKey {
    pub gate: GateId,
    pub instance: InstanceId,
}

/// Last known state of every source plus the aggregate derived from it.
#[derive(Debug)]
struct SourceStates {
    sources: RwLock<HashMap<SourceKey, bool>>,
    blocked_tx: watch::Sender<bool>,
}

impl SourceStates {
    fn apply(&self, gate: &GateId, signal: GateSignal) {
        let Ok(mut sources) = self.sources.write() else {
            error!(%gate, "gate source map is poisoned, dropping signal");
            return;
        };

        sources.insert(
            SourceKey {
                gate: gate.clone(),
                instance: signal.instance,
            },
            signal.state.is_blocked(),
        );

        // Published under the lock so concurrent updates cannot reorder the aggregate.
        let blocked = sources.values().any(|blocked| *blocked);
        self.blocked_tx.send_replace(blocked);
    }
}

struct ObserverInner {
    gates: Vec<GateId>,
    states: Arc<SourceStates>,
    followers: Vec<AbortHandle>,
}

impl Drop for ObserverInner {
    fn drop(&mut self) {
        for follower in &self.followers {
            follower.abort();
        }
    }
}

/// Aggregated view over one or more gates.
///
/// The observer is blocked while any instance announcing on any observed gate is blocked, and
/// clears only once every known source has announced that it is unblocked. Sources that never
/// announced anything count as unblocked. Clones share the same view; the subscriptions end when
/// the last clone is dropped.
#[derive(Clone)]
pub struct GateObserver {
    inner: Arc<ObserverInner>,
}

impl GateObserver {
    /// Subscribes to every gate in `gates` and starts folding their signals.
    ///
    /// All subscriptions are established before this returns, so signals published afterwards
    /// are never missed.
    pub async fn subscribe<T>(transport: &T, gates: &[GateId]) -> PaymentsResult<Self>
    where
        T: BroadcastTransport,
    {
        let mut receivers = Vec::with_capacity(gates.len());
        for gate in gates {
            receivers.push((gate.clone(), transport.subscribe(gate).await?));
        }

        let (blocked_tx, _) = watch::channel(false);
        let states = Arc::new(SourceStates {
            sources: RwLock::new(HashMap::new()),
            blocked_tx,
        });

        let followers = receivers
            .into_iter()
            .map(|(gate, receiver)| {
                tokio::spawn(follow_gate(gate, receiver, states.clone())).abort_handle()
            })
            .collect();

        Ok(Self {
            inner: Arc::new(ObserverInner {
                gates: gates.to_vec(),
                states,
                followers,
            }),
        })
    }

    /// Returns `true` while any known source is blocked.
    pub fn is_blocked(&self) -> bool {
        *self.inner.states.blocked_tx.borrow()
    }

    /// Returns the last known state of every source, `true` meaning blocked.
    pub fn source_states(&self) -> Vec<(SourceKey, bool)> {
        let Ok(sources) = self.inner.states.sources.read() else {
            return Vec::new();
        };

        let mut states: Vec<_> = sources
            .iter()
            .map(|(key, blocked)| (key.clone(), *blocked))
            .collect();
        states.sort();
        states
    }

    /// Waits until the observer is unblocked, re-checking at most every `delay`.
    ///
    /// Returns immediately when the observer is not blocked.
    pub async fn wait_if_blocked(&self, delay: Duration) {
        self.wait_if_blocked_with(delay, || async { Ok(()) }).await;
    }

    /// Waits until the observer is unblocked, running `on_each` once per iteration while blocked.
    ///
    /// Each iteration runs `on_each` and then waits up to `delay`, returning early when the gate
    /// clears. Failures and panics of `on_each` are logged and the wait continues.
    pub async fn wait_if_blocked_with<F, Fut>(&self, delay: Duration, mut on_each: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PaymentsResult<()>>,
    {
        let mut blocked_rx = self.inner.states.blocked_tx.subscribe();

        loop {
            let blocked = *blocked_rx.borrow_and_update();
            if !blocked {
                return;
            }

            match AssertUnwindSafe(on_each()).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(gates = ?self.inner.gates, error = %err, "callback failed while waiting on blocked gate");
                }
                Err(_) => {
                    error!(gates = ?self.inner.gates, "callback panicked while waiting on blocked gate");
                }
            }

            let _ = tokio::time::timeout(delay, blocked_rx.wait_for(|blocked| !*blocked)).await;
        }
    }

    /// Resolves once the observer becomes blocked.
    pub async fn wait_until_blocked(&self) {
        let mut blocked_rx = self.inner.states.blocked_tx.subscribe();
        let _ = blocked_rx.wait_for(|blocked| *blocked).await;
    }

    /// Resolves once the observer is unblocked, woken only by aggregate changes.
    pub async fn wait_until_unblocked(&self) {
        let mut blocked_rx = self.inner.states.blocked_tx.subscribe();
        let _ = blocked_rx.wait_for(|blocked| !*blocked).await;
    }
}

impl fmt::Debug for GateObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateObserver")
            .field("gates", &self.inner.gates)
            .field("blocked", &self.is_blocked())
            .finish()
    }
}

/// Folds every signal of one gate into the shared source states.
async fn follow_gate(
    gate: GateId,
    mut receiver: broadcast::Receiver<GateSignal>,
    states: Arc<SourceStates>,
) {
    loop {
        match receiver.recv().await {
            Ok(signal) => {
                debug!(%gate, instance = %signal.instance, state = ?signal.state, "received gate signal");
                states.apply(&gate, signal);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(%gate, skipped, "gate observer lagged behind, some signals were skipped");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(%gate, "gate channel closed, observer stops following it");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use super::*;
    use crate::error::ErrorKind;
    use crate::gate::GateState;
    use crate::payments_error;
    use crate::transport::MemoryTransport;

    const DELAY: Duration = Duration::from_millis(5);

    async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
        let started = Instant::now();
        while !condition() {
            assert!(
                started.elapsed() < Duration::from_secs(2),
                "condition `{what}` not reached"
            );
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    async fn announce(transport: &MemoryTransport, gate: &GateId, instance: &str, state: GateState) {
        transport
            .publish(gate, GateSignal::new(InstanceId::new(instance), state))
            .await
            .unwrap();
    }

    fn source_is(observer: &GateObserver, gate: &GateId, instance: &str, blocked: bool) -> bool {
        observer.source_states().iter().any(|(key, state)| {
            key.gate == *gate && key.instance.as_str() == instance && *state == blocked
        })
    }

    #[tokio::test]
    async fn never_blocked_observer_returns_immediately() {
        let transport = MemoryTransport::new();
        let observer = GateObserver::subscribe(&transport, &[GateId::STORAGE_BUSY])
            .await
            .unwrap();

        let calls = AtomicUsize::new(0);
        tokio::time::timeout(
            Duration::from_millis(100),
            observer.wait_if_blocked_with(DELAY, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }),
        )
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn two_gates_clear_only_when_both_unblocked() {
        let transport = MemoryTransport::new();
        let storage = GateId::STORAGE_BUSY;
        let http = GateId::TRANSPORT_BUSY;
        let observer = GateObserver::subscribe(&transport, &[storage.clone(), http.clone()])
            .await
            .unwrap();

        announce(&transport, &storage, "worker-1", GateState::Blocked).await;
        eventually("storage blocked", || observer.is_blocked()).await;

        announce(&transport, &http, "worker-2", GateState::Blocked).await;
        eventually("http recorded", || source_is(&observer, &http, "worker-2", true)).await;

        announce(&transport, &storage, "worker-1", GateState::Unblocked).await;
        eventually("storage cleared", || {
            source_is(&observer, &storage, "worker-1", false)
        })
        .await;
        assert!(observer.is_blocked());

        announce(&transport, &http, "worker-2", GateState::Unblocked).await;
        eventually("both cleared", || !observer.is_blocked()).await;
    }

    #[tokio::test]
    async fn unblocked_from_one_instance_keeps_other_instance_busy() {
        let transport = MemoryTransport::new();
        let gate = GateId::STORAGE_BUSY;
        let observer = GateObserver::subscribe(&transport, &[gate.clone()])
            .await
            .unwrap();

        announce(&transport, &gate, "a", GateState::Blocked).await;
        announce(&transport, &gate, "b", GateState::Blocked).await;
        // Out of order: an instance nobody heard from before announces that it is idle.
        announce(&transport, &gate, "c", GateState::Unblocked).await;
        announce(&transport, &gate, "a", GateState::Unblocked).await;
        eventually("a cleared", || source_is(&observer, &gate, "a", false)).await;
        eventually("c recorded", || source_is(&observer, &gate, "c", false)).await;
        assert!(observer.is_blocked());

        announce(&transport, &gate, "b", GateState::Unblocked).await;
        eventually("all cleared", || !observer.is_blocked()).await;
    }

    #[tokio::test]
    async fn wait_returns_once_gate_clears() {
        let transport = MemoryTransport::new();
        let gate = GateId::TRANSPORT_BUSY;
        let observer = GateObserver::subscribe(&transport, &[gate.clone()])
            .await
            .unwrap();

        announce(&transport, &gate, "a", GateState::Blocked).await;
        eventually("blocked", || observer.is_blocked()).await;

        let waiter = {
            let observer = observer.clone();
            tokio::spawn(async move { observer.wait_if_blocked(DELAY).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        announce(&transport, &gate, "a", GateState::Unblocked).await;
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn callback_failures_do_not_stop_waiting() {
        let transport = MemoryTransport::new();
        let gate = GateId::SUMMARY_READERS;
        let observer = GateObserver::subscribe(&transport, &[gate.clone()])
            .await
            .unwrap();

        announce(&transport, &gate, "a", GateState::Blocked).await;
        eventually("blocked", || observer.is_blocked()).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let waiter = {
            let observer = observer.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                observer
                    .wait_if_blocked_with(DELAY, move || {
                        let call = calls.fetch_add(1, Ordering::SeqCst);
                        async move {
                            if call == 1 {
                                panic!("callback panic");
                            }
                            Err(payments_error!(ErrorKind::FlushFailed, "Flush failed"))
                        }
                    })
                    .await
            })
        };

        eventually("several callbacks", || calls.load(Ordering::SeqCst) >= 3).await;
        assert!(!waiter.is_finished());

        announce(&transport, &gate, "a", GateState::Unblocked).await;
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn wait_until_unblocked_follows_the_aggregate() {
        let transport = MemoryTransport::new();
        let gate = GateId::STORAGE_BUSY;
        let observer = GateObserver::subscribe(&transport, &[gate.clone()])
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_millis(100), observer.wait_until_unblocked())
            .await
            .unwrap();

        announce(&transport, &gate, "a", GateState::Blocked).await;
        eventually("blocked", || observer.is_blocked()).await;

        let waiter = {
            let observer = observer.clone();
            tokio::spawn(async move { observer.wait_until_unblocked().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        announce(&transport, &gate, "a", GateState::Unblocked).await;
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn wait_until_blocked_resolves_on_first_block() {
        let transport = MemoryTransport::new();
        let gate = GateId::SUMMARY_READERS;
        let observer = GateObserver::subscribe(&transport, &[gate.clone()])
            .await
            .unwrap();

        let waiter = {
            let observer = observer.clone();
            tokio::spawn(async move { observer.wait_until_blocked().await })
        };

        announce(&transport, &gate, "a", GateState::Blocked).await;
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
