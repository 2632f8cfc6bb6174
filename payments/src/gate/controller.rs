use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::gate::id::{GateId, InstanceId};
use crate::gate::signal::{GateSignal, GateState};
use crate::transport::BroadcastTransport;

struct ControllerInner<T> {
    gate: GateId,
    instance: InstanceId,
    transport: Arc<T>,
    count: AtomicU64,
    /// Serializes publishing and remembers the last state announced to other replicas.
    last_published: Mutex<GateState>,
}

impl<T> ControllerInner<T>
where
    T: BroadcastTransport,
{
    /// Removes one holder, clamping at zero.
    ///
    /// Returns `true` when this call moved the count from one to zero.
    fn release_one(&self) -> bool {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current == 0 {
                error!(
                    gate = %self.gate,
                    instance = %self.instance,
                    "gate count underflow: decrement without a matching increment, clamping at zero"
                );
                return false;
            }

            match self.count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return current == 1,
                Err(actual) => current = actual,
            }
        }
    }

    /// Announces the current state if it differs from the last announced one.
    ///
    /// Only callers that caused an edge get here. The state is re-read under the lock, so when
    /// edges race the final announcement always matches the final count.
    async fn publish_current_state(&self) {
        let mut last_published = self.last_published.lock().await;
        let state = GateState::from_count(self.count.load(Ordering::Acquire));
        if *last_published == state {
            debug!(gate = %self.gate, ?state, "gate edge superseded before it was announced");
            return;
        }

        let signal = GateSignal::new(self.instance.clone(), state);
        match self.transport.publish(&self.gate, signal).await {
            Ok(()) => {
                *last_published = state;
                debug!(gate = %self.gate, ?state, "announced gate edge");
            }
            Err(err) => {
                error!(gate = %self.gate, ?state, error = %err, "failed to announce gate edge");
            }
        }
    }
}

/// Reference-counted controller of one gate on this instance.
///
/// The first holder moves the gate to [`GateState::Blocked`] and the last one to release it moves
/// it back to [`GateState::Unblocked`]. Only those edges are broadcast, never individual calls.
/// Clones share the same count.
pub struct GateController<T> {
    inner: Arc<ControllerInner<T>>,
}

impl<T> GateController<T>
where
    T: BroadcastTransport,
{
    /// Creates a controller for `gate` publishing as `instance` through `transport`.
    pub fn new(gate: GateId, instance: InstanceId, transport: Arc<T>) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                gate,
                instance,
                transport,
                count: AtomicU64::new(0),
                last_published: Mutex::new(GateState::Unblocked),
            }),
        }
    }

    /// Returns the gate this controller drives.
    pub fn gate(&self) -> &GateId {
        &self.inner.gate
    }

    /// Returns the current number of holders.
    pub fn count(&self) -> u64 {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Returns `true` while at least one holder is active.
    pub fn is_blocked(&self) -> bool {
        self.count() > 0
    }

    /// Adds a holder, announcing [`GateState::Blocked`] on the zero to one edge.
    ///
    /// Transport failures are logged and never returned: the local count stays authoritative.
    pub async fn increment(&self) {
        let previous = self.inner.count.fetch_add(1, Ordering::AcqRel);
        if previous == 0 {
            self.inner.publish_current_state().await;
        }
    }

    /// Removes a holder, announcing [`GateState::Unblocked`] on the one to zero edge.
    ///
    /// A decrement without a matching increment is clamped at zero and logged.
    pub async fn decrement(&self) {
        if self.inner.release_one() {
            self.inner.publish_current_state().await;
        }
    }

    /// Adds a holder and returns a guard that removes it exactly once.
    pub async fn acquire(&self) -> GateGuard<T> {
        self.increment().await;

        GateGuard {
            controller: Some(self.clone()),
        }
    }

    /// Removes a holder from a synchronous context, announcing the edge on the current runtime.
    fn decrement_detached(&self) {
        if !self.inner.release_one() {
            return;
        }

        match Handle::try_current() {
            Ok(handle) => {
                let inner = self.inner.clone();
                handle.spawn(async move { inner.publish_current_state().await });
            }
            Err(_) => {
                error!(
                    gate = %self.inner.gate,
                    "gate released outside of a runtime, unblocked edge was not announced"
                );
            }
        }
    }
}

impl<T> Clone for GateController<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for GateController<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateController")
            .field("gate", &self.inner.gate)
            .field("instance", &self.inner.instance)
            .field("count", &self.inner.count.load(Ordering::Relaxed))
            .finish()
    }
}

/// Holder of a gate that releases it exactly once.
///
/// [`GateGuard::release`] awaits the announcement of a resulting edge. A guard dropped without
/// being released, for example when its future is cancelled or panics, still releases the gate and
/// announces the edge in the background.
#[must_use = "dropping the guard releases the gate immediately"]
pub struct GateGuard<T>
where
    T: BroadcastTransport,
{
    controller: Option<GateController<T>>,
}

impl<T> GateGuard<T>
where
    T: BroadcastTransport,
{
    /// Releases the gate and waits for a resulting edge to be announced.
    pub async fn release(mut self) {
        if let Some(controller) = self.controller.take() {
            controller.decrement().await;
        }
    }
}

impl<T> Drop for GateGuard<T>
where
    T: BroadcastTransport,
{
    fn drop(&mut self) {
        if let Some(controller) = self.controller.take() {
            controller.decrement_detached();
        }
    }
}

impl<T> fmt::Debug for GateGuard<T>
where
    T: BroadcastTransport,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateGuard")
            .field("released", &self.controller.is_none())
            .finish()
    }
}
