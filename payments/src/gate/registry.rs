use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::PaymentsResult;
use crate::gate::controller::GateController;
use crate::gate::id::{GateId, InstanceId};
use crate::gate::observer::GateObserver;
use crate::transport::BroadcastTransport;

struct Inner<T> {
    controllers: HashMap<GateId, GateController<T>>,
    observers: HashMap<GateId, GateObserver>,
}

/// Shared entry point to the gates of one instance.
///
/// The registry owns the transport and the local [`InstanceId`], and hands out one controller
/// per gate so that every component incrementing a gate on this instance shares its count.
/// Single-gate observers are cached as well.
pub struct GateRegistry<T> {
    instance: InstanceId,
    transport: Arc<T>,
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> GateRegistry<T>
where
    T: BroadcastTransport,
{
    pub fn new(instance: InstanceId, transport: Arc<T>) -> Self {
        let inner = Inner {
            controllers: HashMap::new(),
            observers: HashMap::new(),
        };

        Self {
            instance,
            transport,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Returns the identity this instance announces itself with.
    pub fn instance(&self) -> &InstanceId {
        &self.instance
    }

    /// Returns the controller of `gate`, creating it on first use.
    pub async fn controller(&self, gate: &GateId) -> GateController<T> {
        let mut inner = self.inner.lock().await;
        inner
            .controllers
            .entry(gate.clone())
            .or_insert_with(|| {
                GateController::new(gate.clone(), self.instance.clone(), self.transport.clone())
            })
            .clone()
    }

    /// Returns the observer of `gate`, subscribing on first use.
    pub async fn observer(&self, gate: &GateId) -> PaymentsResult<GateObserver> {
        let mut inner = self.inner.lock().await;
        if let Some(observer) = inner.observers.get(gate) {
            return Ok(observer.clone());
        }

        let observer =
            GateObserver::subscribe(self.transport.as_ref(), std::slice::from_ref(gate)).await?;
        inner.observers.insert(gate.clone(), observer.clone());

        Ok(observer)
    }

    /// Creates an observer that is blocked while any of `gates` is blocked.
    pub async fn observer_for(&self, gates: &[GateId]) -> PaymentsResult<GateObserver> {
        GateObserver::subscribe(self.transport.as_ref(), gates).await
    }
}

impl<T> Clone for GateRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            instance: self.instance.clone(),
            transport: self.transport.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for GateRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateRegistry")
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::gate::GateState;
    use crate::test_utils::transport::RecordingTransport;
    use crate::transport::MemoryTransport;

    fn registry() -> (Arc<RecordingTransport>, GateRegistry<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let registry = GateRegistry::new(InstanceId::new("api-1"), transport.clone());

        (transport, registry)
    }

    #[tokio::test]
    async fn controllers_for_the_same_gate_share_their_count() {
        let (transport, registry) = registry();
        let gate = GateId::SUMMARY_READERS;

        let first = registry.controller(&gate).await;
        let second = registry.clone().controller(&gate).await;

        first.increment().await;
        second.increment().await;
        assert_eq!(first.count(), 2);

        first.decrement().await;
        second.decrement().await;
        assert_eq!(second.count(), 0);

        assert_eq!(
            transport.states(&gate),
            vec![GateState::Blocked, GateState::Unblocked]
        );
    }

    #[tokio::test]
    async fn distinct_gates_get_distinct_controllers() {
        let (_, registry) = registry();

        let readers = registry.controller(&GateId::SUMMARY_READERS).await;
        let storage = registry.controller(&GateId::STORAGE_BUSY).await;
        readers.increment().await;

        assert!(readers.is_blocked());
        assert!(!storage.is_blocked());
    }

    #[tokio::test]
    async fn local_controller_edges_reach_the_cached_observer() {
        let (_, registry) = registry();
        let gate = GateId::STORAGE_BUSY;

        let observer = registry.observer(&gate).await.unwrap();
        let controller = registry.controller(&gate).await;

        let guard = controller.acquire().await;
        tokio::time::timeout(Duration::from_secs(2), observer.wait_until_blocked())
            .await
            .unwrap();

        guard.release().await;
        tokio::time::timeout(Duration::from_secs(2), observer.wait_until_unblocked())
            .await
            .unwrap();
        assert!(!observer.is_blocked());
    }

    async fn source_reaches(observer: &GateObserver, gate: &GateId, blocked: bool) {
        let reached = async {
            while !observer
                .source_states()
                .iter()
                .any(|(key, state)| key.gate == *gate && *state == blocked)
            {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(2), reached)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn multi_gate_observer_stays_blocked_while_any_replica_holds_a_gate() {
        let transport = Arc::new(MemoryTransport::new());
        let replica = |name: &str| GateRegistry::new(InstanceId::new(name), transport.clone());
        let api = replica("api-1");
        let storage_worker = replica("worker-1");
        let http_worker = replica("worker-2");

        let busy = api
            .observer_for(&[GateId::STORAGE_BUSY, GateId::TRANSPORT_BUSY])
            .await
            .unwrap();
        let storage = storage_worker.controller(&GateId::STORAGE_BUSY).await;
        let http = http_worker.controller(&GateId::TRANSPORT_BUSY).await;

        let storage_guard = storage.acquire().await;
        tokio::time::timeout(Duration::from_secs(2), busy.wait_until_blocked())
            .await
            .unwrap();

        let http_guard = http.acquire().await;
        source_reaches(&busy, &GateId::TRANSPORT_BUSY, true).await;

        storage_guard.release().await;
        source_reaches(&busy, &GateId::STORAGE_BUSY, false).await;
        assert!(busy.is_blocked());

        http_guard.release().await;
        tokio::time::timeout(Duration::from_secs(2), busy.wait_until_unblocked())
            .await
            .unwrap();
        assert!(!busy.is_blocked());
    }
}
