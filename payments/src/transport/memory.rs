use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::trace;

use crate::error::{ErrorKind, PaymentsResult};
use crate::gate::{GateId, GateSignal};
use crate::transport::base::BroadcastTransport;
use crate::{bail, payments_error};

/// Default capacity of each gate channel.
pub const DEFAULT_SIGNAL_BUFFER_SIZE: usize = 1_024;

/// In-process [`BroadcastTransport`] backed by one tokio broadcast channel per gate.
///
/// Every clone shares the same channels, so controllers and observers created from clones of one
/// [`MemoryTransport`] behave like replicas connected to the same pub/sub server.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    channels: Arc<Mutex<HashMap<GateId, broadcast::Sender<GateSignal>>>>,
    capacity: usize,
}

impl MemoryTransport {
    /// Creates a transport with [`DEFAULT_SIGNAL_BUFFER_SIZE`] slots per gate.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SIGNAL_BUFFER_SIZE)
    }

    /// Creates a transport with `capacity` slots per gate.
    ///
    /// A zero capacity is raised to one, the smallest capacity a broadcast channel accepts.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self, gate: &GateId) -> PaymentsResult<broadcast::Sender<GateSignal>> {
        let Ok(mut channels) = self.channels.lock() else {
            bail!(
                ErrorKind::InvalidState,
                "Memory transport channel map is poisoned",
                gate.to_string()
            );
        };

        let sender = channels
            .entry(gate.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0);

        Ok(sender.clone())
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastTransport for MemoryTransport {
    async fn publish(&self, gate: &GateId, signal: GateSignal) -> PaymentsResult<()> {
        let sender = self.sender(gate)?;

        // `send` only fails when nobody is subscribed, which is a normal state for a gate.
        match sender.send(signal) {
            Ok(receivers) => trace!(%gate, receivers, "published gate signal"),
            Err(_) => trace!(%gate, "published gate signal without subscribers"),
        }

        Ok(())
    }

    async fn subscribe(&self, gate: &GateId) -> PaymentsResult<broadcast::Receiver<GateSignal>> {
        self.sender(gate)
            .map(|sender| sender.subscribe())
            .map_err(|err| {
                payments_error!(
                    ErrorKind::TransportSubscribeFailed,
                    "Failed to subscribe to gate channel",
                    gate.to_string(),
                    source: err
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{GateState, InstanceId};

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let transport = MemoryTransport::new();
        let signal = GateSignal::new(InstanceId::new("a"), GateState::Blocked);

        transport
            .publish(&GateId::SUMMARY_READERS, signal)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn clones_share_channels() {
        let transport = MemoryTransport::new();
        let replica = transport.clone();
        let mut rx = replica.subscribe(&GateId::STORAGE_BUSY).await.unwrap();

        let signal = GateSignal::new(InstanceId::new("a"), GateState::Blocked);
        transport
            .publish(&GateId::STORAGE_BUSY, signal.clone())
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), signal);
    }

    #[tokio::test]
    async fn gates_are_isolated() {
        let transport = MemoryTransport::new();
        let mut storage_rx = transport.subscribe(&GateId::STORAGE_BUSY).await.unwrap();

        transport
            .publish(
                &GateId::TRANSPORT_BUSY,
                GateSignal::new(InstanceId::new("a"), GateState::Blocked),
            )
            .await
            .unwrap();

        assert!(storage_rx.try_recv().is_err());
    }
}
