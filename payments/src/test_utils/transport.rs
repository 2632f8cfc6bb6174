use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::error::{ErrorKind, PaymentsResult};
use crate::gate::{GateId, GateSignal, GateState};
use crate::transport::{BroadcastTransport, MemoryTransport};
use crate::{bail, payments_error};

/// [`BroadcastTransport`] that delivers through a [`MemoryTransport`] and records every signal
/// it successfully published.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    inner: MemoryTransport,
    published: Mutex<Vec<(GateId, GateSignal)>>,
    fail_publishes: AtomicBool,
}

impl RecordingTransport {
    /// Creates an empty recording transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent publishes fail (`true`) or succeed (`false`).
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Returns every recorded signal in publish order.
    pub fn published(&self) -> Vec<(GateId, GateSignal)> {
        self.published
            .lock()
            .map(|published| published.clone())
            .unwrap_or_default()
    }

    /// Returns the states announced on `gate` in publish order.
    pub fn states(&self, gate: &GateId) -> Vec<GateState> {
        self.published()
            .into_iter()
            .filter(|(published_gate, _)| published_gate == gate)
            .map(|(_, signal)| signal.state)
            .collect()
    }

    /// Waits until the states announced on `gate` equal `expected`.
    ///
    /// # Panics
    ///
    /// Panics if `timeout` elapses first, so tests fail instead of hanging.
    pub async fn wait_for_states(&self, gate: &GateId, expected: &[GateState], timeout: Duration) {
        let started = Instant::now();
        loop {
            let states = self.states(gate);
            if states == expected {
                return;
            }

            if started.elapsed() > timeout {
                panic!("gate {gate} announced {states:?}, expected {expected:?} within {timeout:?}");
            }

            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl BroadcastTransport for RecordingTransport {
    async fn publish(&self, gate: &GateId, signal: GateSignal) -> PaymentsResult<()> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            bail!(
                ErrorKind::TransportPublishFailed,
                "Injected publish failure",
                gate.to_string()
            );
        }

        self.inner.publish(gate, signal.clone()).await?;

        let Ok(mut published) = self.published.lock() else {
            return Err(payments_error!(
                ErrorKind::InvalidState,
                "Recording transport is poisoned"
            ));
        };
        published.push((gate.clone(), signal));

        Ok(())
    }

    async fn subscribe(&self, gate: &GateId) -> PaymentsResult<broadcast::Receiver<GateSignal>> {
        self.inner.subscribe(gate).await
    }
}
