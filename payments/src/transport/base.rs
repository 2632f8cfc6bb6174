use std::future::Future;

use tokio::sync::broadcast;

use crate::error::PaymentsResult;
use crate::gate::{GateId, GateSignal};

/// Named-channel publish/subscribe transport for gate signals.
///
/// Implementations deliver every published [`GateSignal`] to all current subscribers of the
/// gate's channel, including subscribers living in other processes. Delivery is assumed to be
/// reliable but only causally ordered per publisher; exactly-once delivery is not required since
/// observers fold signals into per-instance state.
pub trait BroadcastTransport: Send + Sync + 'static {
    /// Publishes `signal` on the channel of `gate`.
    ///
    /// Publishing on a channel nobody subscribed to is not an error.
    fn publish(
        &self,
        gate: &GateId,
        signal: GateSignal,
    ) -> impl Future<Output = PaymentsResult<()>> + Send;

    /// Subscribes to the channel of `gate`.
    ///
    /// The receiver yields every signal published after the subscription was established.
    fn subscribe(
        &self,
        gate: &GateId,
    ) -> impl Future<Output = PaymentsResult<broadcast::Receiver<GateSignal>>> + Send;
}
