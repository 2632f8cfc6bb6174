use tokio::sync::watch;

/// Transmitter side of the shutdown coordination channel.
///
/// A single [`ShutdownTx`] can stop any number of workers holding a [`ShutdownRx`].
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Requests every subscribed worker to stop.
    ///
    /// Infallible so that shutdown can be requested before any worker subscribed.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    /// Creates a new shutdown receiver subscription.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiver side of the shutdown coordination channel.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Returns `true` once shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once shutdown was requested or the transmitter was dropped.
    pub async fn wait_for_shutdown(&mut self) {
        // A dropped transmitter can never request shutdown again, so it counts as one.
        let _ = self.0.wait_for(|requested| *requested).await;
    }
}

/// Creates a new shutdown coordination channel.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}
