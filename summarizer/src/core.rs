use std::sync::Arc;
use std::time::Duration;

use config::shared::SummarizerConfig;
use payments::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use payments::gate::{GateId, GateRegistry, InstanceId};
use payments::store::MemoryStore;
use payments::summary::SummaryRequestHandler;
use payments::transport::MemoryTransport;
use payments::types::SummaryRange;
use payments::workers::drain::{BatchDrainLoop, DrainWorker, DrainWorkerHandle};
use tracing::{error, info};

/// Running summary service: the request handler plus its optional drain worker.
pub struct Summarizer {
    registry: GateRegistry<MemoryTransport>,
    handler: SummaryRequestHandler<MemoryTransport, MemoryStore>,
    store: Arc<MemoryStore>,
    shutdown_tx: ShutdownTx,
    drain_worker: Option<DrainWorkerHandle>,
}

impl Summarizer {
    /// Wires transport, store, gates and workers from `config` and starts the drain worker.
    pub async fn start(config: &SummarizerConfig) -> anyhow::Result<Self> {
        let instance = config
            .coordination
            .instance_name
            .clone()
            .map(InstanceId::new)
            .unwrap_or_else(InstanceId::random);

        let transport = Arc::new(MemoryTransport::with_capacity(
            config.coordination.signal_buffer_size,
        ));
        let store = Arc::new(MemoryStore::with_batch_size(config.drain.max_batch_size));
        let registry = GateRegistry::new(instance.clone(), transport);

        let handler = SummaryRequestHandler::new(
            &registry,
            store.clone(),
            Duration::from_millis(config.coordination.admission_timeout_ms),
        )
        .await?;

        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let drain_worker = if config.drain.enabled {
            let trigger_gate = GateId::new(config.drain.trigger_gate.clone());
            let trigger = registry.observer(&trigger_gate).await?;
            let drain_loop = BatchDrainLoop::new(
                trigger,
                store.clone(),
                Duration::from_millis(config.drain.iteration_delay_ms),
            );

            info!(%trigger_gate, "starting drain worker");
            Some(DrainWorker::new(drain_loop, shutdown_rx).start())
        } else {
            info!("drain worker disabled");
            None
        };

        info!(%instance, "summarizer started");

        Ok(Self {
            registry,
            handler,
            store,
            shutdown_tx,
            drain_worker,
        })
    }

    /// Returns the gates of this instance.
    pub fn registry(&self) -> &GateRegistry<MemoryTransport> {
        &self.registry
    }

    /// Returns the handler serving summary queries.
    pub fn handler(&self) -> &SummaryRequestHandler<MemoryTransport, MemoryStore> {
        &self.handler
    }

    /// Returns the payment queue the handler reads from.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Returns a transmitter that stops the service.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Waits until shutdown is requested and the drain worker stopped.
    pub async fn wait(self) -> anyhow::Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        shutdown_rx.wait_for_shutdown().await;

        if let Some(drain_worker) = self.drain_worker {
            drain_worker.wait().await?;
        }

        info!("summarizer stopped");

        Ok(())
    }
}

/// Runs the summarizer until Ctrl+C is received.
pub async fn start_summarizer(config: SummarizerConfig) -> anyhow::Result<()> {
    let summarizer = Summarizer::start(&config).await?;

    let queued = summarizer
        .handler()
        .summarize(SummaryRange::unbounded())
        .await?;
    let pending = summarizer.store().pending().await;
    info!(
        instance = %summarizer.registry().instance(),
        pending,
        default_count = queued.default.count,
        fallback_count = queued.fallback.count,
        "summarizer ready"
    );

    // Spawn a task to listen for Ctrl+C and trigger shutdown.
    let shutdown_tx = summarizer.shutdown_tx();
    let shutdown_handle = tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
            return;
        }

        info!("Ctrl+C received, shutting down summarizer");
        shutdown_tx.shutdown();
    });

    let result = summarizer.wait().await;

    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    result
}
