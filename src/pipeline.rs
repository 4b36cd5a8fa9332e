//! Pipeline assembly and lifecycle.
//!
//! Wires the three stages into a [`HookChain`] in the order the dispatch
//! contract requires: duplicate suppression first, then origin enrichment,
//! so duplicates never reach enrichment and suppression always examines
//! un-enriched payloads. The connection notifier only subscribes to
//! connect/disconnect events, so its position does not affect publishes.
//!
//! Background work (the cache sweeper, the announcement worker) is not
//! started by construction; the host calls [`Pipeline::start`] once it is
//! inside a runtime and [`Pipeline::shutdown`] to drain on the way out.

use crate::core::config::Config;
use crate::core::time::Clock;
use crate::hooks::{
    ConnectNotifier, DedupeHook, DedupeStats, HookChain, NotifyWorker, OriginEnrichHook,
    PublishSink, ReconfigureError,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// The assembled hook pipeline and its background tasks.
pub struct Pipeline<C: Clock> {
    chain: HookChain,
    dedupe: Arc<DedupeHook<C>>,
    sink: Arc<dyn PublishSink>,
    worker: Option<NotifyWorker>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl<C: Clock> Pipeline<C> {
    /// Validate the configuration and build the hook graph.
    ///
    /// Nothing is spawned here; call [`Pipeline::start`] from inside a
    /// tokio runtime.
    pub fn new(config: Config, clock: C, sink: Arc<dyn PublishSink>) -> Result<Self> {
        config.validate().context("invalid pipeline configuration")?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let dedupe = Arc::new(DedupeHook::new(config.dedupe, clock));
        let (notifier, worker) = ConnectNotifier::new(config.notify);

        let mut chain = HookChain::new();
        chain.register(dedupe.clone());
        chain.register(Arc::new(OriginEnrichHook::new(config.enrich)));
        chain.register(Arc::new(notifier));

        Ok(Self {
            chain,
            dedupe,
            sink,
            worker: Some(worker),
            shutdown_tx,
            shutdown_rx,
            tasks: Vec::new(),
        })
    }

    /// Spawn the cache sweeper and the announcement worker.
    pub fn start(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.tasks.push(tokio::spawn(worker.run(self.sink.clone())));
        }
        self.tasks
            .push(self.dedupe.clone().spawn_sweeper(self.shutdown_rx.clone()));
        tracing::info!("pipeline started");
    }

    /// The chain the host broker dispatches events through.
    pub fn chain(&self) -> &HookChain {
        &self.chain
    }

    /// Runtime reconfiguration of the duplicate-suppression parameters.
    ///
    /// Safe to call while traffic is flowing; the cache is kept.
    pub fn reconfigure_dedupe(
        &self,
        target_topic: &str,
        origin_field: &str,
        timestamp_field: &str,
        window_seconds: i64,
    ) -> Result<(), ReconfigureError> {
        self.dedupe
            .reconfigure(target_topic, origin_field, timestamp_field, window_seconds)
    }

    /// Observability snapshot of the duplicate-suppression stage.
    pub fn dedupe_stats(&self) -> DedupeStats {
        self.dedupe.stats()
    }

    /// Stop background tasks and wait for them to drain.
    ///
    /// Dropping the chain releases the notifier's queue sender, so the
    /// worker delivers whatever is already queued and exits.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        drop(self.chain);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        tracing::info!("pipeline stopped");
    }
}
