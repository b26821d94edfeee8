use super::PersistenceEngine;
use crate::core::{AlertError, Result};
use crate::storage::AlertStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{Level, event};

/// The periodic save loop of one engine.
pub struct EngineWorker<S: AlertStore> {
    engine: Arc<PersistenceEngine<S>>,
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl<S: AlertStore> PersistenceEngine<S> {
    /// Spawns the save loop.
    pub fn start(self: &Arc<Self>) -> EngineWorker<S> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_save_loop(Arc::clone(self), stop_rx);
        event!(Level::INFO, parallelism = self.options.parallelism, "persistence loop started");

        EngineWorker {
            engine: Arc::clone(self),
            stop_tx,
            handle: Some(handle),
        }
    }
}

impl<S: AlertStore> EngineWorker<S> {
    /// Stops the loop and waits for it, runs one last save pass, then
    /// closes the store.
    ///
    /// The final pass and the close happen even when the loop died; that
    /// failure is reported afterwards.
    pub async fn stop(mut self) -> Result<()> {
        let _ = self.stop_tx.send(true);
        let mut failed = Vec::new();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                event!(Level::ERROR, error = %err, "persistence loop terminated abnormally");
                failed.push(err.to_string());
            }
        }

        let engine = Arc::clone(&self.engine);
        match tokio::spawn(async move { engine.run_once().await }).await {
            Ok(marked) => event!(
                Level::INFO,
                marked,
                stats = %self.engine.stats(),
                "final persistence pass done"
            ),
            Err(err) => {
                event!(Level::ERROR, error = %err, "final persistence pass aborted");
                failed.push(err.to_string());
            }
        }

        self.engine.store().close().await;

        if failed.is_empty() {
            Ok(())
        } else {
            Err(AlertError::Task(failed.join("; ")))
        }
    }
}

impl<S: AlertStore> Drop for EngineWorker<S> {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn spawn_save_loop<S: AlertStore>(
    engine: Arc<PersistenceEngine<S>>,
    mut stop_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let period = engine.options().interval;
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = ticker.tick() => {
                    engine.run_once().await;
                }
            }
        }
    })
}
