use super::DedupBuffer;
use crate::core::{AlertError, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{Level, event};

/// Background reconciliation and eviction loops of one buffer.
pub struct BufferWorker {
    buffer: Arc<DedupBuffer>,
    stop_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl DedupBuffer {
    /// Spawns the reconciliation and eviction loops.
    pub fn start(self: &Arc<Self>) -> BufferWorker {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handles = vec![
            spawn_sync_loop(Arc::clone(self), stop_rx.clone()),
            spawn_gc_loop(Arc::clone(self), stop_rx),
        ];
        event!(Level::INFO, "buffer loops started");

        BufferWorker {
            buffer: Arc::clone(self),
            stop_tx,
            handles,
        }
    }
}

impl BufferWorker {
    /// Stops both loops, waits for them, then runs one last reconciliation
    /// so transitions that happened just before shutdown are captured.
    ///
    /// The final pass runs even when a loop died; that failure is reported
    /// afterwards.
    pub async fn stop(mut self) -> Result<()> {
        let _ = self.stop_tx.send(true);
        let mut failed = Vec::new();
        for handle in self.handles.drain(..) {
            if let Err(err) = handle.await {
                event!(Level::ERROR, error = %err, "buffer loop terminated abnormally");
                failed.push(err.to_string());
            }
        }

        let buffer = Arc::clone(&self.buffer);
        match tokio::spawn(async move { buffer.reconcile().await }).await {
            Ok(Ok(resolved)) => event!(Level::INFO, resolved, "final buffer reconciliation done"),
            Ok(Err(err)) => event!(Level::WARN, error = %err, "final buffer reconciliation failed"),
            Err(err) => {
                event!(Level::ERROR, error = %err, "final buffer reconciliation aborted");
                failed.push(err.to_string());
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(AlertError::Task(failed.join("; ")))
        }
    }
}

impl Drop for BufferWorker {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

fn spawn_sync_loop(buffer: Arc<DedupBuffer>, mut stop_rx: watch::Receiver<bool>) -> JoinHandle<()> {
    let period = buffer.options().sync_interval;
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = ticker.tick() => {
                    if let Err(err) = buffer.reconcile().await {
                        event!(Level::ERROR, error = %err, "failed to reconcile buffer with controller");
                    }
                }
            }
        }
    })
}

fn spawn_gc_loop(buffer: Arc<DedupBuffer>, mut stop_rx: watch::Receiver<bool>) -> JoinHandle<()> {
    let period = buffer.options().gc_interval;
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = ticker.tick() => {
                    if let Err(err) = buffer.evict_expired().await {
                        event!(Level::WARN, error = %err, "skipping buffer eviction");
                    }
                }
            }
        }
    })
}
