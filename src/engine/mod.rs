// ============================================================================
// Persistence Engine
// ============================================================================
//
// Moves unsaved alerts from the buffer into the store. Each pass fans the
// batch out to a fixed number of workers reading one shared queue; every
// alert is written in its own transaction and reported on either the
// success or the failure channel. Failed alerts stay unsaved in the buffer
// and are picked up again by the next pass.
//
// ============================================================================

pub mod options;
mod stats;
pub mod worker;

pub use options::EngineOptions;
pub use stats::EngineStats;
pub use worker::EngineWorker;

use crate::alert::Alert;
use crate::buffer::DedupBuffer;
use crate::core::{AlertError, Result};
use crate::storage::AlertStore;
use futures::future::join_all;
use stats::Counters;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{Level, event};

type Queue = Arc<Mutex<mpsc::Receiver<Alert>>>;

pub struct PersistenceEngine<S: AlertStore> {
    buffer: Arc<DedupBuffer>,
    store: Arc<S>,
    options: EngineOptions,
    counters: Counters,
}

impl<S: AlertStore> PersistenceEngine<S> {
    pub fn new(buffer: Arc<DedupBuffer>, store: Arc<S>, options: EngineOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            buffer,
            store,
            options,
            counters: Counters::default(),
        })
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn buffer(&self) -> &Arc<DedupBuffer> {
        &self.buffer
    }

    pub fn stats(&self) -> EngineStats {
        self.counters.snapshot()
    }

    /// Write a batch of alerts, one transaction each.
    ///
    /// Waits for an outcome for every submitted alert and returns the ones
    /// whose transaction committed, in no particular order. A failing alert
    /// never affects its siblings.
    pub async fn save_batch(&self, alerts: Vec<Alert>) -> Vec<Alert> {
        let total = alerts.len();
        if total == 0 {
            return Vec::new();
        }

        let (queue_tx, queue_rx) = mpsc::channel(total);
        for alert in alerts {
            // Capacity equals the batch size and the receiver is alive.
            let _ = queue_tx.send(alert).await;
        }
        drop(queue_tx);

        let queue: Queue = Arc::new(Mutex::new(queue_rx));
        let (saved_tx, mut saved_rx) = mpsc::channel(total);
        let (failed_tx, mut failed_rx) = mpsc::channel(total);

        let workers: Vec<_> = (0..self.options.parallelism.min(total))
            .map(|_| {
                tokio::spawn(save_worker(
                    Arc::clone(&self.store),
                    Arc::clone(&queue),
                    saved_tx.clone(),
                    failed_tx.clone(),
                    self.options.save_timeout,
                ))
            })
            .collect();
        drop(saved_tx);
        drop(failed_tx);

        let mut saved = Vec::with_capacity(total);
        let mut failed = 0usize;
        while saved.len() + failed < total {
            tokio::select! {
                Some(alert) = saved_rx.recv() => saved.push(alert),
                Some((alert, err)) = failed_rx.recv() => {
                    failed += 1;
                    event!(
                        Level::ERROR,
                        fingerprint = %alert.fingerprint,
                        starts_at = %alert.starts_at,
                        error = %err,
                        "failed to save alert"
                    );
                }
                else => break,
            }
        }

        for result in join_all(workers).await {
            if let Err(err) = result {
                event!(Level::ERROR, error = %err, "save worker terminated abnormally");
            }
        }

        let lost = total - saved.len() - failed;
        self.counters.record_batch(total, saved.len(), failed + lost);
        event!(
            Level::DEBUG,
            submitted = total,
            saved = saved.len(),
            failed = failed + lost,
            "batch processed"
        );
        saved
    }

    /// One pull, save and mark cycle. Returns how many alerts were marked
    /// persisted in the buffer.
    ///
    /// A pass that cannot take the buffer gate in time is skipped. Saved
    /// alerts that cannot be marked stay unsaved and are written again by
    /// the next pass, which only updates their rows.
    pub async fn run_once(&self) -> usize {
        let gate_wait = self.options.gate_wait;
        let unsaved = match self.buffer.unsaved(gate_wait).await {
            Ok(unsaved) => unsaved,
            Err(err) => {
                event!(Level::WARN, error = %err, "skipping persistence pass");
                return 0;
            }
        };
        if unsaved.is_empty() {
            return 0;
        }

        let submitted = unsaved.len();
        let saved = self.save_batch(unsaved).await;
        let marked = match self.buffer.mark_persisted(&saved, gate_wait).await {
            Ok(marked) => marked,
            Err(err) => {
                event!(Level::WARN, error = %err, saved = saved.len(), "cannot mark saved alerts");
                0
            }
        };
        event!(
            Level::INFO,
            submitted,
            saved = saved.len(),
            marked,
            "persistence pass finished"
        );
        marked
    }
}

async fn save_worker<S: AlertStore>(
    store: Arc<S>,
    queue: Queue,
    saved_tx: mpsc::Sender<Alert>,
    failed_tx: mpsc::Sender<(Alert, AlertError)>,
    save_timeout: Duration,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(alert) = next else {
            break;
        };

        match save_alert(store.as_ref(), &alert, save_timeout).await {
            Ok(()) => {
                let _ = saved_tx.send(alert).await;
            }
            Err(err) => {
                let _ = failed_tx.send((alert, err)).await;
            }
        }
    }
}

/// Save one alert under a deadline. A transaction cut off by the deadline
/// is dropped uncommitted.
pub async fn save_alert<S: AlertStore>(store: &S, alert: &Alert, save_timeout: Duration) -> Result<()> {
    tokio::time::timeout(save_timeout, store.save(alert))
        .await
        .map_err(|_| {
            AlertError::Timeout(format!(
                "saving {} exceeded {:?}",
                alert.identity(),
                save_timeout
            ))
        })?
}
