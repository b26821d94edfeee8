// ============================================================================
// Deduplication Buffer
// ============================================================================
//
// In-memory map of live alert state, keyed by identity. Every operation runs
// under one gate (a capacity-one async mutex), acquired with a bounded wait:
// callers pass theirs, the sweeps use `BufferOptions::gate_wait`. A long
// sweep turns into a retryable error instead of a hung request.
//
// ============================================================================

pub mod options;
pub mod worker;

pub use options::BufferOptions;
pub use worker::BufferWorker;

use crate::alert::{Alert, Identity};
use crate::controller::FiringSource;
use crate::core::{AlertError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{Level, event};

type Entries = HashMap<Identity, Alert>;

/// Live alert state keyed by identity.
///
/// # Examples
///
/// ```
/// # use alert2pg::{Alert, BufferOptions, DedupBuffer, FiringSource, Identity, Result};
/// # use std::collections::HashSet;
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// # struct Quiet;
/// # #[async_trait::async_trait]
/// # impl FiringSource for Quiet {
/// #     async fn fetch_firing_identities(&self) -> Result<HashSet<Identity>> {
/// #         Ok(HashSet::new())
/// #     }
/// # }
/// # tokio_test::block_on(async {
/// let buffer = DedupBuffer::new(Arc::new(Quiet), BufferOptions::default())?;
/// let alert = Alert::firing("077bf4e884599215", chrono::Utc::now());
///
/// buffer.update(vec![alert.clone()], Duration::from_secs(5)).await?;
/// buffer.update(vec![alert], Duration::from_secs(5)).await?;
/// assert_eq!(buffer.len().await, 1);
/// # Ok::<(), alert2pg::AlertError>(())
/// # }).unwrap();
/// ```
pub struct DedupBuffer {
    entries: Mutex<Entries>,
    source: Arc<dyn FiringSource>,
    options: BufferOptions,
}

impl DedupBuffer {
    pub fn new(source: Arc<dyn FiringSource>, options: BufferOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            entries: Mutex::new(HashMap::new()),
            source,
            options,
        })
    }

    pub fn options(&self) -> &BufferOptions {
        &self.options
    }

    async fn acquire_within(&self, wait: Duration) -> Result<MutexGuard<'_, Entries>> {
        tokio::time::timeout(wait, self.entries.lock())
            .await
            .map_err(|_| AlertError::GateTimeout(wait))
    }

    /// Merge a batch of incoming alerts.
    ///
    /// Unseen identities are inserted unsaved. A delivery whose content
    /// matches the stored alert only advances `persisted_at` and, while the
    /// alert is firing, refreshes its end timestamp; anything else
    /// replaces the stored alert and leaves it unsaved. When the gate cannot
    /// be taken within `wait` the whole batch is rejected.
    pub async fn update(&self, alerts: Vec<Alert>, wait: Duration) -> Result<()> {
        let mut entries = self.acquire_within(wait).await.map_err(|err| {
            event!(Level::ERROR, error = %err, "failed to acquire buffer gate");
            err
        })?;

        let (mut inserted, mut changed, mut duplicates) = (0usize, 0usize, 0usize);
        for mut incoming in alerts {
            let identity = incoming.identity();
            match entries.get_mut(&identity) {
                Some(stored) if stored.same_content(&incoming) => {
                    if incoming.persisted_at > stored.persisted_at {
                        stored.persisted_at = incoming.persisted_at;
                    }
                    if stored.is_firing() {
                        stored.ends_at = incoming.ends_at;
                    }
                    duplicates += 1;
                }
                Some(stored) => {
                    incoming.persisted = false;
                    *stored = incoming;
                    changed += 1;
                }
                None => {
                    incoming.persisted = false;
                    entries.insert(identity, incoming);
                    inserted += 1;
                }
            }
        }

        event!(Level::DEBUG, inserted, changed, duplicates, "buffer updated");
        Ok(())
    }

    /// Copies of every buffered alert, ordered by identity.
    pub async fn snapshot(&self, wait: Duration) -> Result<Vec<Alert>> {
        let entries = self.acquire_within(wait).await?;
        Ok(sorted(entries.values().cloned().collect()))
    }

    /// Copies of the alerts still waiting for a confirmed write.
    pub async fn unsaved(&self, wait: Duration) -> Result<Vec<Alert>> {
        let entries = self.acquire_within(wait).await?;
        Ok(sorted(entries.values().filter(|a| !a.persisted).cloned().collect()))
    }

    /// Record confirmed writes.
    ///
    /// An alert is only marked when the buffered copy still has the content
    /// that was written; a newer update that arrived in the meantime keeps
    /// its pending write. Returns how many alerts were marked.
    pub async fn mark_persisted(&self, alerts: &[Alert], wait: Duration) -> Result<usize> {
        let mut entries = self.acquire_within(wait).await?;
        let now = Utc::now();

        let mut marked = 0;
        for written in alerts {
            match entries.get_mut(&written.identity()) {
                Some(stored) if stored.same_content(written) => {
                    stored.mark_persisted(now);
                    marked += 1;
                }
                Some(_) => {
                    event!(
                        Level::DEBUG,
                        identity = %written.identity(),
                        "alert superseded while saving, keeping it unsaved"
                    );
                }
                None => {}
            }
        }
        Ok(marked)
    }

    /// One reconciliation pass against the controller.
    ///
    /// Every buffered firing alert the controller no longer reports is
    /// resolved locally. Returns how many alerts were resolved.
    pub async fn reconcile(&self) -> Result<usize> {
        let firing = self.source.fetch_firing_identities().await?;

        let mut entries = self.acquire_within(self.options.gate_wait).await?;
        let now = Utc::now();

        let mut resolved = 0;
        for (identity, alert) in entries.iter_mut() {
            if alert.is_firing() && !firing.contains(identity) {
                alert.resolve(now);
                resolved += 1;
                event!(Level::INFO, identity = %identity, "alert no longer firing at controller, resolved");
            }
        }
        Ok(resolved)
    }

    /// Drop resolved alerts whose last confirmed write is older than the
    /// configured lifetime. Returns how many were removed.
    pub async fn evict_expired(&self) -> Result<usize> {
        self.evict_expired_at(Utc::now()).await
    }

    /// [`evict_expired`](Self::evict_expired) against an explicit clock.
    pub async fn evict_expired_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.acquire_within(self.options.gate_wait).await?;
        let before = entries.len();
        let max_lifetime = self.options.max_lifetime;

        entries.retain(|_, alert| !alert.is_expired(max_lifetime, now));

        let evicted = before - entries.len();
        if evicted > 0 {
            event!(Level::DEBUG, evicted, remaining = entries.len(), "evicted expired alerts");
        }
        Ok(evicted)
    }

    /// Seed the buffer with alerts that already have a durable counterpart.
    ///
    /// They are stored as persisted. Identities already present are left
    /// alone. Returns how many alerts were added.
    pub async fn preload(&self, alerts: Vec<Alert>) -> Result<usize> {
        let mut entries = self.acquire_within(self.options.gate_wait).await?;
        let now = Utc::now();

        let mut loaded = 0;
        for mut alert in alerts {
            let identity = alert.identity();
            if entries.contains_key(&identity) {
                continue;
            }
            alert.mark_persisted(now);
            entries.insert(identity, alert);
            loaded += 1;
        }
        Ok(loaded)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    #[cfg(test)]
    pub(crate) async fn hold_gate(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().await
    }
}

fn sorted(mut alerts: Vec<Alert>) -> Vec<Alert> {
    alerts.sort_by_key(Alert::identity);
    alerts
}
