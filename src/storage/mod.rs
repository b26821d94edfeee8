//! Durable alert storage.
//!
//! The persistence engine hands each alert to [`AlertStore::save`]. A store
//! opens its own kind of transaction and runs [`write_alert`] on it through
//! the [`StoreTransaction`] statements. Schema (conceptual):
//!
//! - `alert (id, fingerprint, status, startsAt, endsAt, generatorURL)`,
//!   unique on `(fingerprint, startsAt)`
//! - `alertlabel (alertID, label, value)`, written once
//! - `alertannotation (alertID, annotation, value)`, unique on
//!   `(alertID, annotation)`, last write wins

mod change;
pub mod memory;
pub mod postgres;

pub use memory::{MemoryStore, MemoryTransaction};
pub use postgres::{PgStore, PgTransaction};

use crate::alert::{Alert, AlertStatus};
use crate::core::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{Level, event};

/// Primary key of a row in the alert table.
pub type AlertId = i64;

/// The statements a single alert save is made of. Dropping a transaction
/// without committing it discards its writes.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn find_alert(&mut self, fingerprint: &str, starts_at: DateTime<Utc>) -> Result<Option<AlertId>>;

    /// Inserts the alert row only; labels and annotations are separate.
    async fn insert_alert(&mut self, alert: &Alert) -> Result<AlertId>;

    /// Updates status, end timestamp and generator URL.
    async fn update_alert(&mut self, id: AlertId, alert: &Alert) -> Result<()>;

    async fn insert_label(&mut self, id: AlertId, name: &str, value: &str) -> Result<()>;

    async fn upsert_annotation(&mut self, id: AlertId, name: &str, value: &str) -> Result<()>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

#[async_trait]
pub trait AlertStore: Send + Sync + 'static {
    /// Writes one alert in a single transaction. Nothing is kept when the
    /// call fails or its future is dropped.
    async fn save(&self, alert: &Alert) -> Result<()>;

    /// Every stored alert still marked firing, with labels and annotations.
    async fn load_firing(&self) -> Result<Vec<Alert>>;

    /// Releases connections. Further calls fail.
    async fn close(&self);
}

/// The statements of one alert save, committed together.
///
/// A known identity only has its row updated; labels are written with the
/// row and never touched again. Annotations are upserted either way.
pub async fn write_alert<T: StoreTransaction>(mut tx: T, alert: &Alert) -> Result<()> {
    match apply(&mut tx, alert).await {
        Ok(()) => tx.commit().await,
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                event!(
                    Level::WARN,
                    identity = %alert.identity(),
                    error = %rollback_err,
                    "rollback failed"
                );
            }
            Err(err)
        }
    }
}

async fn apply<T: StoreTransaction>(tx: &mut T, alert: &Alert) -> Result<()> {
    let id = match tx.find_alert(&alert.fingerprint, alert.starts_at).await? {
        Some(id) => {
            tx.update_alert(id, alert).await?;
            id
        }
        None => {
            let id = tx.insert_alert(alert).await?;
            for (name, value) in &alert.labels {
                tx.insert_label(id, name, value).await?;
            }
            id
        }
    };

    for (name, value) in &alert.annotations {
        tx.upsert_annotation(id, name, value).await?;
    }
    Ok(())
}

/// One alert row joined with its child rows.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAlert {
    pub id: AlertId,
    pub fingerprint: String,
    pub status: AlertStatus,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub generator_url: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl From<StoredAlert> for Alert {
    fn from(row: StoredAlert) -> Self {
        let mut alert = Alert::new(row.fingerprint, row.status, row.starts_at);
        alert.ends_at = row.ends_at;
        alert.generator_url = row.generator_url;
        alert.labels = row.labels;
        alert.annotations = row.annotations;
        alert
    }
}
