use super::change::Change;
use super::{AlertId, AlertStore, StoreTransaction, StoredAlert, write_alert};
use crate::alert::{Alert, AlertStatus};
use crate::core::{AlertError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AlertRow {
    pub(crate) fingerprint: String,
    pub(crate) status: AlertStatus,
    pub(crate) starts_at: DateTime<Utc>,
    pub(crate) ends_at: DateTime<Utc>,
    pub(crate) generator_url: String,
}

impl AlertRow {
    fn from_alert(alert: &Alert) -> Self {
        Self {
            fingerprint: alert.fingerprint.clone(),
            status: alert.status,
            starts_at: alert.starts_at,
            ends_at: alert.ends_at,
            generator_url: alert.generator_url.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub(crate) next_id: AlertId,
    pub(crate) alerts: BTreeMap<AlertId, AlertRow>,
    /// Unique index on (fingerprint, startsAt in milliseconds)
    pub(crate) by_identity: HashMap<(String, i64), AlertId>,
    pub(crate) labels: BTreeMap<(AlertId, String), String>,
    pub(crate) annotations: BTreeMap<(AlertId, String), String>,
}

impl Tables {
    fn children(map: &BTreeMap<(AlertId, String), String>, id: AlertId) -> BTreeMap<String, String> {
        map.range((id, String::new())..)
            .take_while(|((owner, _), _)| *owner == id)
            .map(|((_, name), value)| (name.clone(), value.clone()))
            .collect()
    }

    fn joined(&self, id: AlertId) -> Option<StoredAlert> {
        let row = self.alerts.get(&id)?;
        Some(StoredAlert {
            id,
            fingerprint: row.fingerprint.clone(),
            status: row.status,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            generator_url: row.generator_url.clone(),
            labels: Self::children(&self.labels, id),
            annotations: Self::children(&self.annotations, id),
        })
    }
}

/// Alert store kept in process memory.
///
/// Transactions are serialized: each one holds the tables exclusively from
/// `begin` until commit, rollback or drop, and undoes its own writes unless
/// committed.
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            closed: AtomicBool::new(false),
        }
    }

    /// Takes the tables exclusively until the transaction ends.
    pub async fn begin(&self) -> Result<MemoryTransaction> {
        self.ensure_open()?;
        let tables = Arc::clone(&self.tables).lock_owned().await;
        Ok(MemoryTransaction {
            tables,
            log: Vec::new(),
            finished: false,
        })
    }

    /// Look up one alert with its labels and annotations.
    pub async fn get(&self, fingerprint: &str, starts_at: DateTime<Utc>) -> Option<StoredAlert> {
        let tables = self.tables.lock().await;
        let id = *tables
            .by_identity
            .get(&(fingerprint.to_string(), starts_at.timestamp_millis()))?;
        tables.joined(id)
    }

    /// Number of alert rows
    pub async fn len(&self) -> usize {
        self.tables.lock().await.alerts.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(AlertError::Closed("memory store is closed".into()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn save(&self, alert: &Alert) -> Result<()> {
        let tx = self.begin().await?;
        write_alert(tx, alert).await
    }

    async fn load_firing(&self) -> Result<Vec<Alert>> {
        self.ensure_open()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .alerts
            .iter()
            .filter(|(_, row)| row.status == AlertStatus::Firing)
            .filter_map(|(id, _)| tables.joined(*id))
            .map(Alert::from)
            .collect())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct MemoryTransaction {
    tables: OwnedMutexGuard<Tables>,
    log: Vec<Change>,
    finished: bool,
}

impl MemoryTransaction {
    fn undo(&mut self) {
        while let Some(change) = self.log.pop() {
            change.revert(&mut self.tables);
        }
        self.finished = true;
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find_alert(&mut self, fingerprint: &str, starts_at: DateTime<Utc>) -> Result<Option<AlertId>> {
        Ok(self
            .tables
            .by_identity
            .get(&(fingerprint.to_string(), starts_at.timestamp_millis()))
            .copied())
    }

    async fn insert_alert(&mut self, alert: &Alert) -> Result<AlertId> {
        let key = (alert.fingerprint.clone(), alert.starts_at.timestamp_millis());
        if self.tables.by_identity.contains_key(&key) {
            return Err(AlertError::Constraint(format!(
                "alert {} already exists",
                alert.identity()
            )));
        }

        self.tables.next_id += 1;
        let id = self.tables.next_id;
        self.tables.alerts.insert(id, AlertRow::from_alert(alert));
        self.tables.by_identity.insert(key, id);
        self.log.push(Change::InsertAlert { id });
        Ok(id)
    }

    async fn update_alert(&mut self, id: AlertId, alert: &Alert) -> Result<()> {
        let row = self
            .tables
            .alerts
            .get_mut(&id)
            .ok_or_else(|| AlertError::Store(format!("alert row {} not found", id)))?;

        let old_row = row.clone();
        row.status = alert.status;
        row.ends_at = alert.ends_at;
        row.generator_url = alert.generator_url.clone();
        self.log.push(Change::UpdateAlert { id, old_row });
        Ok(())
    }

    async fn insert_label(&mut self, id: AlertId, name: &str, value: &str) -> Result<()> {
        let key = (id, name.to_string());
        if self.tables.labels.contains_key(&key) {
            return Err(AlertError::Constraint(format!(
                "label '{}' already exists for alert row {}",
                name, id
            )));
        }
        self.tables.labels.insert(key, value.to_string());
        self.log.push(Change::InsertLabel {
            id,
            name: name.to_string(),
        });
        Ok(())
    }

    async fn upsert_annotation(&mut self, id: AlertId, name: &str, value: &str) -> Result<()> {
        let old_value = self
            .tables
            .annotations
            .insert((id, name.to_string()), value.to_string());
        self.log.push(Change::UpsertAnnotation {
            id,
            name: name.to_string(),
            old_value,
        });
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        self.log.clear();
        self.finished = true;
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        self.undo();
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.undo();
        }
    }
}
