// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Every write a MemoryTransaction performs goes straight into the tables and
// pushes the Change that undoes it. Commit forgets the log; rollback (or a
// drop without commit) reverts it newest first.
//
// ============================================================================

use super::AlertId;
use super::memory::{AlertRow, Tables};

#[derive(Debug, Clone)]
pub(crate) enum Change {
    InsertAlert { id: AlertId },

    UpdateAlert { id: AlertId, old_row: AlertRow },

    InsertLabel { id: AlertId, name: String },

    /// `old_value` is `None` when the annotation was newly inserted.
    UpsertAnnotation {
        id: AlertId,
        name: String,
        old_value: Option<String>,
    },
}

impl Change {
    /// Undo this change against the tables it was applied to.
    pub(crate) fn revert(self, tables: &mut Tables) {
        match self {
            Change::InsertAlert { id } => {
                if let Some(row) = tables.alerts.remove(&id) {
                    tables
                        .by_identity
                        .remove(&(row.fingerprint, row.starts_at.timestamp_millis()));
                }
            }
            Change::UpdateAlert { id, old_row } => {
                tables.alerts.insert(id, old_row);
            }
            Change::InsertLabel { id, name } => {
                tables.labels.remove(&(id, name));
            }
            Change::UpsertAnnotation { id, name, old_value } => match old_value {
                Some(value) => {
                    tables.annotations.insert((id, name), value);
                }
                None => {
                    tables.annotations.remove(&(id, name));
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertStatus;
    use chrono::{TimeZone, Utc};

    fn row() -> AlertRow {
        AlertRow {
            fingerprint: "abc".into(),
            status: AlertStatus::Firing,
            starts_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            ends_at: Utc.timestamp_opt(0, 0).unwrap(),
            generator_url: String::new(),
        }
    }

    #[test]
    fn test_revert_insert_alert() {
        let mut tables = Tables::default();
        let r = row();
        tables
            .by_identity
            .insert((r.fingerprint.clone(), r.starts_at.timestamp_millis()), 1);
        tables.alerts.insert(1, r);

        Change::InsertAlert { id: 1 }.revert(&mut tables);

        assert!(tables.alerts.is_empty());
        assert!(tables.by_identity.is_empty());
    }

    #[test]
    fn test_revert_annotation_restores_previous_value() {
        let mut tables = Tables::default();
        tables.annotations.insert((1, "summary".into()), "new".into());

        Change::UpsertAnnotation {
            id: 1,
            name: "summary".into(),
            old_value: Some("old".into()),
        }
        .revert(&mut tables);
        assert_eq!(tables.annotations[&(1, "summary".to_string())], "old");

        Change::UpsertAnnotation {
            id: 1,
            name: "summary".into(),
            old_value: None,
        }
        .revert(&mut tables);
        assert!(tables.annotations.is_empty());
    }
}
