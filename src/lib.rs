// ============================================================================
// alert2pg Library
// ============================================================================
//
// Alerts pushed by Alertmanager land in a deduplicating buffer. A
// reconciliation loop closes out alerts the controller stopped reporting,
// an eviction loop forgets old resolved ones, and the persistence engine
// writes whatever is unsaved to PostgreSQL.
//
// ============================================================================

pub mod core;
pub mod alert;
pub mod controller;
pub mod buffer;
pub mod storage;
pub mod connection;
pub mod engine;
pub mod webhook;

// Re-export main types for convenience
pub use core::{AlertError, Result};
pub use alert::{Alert, AlertGroup, AlertStatus, Identity};
pub use controller::{AlertFilter, AlertmanagerClient, FiringSource};
pub use buffer::{BufferOptions, BufferWorker, DedupBuffer};
pub use storage::{AlertStore, MemoryStore, PgStore, StoreTransaction, StoredAlert};
pub use connection::ConnectionConfig;
pub use engine::{EngineOptions, EngineStats, EngineWorker, PersistenceEngine};
pub use webhook::{WebhookOptions, WebhookServer};

