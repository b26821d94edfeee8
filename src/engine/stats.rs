use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals kept by the engine.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    saved: AtomicU64,
    failed: AtomicU64,
    batches: AtomicU64,
    last_unsaved: AtomicU64,
}

impl Counters {
    pub(crate) fn record_batch(&self, submitted: usize, saved: usize, failed: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.last_unsaved.store(submitted as u64, Ordering::Relaxed);
        self.saved.fetch_add(saved as u64, Ordering::Relaxed);
        self.failed.fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> EngineStats {
        EngineStats {
            saved: self.saved.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            last_unsaved: self.last_unsaved.load(Ordering::Relaxed),
        }
    }
}

/// Engine statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Alerts confirmed written since start
    pub saved: u64,
    /// Save attempts that failed since start
    pub failed: u64,
    /// Non-empty batches processed
    pub batches: u64,
    /// Size of the most recent batch
    pub last_unsaved: u64,
}

impl fmt::Display for EngineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Engine Stats: {} saved, {} failed, {} batches, last batch {}",
            self.saved, self.failed, self.batches, self.last_unsaved
        )
    }
}
