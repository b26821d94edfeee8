use crate::core::{AlertError, Result};
use std::time::Duration;

/// Buffer timing configuration
#[derive(Debug, Clone)]
pub struct BufferOptions {
    /// How long a resolved, persisted alert stays after its last confirmation
    pub max_lifetime: Duration,

    /// Reconciliation period
    pub sync_interval: Duration,

    /// Eviction period
    pub gc_interval: Duration,

    /// How long the reconciliation and eviction sweeps wait for the gate
    pub gate_wait: Duration,
}

impl BufferOptions {
    pub fn new() -> Self {
        Self {
            max_lifetime: Duration::from_secs(600),
            sync_interval: Duration::from_secs(1),
            gc_interval: Duration::from_secs(300),
            gate_wait: Duration::from_secs(5),
        }
    }

    /// Set maximum lifetime
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Set reconciliation interval
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Set eviction interval
    pub fn gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = interval;
        self
    }

    /// Set the gate wait of the sweeps
    pub fn gate_wait(mut self, wait: Duration) -> Self {
        self.gate_wait = wait;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync_interval.is_zero() {
            return Err(AlertError::Config("sync_interval must be > 0".into()));
        }
        if self.gc_interval.is_zero() {
            return Err(AlertError::Config("gc_interval must be > 0".into()));
        }
        if self.gate_wait.is_zero() {
            return Err(AlertError::Config("gate_wait must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = BufferOptions::default();
        assert_eq!(options.max_lifetime, Duration::from_secs(600));
        assert_eq!(options.sync_interval, Duration::from_secs(1));
        assert_eq!(options.gc_interval, Duration::from_secs(300));
        assert_eq!(options.gate_wait, Duration::from_secs(5));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        assert!(BufferOptions::new().sync_interval(Duration::ZERO).validate().is_err());
        assert!(BufferOptions::new().gc_interval(Duration::ZERO).validate().is_err());
        assert!(BufferOptions::new().gate_wait(Duration::ZERO).validate().is_err());
    }
}
