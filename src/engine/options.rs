use crate::core::{AlertError, Result};
use std::time::Duration;

/// Persistence engine configuration
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Number of concurrent save workers per batch
    pub parallelism: usize,

    /// Deadline for one alert's transaction
    pub save_timeout: Duration,

    /// Period of the save loop
    pub interval: Duration,

    /// How long a pass waits for the buffer gate
    pub gate_wait: Duration,
}

impl EngineOptions {
    pub fn new() -> Self {
        Self {
            parallelism: 8,
            save_timeout: Duration::from_secs(5),
            interval: Duration::from_secs(1),
            gate_wait: Duration::from_secs(5),
        }
    }

    pub fn parallelism(mut self, workers: usize) -> Self {
        self.parallelism = workers;
        self
    }

    pub fn save_timeout(mut self, timeout: Duration) -> Self {
        self.save_timeout = timeout;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn gate_wait(mut self, wait: Duration) -> Self {
        self.gate_wait = wait;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(AlertError::Config("parallelism must be > 0".into()));
        }
        if self.save_timeout.is_zero() {
            return Err(AlertError::Config("save_timeout must be > 0".into()));
        }
        if self.interval.is_zero() {
            return Err(AlertError::Config("interval must be > 0".into()));
        }
        if self.gate_wait.is_zero() {
            return Err(AlertError::Config("gate_wait must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::new()
    }
}
