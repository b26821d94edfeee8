use crate::core::{AlertError, Result};
use std::time::Duration;

/// Webhook receiver configuration
#[derive(Debug, Clone)]
pub struct WebhookOptions {
    /// Listen address, `host:port`
    pub address: String,

    /// Webhook payload version accepted from Alertmanager
    pub version: String,

    /// How long a stop waits for in-flight requests
    pub grace_period: Duration,

    /// How long a request waits for the buffer gate
    pub gate_wait: Duration,
}

impl WebhookOptions {
    pub fn new() -> Self {
        Self {
            address: "0.0.0.0:9567".to_string(),
            version: "4".to_string(),
            grace_period: Duration::from_secs(15),
            gate_wait: Duration::from_secs(5),
        }
    }

    pub fn address(mut self, address: &str) -> Self {
        self.address = address.to_string();
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn gate_wait(mut self, wait: Duration) -> Self {
        self.gate_wait = wait;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(AlertError::Config("listen address cannot be empty".into()));
        }
        if self.version.is_empty() {
            return Err(AlertError::Config("webhook version cannot be empty".into()));
        }
        if self.gate_wait.is_zero() {
            return Err(AlertError::Config("gate_wait must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for WebhookOptions {
    fn default() -> Self {
        Self::new()
    }
}
