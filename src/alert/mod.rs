//! Alert records as pushed by Alertmanager.
//!
//! An [`Alert`] is one firing of one alert condition. The condition is named
//! by the controller-assigned fingerprint; successive firings of the same
//! condition differ by their start timestamp. Together they form the
//! [`Identity`] the buffer and the store are keyed by.

pub mod group;

pub use group::AlertGroup;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Lifecycle state of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Firing => "firing",
            AlertStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "firing" => Some(AlertStatus::Firing),
            "resolved" => Some(AlertStatus::Resolved),
            _ => None,
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite key naming one alert instance.
///
/// The start timestamp is kept at millisecond precision, which is what
/// Alertmanager puts on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Identity {
    pub fingerprint: String,
    pub starts_at_ms: i64,
}

impl Identity {
    pub fn new(fingerprint: impl Into<String>, starts_at: DateTime<Utc>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            starts_at_ms: starts_at.timestamp_millis(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.fingerprint, self.starts_at_ms)
    }
}

/// One logical alert instance plus its persistence bookkeeping.
///
/// `persisted` and `persisted_at` never come from the wire: a decoded alert
/// is always unsaved and stamped with its receipt time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub fingerprint: String,
    pub status: AlertStatus,
    pub starts_at: DateTime<Utc>,
    /// Only meaningful once the alert is resolved.
    #[serde(default)]
    pub ends_at: DateTime<Utc>,
    /// Fixed at first observation of the identity.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, rename = "generatorURL")]
    pub generator_url: String,

    #[serde(default, skip_deserializing)]
    pub persisted: bool,
    /// Time of the last confirmed write, real or logical.
    #[serde(default = "Utc::now", skip_deserializing)]
    pub persisted_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(fingerprint: impl Into<String>, status: AlertStatus, starts_at: DateTime<Utc>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            status,
            starts_at,
            ends_at: DateTime::<Utc>::default(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            generator_url: String::new(),
            persisted: false,
            persisted_at: Utc::now(),
        }
    }

    pub fn firing(fingerprint: impl Into<String>, starts_at: DateTime<Utc>) -> Self {
        Self::new(fingerprint, AlertStatus::Firing, starts_at)
    }

    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(name.into(), value.into());
        self
    }

    pub fn with_generator_url(mut self, url: impl Into<String>) -> Self {
        self.generator_url = url.into();
        self
    }

    pub fn with_ends_at(mut self, ends_at: DateTime<Utc>) -> Self {
        self.ends_at = ends_at;
        self
    }

    pub fn resolved_at(mut self, ends_at: DateTime<Utc>) -> Self {
        self.status = AlertStatus::Resolved;
        self.ends_at = ends_at;
        self
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.fingerprint.clone(), self.starts_at)
    }

    pub fn is_firing(&self) -> bool {
        self.status == AlertStatus::Firing
    }

    /// Compares everything except the persistence bookkeeping.
    ///
    /// The end timestamp only takes part once both sides are resolved;
    /// Alertmanager moves it forward on every resend of a firing alert.
    pub fn same_content(&self, other: &Alert) -> bool {
        if self.fingerprint != other.fingerprint
            || self.status != other.status
            || self.starts_at.timestamp_millis() != other.starts_at.timestamp_millis()
            || self.generator_url != other.generator_url
            || self.labels != other.labels
            || self.annotations != other.annotations
        {
            return false;
        }

        self.status == AlertStatus::Firing
            || self.ends_at.timestamp_millis() == other.ends_at.timestamp_millis()
    }

    /// A resolved alert whose last confirmed write is older than `max_lifetime`.
    pub fn is_expired(&self, max_lifetime: Duration, now: DateTime<Utc>) -> bool {
        if self.status != AlertStatus::Resolved || !self.persisted {
            return false;
        }
        match (now - self.persisted_at).to_std() {
            Ok(age) => age > max_lifetime,
            Err(_) => false,
        }
    }

    /// Closes the alert out locally; the change still needs saving.
    pub fn resolve(&mut self, now: DateTime<Utc>) {
        self.status = AlertStatus::Resolved;
        self.ends_at = now;
        self.persisted = false;
        self.persisted_at = now;
    }

    pub fn mark_persisted(&mut self, now: DateTime<Utc>) {
        self.persisted = true;
        self.persisted_at = now;
    }
}
