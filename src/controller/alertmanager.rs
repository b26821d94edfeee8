use super::FiringSource;
use crate::alert::{Alert, AlertStatus, Identity};
use crate::core::{AlertError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::{Level, event};

/// Query flags for `GET /api/v2/alerts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertFilter {
    pub active: bool,
    pub silenced: bool,
    pub inhibited: bool,
    pub unprocessed: bool,
}

impl Default for AlertFilter {
    fn default() -> Self {
        Self {
            active: true,
            silenced: false,
            inhibited: false,
            unprocessed: false,
        }
    }
}

/// Alert as returned by the Alertmanager v2 API. Its `status` is an object
/// there, not a string, and everything it returns is firing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GettableAlert {
    fingerprint: String,
    starts_at: DateTime<Utc>,
    #[serde(default)]
    ends_at: DateTime<Utc>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
    #[serde(default, rename = "generatorURL")]
    generator_url: String,
}

impl From<GettableAlert> for Alert {
    fn from(a: GettableAlert) -> Self {
        let mut alert = Alert::new(a.fingerprint, AlertStatus::Firing, a.starts_at);
        alert.ends_at = a.ends_at;
        alert.labels = a.labels;
        alert.annotations = a.annotations;
        alert.generator_url = a.generator_url;
        alert
    }
}

/// HTTP client for one Alertmanager instance.
#[derive(Debug, Clone)]
pub struct AlertmanagerClient {
    address: String,
    timeout: Duration,
    filter: AlertFilter,
    http: reqwest::Client,
}

impl AlertmanagerClient {
    /// `address` is `host:port`, or a full base URL with scheme.
    pub fn new(address: &str) -> Result<Self> {
        if address.is_empty() {
            return Err(AlertError::Config("Alertmanager address cannot be empty".into()));
        }
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            address: address.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(3),
            filter: AlertFilter::default(),
            http,
        })
    }

    /// Set the per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the query filter
    pub fn filter(mut self, filter: AlertFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn alerts_url(&self) -> String {
        let base = if self.address.starts_with("http://") || self.address.starts_with("https://") {
            self.address.clone()
        } else {
            format!("http://{}", self.address)
        };
        format!(
            "{}/api/v2/alerts?active={}&silenced={}&inhibited={}&unprocessed={}",
            base, self.filter.active, self.filter.silenced, self.filter.inhibited, self.filter.unprocessed
        )
    }

    /// Fetch the alerts Alertmanager currently holds as firing.
    pub async fn fetch_firing(&self) -> Result<Vec<Alert>> {
        let url = self.alerts_url();
        let resp = self
            .http
            .get(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AlertError::Controller(format!("request to {} failed: {}", url, e)))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(AlertError::Controller(format!("unexpected response status: {}", status)));
        }

        let alerts: Vec<GettableAlert> = resp
            .json()
            .await
            .map_err(|e| AlertError::Controller(format!("cannot decode response body: {}", e)))?;

        event!(Level::DEBUG, count = alerts.len(), "fetched firing alerts");
        Ok(alerts.into_iter().map(Alert::from).collect())
    }
}

#[async_trait]
impl FiringSource for AlertmanagerClient {
    async fn fetch_firing_identities(&self) -> Result<HashSet<Identity>> {
        let alerts = self.fetch_firing().await?;
        Ok(alerts.iter().map(Alert::identity).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alerts_url_defaults() {
        let client = AlertmanagerClient::new("alertmanager:9093").unwrap();
        assert_eq!(
            client.alerts_url(),
            "http://alertmanager:9093/api/v2/alerts?active=true&silenced=false&inhibited=false&unprocessed=false"
        );
    }

    #[test]
    fn test_alerts_url_keeps_scheme() {
        let client = AlertmanagerClient::new("https://am.example.com/")
            .unwrap()
            .filter(AlertFilter {
                silenced: true,
                ..AlertFilter::default()
            });
        assert_eq!(
            client.alerts_url(),
            "https://am.example.com/api/v2/alerts?active=true&silenced=true&inhibited=false&unprocessed=false"
        );
    }

    #[test]
    fn test_empty_address_rejected() {
        assert!(matches!(AlertmanagerClient::new(""), Err(AlertError::Config(_))));
    }

    #[test]
    fn test_decode_gettable_alert() {
        let body = r#"[{
            "annotations": {"summary": "disk full"},
            "endsAt": "2025-07-08T06:05:48.268Z",
            "fingerprint": "077bf4e884599215",
            "receivers": [{"name": "pg"}],
            "startsAt": "2025-07-02T22:23:18.268Z",
            "status": {"inhibitedBy": [], "silencedBy": [], "state": "active"},
            "updatedAt": "2025-07-08T06:01:48.268Z",
            "generatorURL": "/graph?g0.expr=disk",
            "labels": {"alertname": "DiskFull"}
        }]"#;

        let decoded: Vec<GettableAlert> = serde_json::from_str(body).unwrap();
        let alert = Alert::from(decoded.into_iter().next().unwrap());

        assert_eq!(alert.status, AlertStatus::Firing);
        assert_eq!(alert.fingerprint, "077bf4e884599215");
        assert_eq!(alert.labels["alertname"], "DiskFull");
        assert!(!alert.persisted);
    }
}
