/// Alertmanager client tests
///
/// Runs the client against a local stand-in of the v2 alerts API.
/// Run with: cargo test --test alertmanager_client_tests

use alert2pg::{AlertError, AlertmanagerClient, FiringSource, Identity};
use axum::Router;
use axum::extract::RawQuery;
use axum::http::StatusCode;
use axum::routing::get;
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

const ALERTS: &str = r#"[
    {
        "annotations": {"summary": "disk full"},
        "endsAt": "2025-07-08T06:05:48.268Z",
        "fingerprint": "077bf4e884599215",
        "receivers": [{"name": "pg"}],
        "startsAt": "2025-07-02T22:23:18.268Z",
        "status": {"inhibitedBy": [], "silencedBy": [], "state": "active"},
        "updatedAt": "2025-07-08T06:01:48.268Z",
        "generatorURL": "/graph?g0.expr=disk",
        "labels": {"alertname": "DiskFull"}
    },
    {
        "fingerprint": "1a2b3c4d5e6f7081",
        "startsAt": "2025-07-03T10:00:00Z",
        "status": {"inhibitedBy": [], "silencedBy": [], "state": "active"},
        "labels": {"alertname": "HighLatency"}
    }
]"#;

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn at(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
}

#[tokio::test]
async fn test_fetch_firing_identities() {
    let app = Router::new().route(
        "/api/v2/alerts",
        get(|RawQuery(query): RawQuery| async move {
            assert_eq!(
                query.as_deref(),
                Some("active=true&silenced=false&inhibited=false&unprocessed=false")
            );
            ([("content-type", "application/json")], ALERTS)
        }),
    );
    let addr = serve(app).await;
    let client = AlertmanagerClient::new(&addr.to_string()).unwrap();

    let identities = client.fetch_firing_identities().await.unwrap();

    assert_eq!(identities.len(), 2);
    assert!(identities.contains(&Identity::new("077bf4e884599215", at("2025-07-02T22:23:18.268Z"))));
    assert!(identities.contains(&Identity::new("1a2b3c4d5e6f7081", at("2025-07-03T10:00:00Z"))));
}

#[tokio::test]
async fn test_fetch_firing_decodes_alerts() {
    let app = Router::new().route("/api/v2/alerts", get(|| async { ALERTS }));
    let addr = serve(app).await;
    let client = AlertmanagerClient::new(&format!("http://{}/", addr)).unwrap();

    let alerts = client.fetch_firing().await.unwrap();

    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().all(|a| a.is_firing() && !a.persisted));
    assert_eq!(alerts[0].labels["alertname"], "DiskFull");
    assert_eq!(alerts[0].generator_url, "/graph?g0.expr=disk");
}

#[tokio::test]
async fn test_empty_answer() {
    let app = Router::new().route("/api/v2/alerts", get(|| async { "[]" }));
    let addr = serve(app).await;
    let client = AlertmanagerClient::new(&addr.to_string()).unwrap();

    assert!(client.fetch_firing_identities().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_server_error_status() {
    let app = Router::new().route(
        "/api/v2/alerts",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let addr = serve(app).await;
    let client = AlertmanagerClient::new(&addr.to_string()).unwrap();

    let err = client.fetch_firing_identities().await.unwrap_err();
    assert!(matches!(err, AlertError::Controller(ref msg) if msg.contains("500")));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_undecodable_body() {
    let app = Router::new().route("/api/v2/alerts", get(|| async { "{not json" }));
    let addr = serve(app).await;
    let client = AlertmanagerClient::new(&addr.to_string()).unwrap();

    let err = client.fetch_firing_identities().await.unwrap_err();
    assert!(matches!(err, AlertError::Controller(ref msg) if msg.contains("decode")));
}

#[tokio::test]
async fn test_unreachable_controller() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let client = AlertmanagerClient::new(&addr.to_string()).unwrap();

    let err = client.fetch_firing_identities().await.unwrap_err();
    assert!(matches!(err, AlertError::Controller(_)));
}

#[tokio::test]
async fn test_slow_controller_times_out() {
    let app = Router::new().route(
        "/api/v2/alerts",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            "[]"
        }),
    );
    let addr = serve(app).await;
    let client = AlertmanagerClient::new(&addr.to_string())
        .unwrap()
        .timeout(Duration::from_millis(100));

    let started = std::time::Instant::now();
    let err = client.fetch_firing_identities().await.unwrap_err();

    assert!(matches!(err, AlertError::Controller(_)));
    assert!(started.elapsed() < Duration::from_secs(2));
}
