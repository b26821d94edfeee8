pub mod app;

use alert2pg::{BufferOptions, ConnectionConfig, EngineOptions, WebhookOptions};
use anyhow::Context;
use std::time::Duration;

/// Receives Alertmanager notifications, deduplicates them, and keeps the
/// alert history in PostgreSQL.
#[derive(clap::Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// URL of the postgres database.
    #[clap(long = "database", env = "DATABASE_URL")]
    pub database_url: String,
    /// Maximum number of open database connections.
    #[clap(long, env = "ALERT2PG_MAX_CONNECTIONS", default_value = "10")]
    pub max_connections: usize,
    /// Address the webhook receiver listens on.
    #[clap(long, env = "ALERT2PG_LISTEN_ADDRESS", default_value = "0.0.0.0:9567")]
    pub listen_address: String,
    /// Webhook payload version accepted from Alertmanager.
    #[clap(long, env = "ALERT2PG_WEBHOOK_VERSION", default_value = "4")]
    pub webhook_version: String,
    /// How long shutdown waits for in-flight webhook requests.
    #[clap(long, env = "ALERT2PG_GRACE_PERIOD", default_value = "15s")]
    #[arg(value_parser = humantime::parse_duration)]
    pub grace_period: Duration,
    /// Create the alert tables on startup when they are missing.
    #[clap(long, env = "ALERT2PG_CREATE_SCHEMA")]
    pub create_schema: bool,
    /// How long a request or background pass waits for the buffer.
    #[clap(long, env = "ALERT2PG_GATE_WAIT", default_value = "5s")]
    #[arg(value_parser = humantime::parse_duration)]
    pub gate_wait: Duration,
    /// Alertmanager address, `host:port` or a base URL.
    #[clap(long, env = "ALERTMANAGER_ADDRESS")]
    pub alertmanager_address: String,
    /// Timeout of one Alertmanager query.
    #[clap(long, env = "ALERTMANAGER_TIMEOUT", default_value = "3s")]
    #[arg(value_parser = humantime::parse_duration)]
    pub alertmanager_timeout: Duration,
    /// How long a resolved and saved alert stays buffered.
    #[clap(long, env = "ALERT2PG_MAX_LIFETIME", default_value = "10m")]
    #[arg(value_parser = humantime::parse_duration)]
    pub max_lifetime: Duration,
    /// Period of reconciliation against Alertmanager.
    #[clap(long, env = "ALERT2PG_SYNC_INTERVAL", default_value = "1s")]
    #[arg(value_parser = humantime::parse_duration)]
    pub sync_interval: Duration,
    /// Period of buffer eviction.
    #[clap(long, env = "ALERT2PG_GC_INTERVAL", default_value = "5m")]
    #[arg(value_parser = humantime::parse_duration)]
    pub gc_interval: Duration,
    /// Number of concurrent save workers.
    #[clap(long, env = "ALERT2PG_PARALLELISM", default_value = "8")]
    pub parallelism: usize,
    /// Deadline for saving one alert.
    #[clap(long, env = "ALERT2PG_SAVE_TIMEOUT", default_value = "5s")]
    #[arg(value_parser = humantime::parse_duration)]
    pub save_timeout: Duration,
    /// Period of the save loop.
    #[clap(long, env = "ALERT2PG_SAVE_INTERVAL", default_value = "1s")]
    #[arg(value_parser = humantime::parse_duration)]
    pub save_interval: Duration,
    /// Log filter used when RUST_LOG is not set.
    #[clap(long, env = "ALERT2PG_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
    /// Print logs as JSON.
    #[clap(long, env = "ALERT2PG_LOG_JSON")]
    pub log_json: bool,
}

impl Args {
    pub fn connection_config(&self) -> anyhow::Result<ConnectionConfig> {
        let config = ConnectionConfig::from_url(&self.database_url).context("invalid database URL")?;
        let config = config.max_connections(self.max_connections);
        config.validate().context("invalid database settings")?;
        Ok(config)
    }

    pub fn buffer_options(&self) -> BufferOptions {
        BufferOptions::new()
            .max_lifetime(self.max_lifetime)
            .sync_interval(self.sync_interval)
            .gc_interval(self.gc_interval)
            .gate_wait(self.gate_wait)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions::new()
            .parallelism(self.parallelism)
            .save_timeout(self.save_timeout)
            .interval(self.save_interval)
            .gate_wait(self.gate_wait)
    }

    pub fn webhook_options(&self) -> WebhookOptions {
        WebhookOptions::new()
            .address(&self.listen_address)
            .version(&self.webhook_version)
            .grace_period(self.grace_period)
            .gate_wait(self.gate_wait)
    }
}

/// Installs the global tracing subscriber. `RUST_LOG` wins over `level`.
pub fn init_tracing(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("invalid log level")?;
    let builder = tracing_subscriber::FmtSubscriber::builder().with_env_filter(filter);

    let installed = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.context("setting tracing default failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const REQUIRED: [&str; 5] = [
        "alert2pg",
        "--database",
        "postgres://alert2pg:secret@db:5432/alerts",
        "--alertmanager-address",
        "alertmanager:9093",
    ];

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(REQUIRED).unwrap();

        let buffer = args.buffer_options();
        assert_eq!(buffer.max_lifetime, Duration::from_secs(600));
        assert_eq!(buffer.sync_interval, Duration::from_secs(1));
        assert_eq!(buffer.gc_interval, Duration::from_secs(300));

        let engine = args.engine_options();
        assert_eq!(engine.parallelism, 8);
        assert_eq!(engine.save_timeout, Duration::from_secs(5));

        let webhook = args.webhook_options();
        assert_eq!(webhook.address, "0.0.0.0:9567");
        assert_eq!(webhook.version, "4");
        assert_eq!(args.alertmanager_timeout, Duration::from_secs(3));
        assert!(!args.log_json);
    }

    #[test]
    fn test_humantime_durations() {
        let mut argv = REQUIRED.to_vec();
        argv.extend(["--max-lifetime", "1h 30m", "--save-timeout", "250ms"]);
        let args = Args::try_parse_from(argv).unwrap();

        assert_eq!(args.max_lifetime, Duration::from_secs(5400));
        assert_eq!(args.save_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_connection_config_from_url() {
        let mut argv = REQUIRED.to_vec();
        argv.extend(["--max-connections", "3"]);
        let config = Args::try_parse_from(argv).unwrap().connection_config().unwrap();

        assert_eq!(config.user(), Some("alert2pg"));
        assert_eq!(config.dbname(), Some("alerts"));
        assert_eq!(config.max_connections, 3);
        assert_eq!(config.to_url(), "postgres://alert2pg:***@db:5432/alerts");
    }

    #[test]
    fn test_tls_database_url_refused() {
        let args = Args::try_parse_from([
            "alert2pg",
            "--database",
            "postgres://alert2pg:secret@db:5432/alerts?sslmode=require",
            "--alertmanager-address",
            "am:9093",
        ])
        .unwrap();
        let err = args.connection_config().unwrap_err();
        assert!(format!("{:#}", err).contains("sslmode"));
    }

    #[test]
    fn test_gate_wait_applies_to_every_component() {
        let mut argv = REQUIRED.to_vec();
        argv.extend(["--gate-wait", "750ms"]);
        let args = Args::try_parse_from(argv).unwrap();

        assert_eq!(args.buffer_options().gate_wait, Duration::from_millis(750));
        assert_eq!(args.engine_options().gate_wait, Duration::from_millis(750));
        assert_eq!(args.webhook_options().gate_wait, Duration::from_millis(750));
        assert!(!args.create_schema);
    }

    #[test]
    fn test_bad_database_url() {
        let args = Args::try_parse_from([
            "alert2pg",
            "--database",
            "mysql://nope",
            "--alertmanager-address",
            "am:9093",
        ])
        .unwrap();
        assert!(args.connection_config().is_err());
    }
}
