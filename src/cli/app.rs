use super::Args;
use alert2pg::{
    AlertStore, AlertmanagerClient, BufferOptions, BufferWorker, DedupBuffer, EngineOptions,
    EngineWorker, FiringSource, PersistenceEngine, PgStore, WebhookOptions, WebhookServer,
};
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{Level, event};

/// Component settings for one [`App`].
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub buffer: BufferOptions,
    pub engine: EngineOptions,
    pub webhook: WebhookOptions,
}

/// The running receiver: buffer loops, save loop and webhook listener.
pub struct App<S: AlertStore> {
    buffer: Arc<DedupBuffer>,
    server: WebhookServer,
    buffer_worker: BufferWorker,
    engine_worker: EngineWorker<S>,
}

impl<S: AlertStore> App<S> {
    /// Seeds the buffer from the store, catches up with the controller,
    /// then starts every component. Ingress comes up last.
    pub async fn start(
        store: Arc<S>,
        source: Arc<dyn FiringSource>,
        settings: Settings,
    ) -> anyhow::Result<Self> {
        let buffer = Arc::new(DedupBuffer::new(source, settings.buffer)?);

        match store.load_firing().await {
            Ok(firing) => match buffer.preload(firing).await {
                Ok(loaded) => event!(Level::INFO, loaded, "preloaded firing alerts from store"),
                Err(err) => event!(Level::WARN, error = %err, "cannot preload firing alerts"),
            },
            Err(err) => event!(Level::WARN, error = %err, "cannot preload firing alerts"),
        }
        match buffer.reconcile().await {
            Ok(resolved) => event!(Level::INFO, resolved, "startup reconciliation done"),
            Err(err) => event!(Level::WARN, error = %err, "startup reconciliation failed"),
        }

        let engine = Arc::new(PersistenceEngine::new(
            Arc::clone(&buffer),
            store,
            settings.engine,
        )?);
        let buffer_worker = buffer.start();
        let engine_worker = engine.start();
        let server = WebhookServer::bind(Arc::clone(&buffer), settings.webhook)
            .await
            .context("starting webhook receiver")?;

        Ok(Self {
            buffer,
            server,
            buffer_worker,
            engine_worker,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn buffer(&self) -> &Arc<DedupBuffer> {
        &self.buffer
    }

    /// Drains in order: ingress, then the buffer's final reconciliation,
    /// then the engine's final save and the store.
    ///
    /// Every stage runs; failures are reported together at the end.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        event!(Level::INFO, "shutting down");
        let mut failures = Vec::new();
        if let Err(err) = self.server.stop().await {
            failures.push(format!("stopping webhook receiver: {}", err));
        }
        if let Err(err) = self.buffer_worker.stop().await {
            failures.push(format!("stopping buffer: {}", err));
        }
        if let Err(err) = self.engine_worker.stop().await {
            failures.push(format!("stopping persistence engine: {}", err));
        }

        if failures.is_empty() {
            event!(Level::INFO, "shutdown complete");
            Ok(())
        } else {
            event!(Level::ERROR, failures = failures.len(), "shutdown finished with errors");
            Err(anyhow::anyhow!(failures.join("; ")))
        }
    }
}

/// Runs the receiver against PostgreSQL until SIGINT or SIGTERM.
pub async fn run(args: Args) -> anyhow::Result<()> {
    let config = args.connection_config()?;
    let store = Arc::new(
        PgStore::connect(config)
            .await
            .context("connecting to postgres")?,
    );
    if args.create_schema {
        store.create_schema().await.context("creating alert schema")?;
    }
    let client = AlertmanagerClient::new(&args.alertmanager_address)?
        .timeout(args.alertmanager_timeout);

    let settings = Settings {
        buffer: args.buffer_options(),
        engine: args.engine_options(),
        webhook: args.webhook_options(),
    };
    let app = App::start(store, Arc::new(client), settings).await?;
    event!(Level::INFO, address = %app.local_addr(), "alert2pg started");

    shutdown_signal().await;
    app.shutdown().await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            event!(Level::ERROR, error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                event!(Level::ERROR, error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
