use super::{WebhookOptions, router};
use crate::buffer::DedupBuffer;
use crate::core::{AlertError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{Level, event};

/// A running webhook listener.
pub struct WebhookServer {
    local_addr: SocketAddr,
    grace_period: Duration,
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<std::io::Result<()>>>,
}

impl WebhookServer {
    /// Binds the configured address and starts serving.
    pub async fn bind(buffer: Arc<DedupBuffer>, options: WebhookOptions) -> Result<Self> {
        options.validate()?;
        let listener = TcpListener::bind(&options.address)
            .await
            .map_err(|err| AlertError::Config(format!("cannot listen on {}: {}", options.address, err)))?;
        Self::serve(listener, buffer, options)
    }

    /// Starts serving on an already bound listener.
    pub fn serve(listener: TcpListener, buffer: Arc<DedupBuffer>, options: WebhookOptions) -> Result<Self> {
        let local_addr = listener
            .local_addr()
            .map_err(|err| AlertError::Config(format!("listener has no local address: {}", err)))?;
        let grace_period = options.grace_period;
        let app = router(buffer, options);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let join_handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = stop_rx.await;
                })
                .await
        });
        event!(Level::INFO, address = %local_addr, "webhook receiver listening");

        Ok(Self {
            local_addr,
            grace_period,
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and waits up to the grace period for
    /// in-flight requests. Requests still running after that are aborted.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        let Some(mut join_handle) = self.join_handle.take() else {
            return Ok(());
        };

        match tokio::time::timeout(self.grace_period, &mut join_handle).await {
            Ok(joined) => {
                joined?.map_err(|err| AlertError::Task(format!("webhook server: {}", err)))?;
                event!(Level::INFO, "webhook receiver stopped");
            }
            Err(_) => {
                join_handle.abort();
                event!(
                    Level::WARN,
                    grace_period = ?self.grace_period,
                    "webhook receiver did not drain in time, aborted"
                );
            }
        }
        Ok(())
    }
}

impl Drop for WebhookServer {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}
