//! HTTP service lifecycle: bind, serve on a background task, drain on signal.

use std::{future::Future, net::SocketAddr, time::Duration};

use axum::Router;
use thiserror::Error;
use tokio::{net::TcpListener, sync::{oneshot, watch}};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Serving,
    Draining,
    Stopped,
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("server failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("server task aborted: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("server forced to shutdown: in-flight requests still running after {0:?}")]
    DrainTimeout(Duration),
}

pub struct Server {
    listener: TcpListener,
    app: Router,
    drain_budget: Duration,
    phase: watch::Sender<Phase>,
}

impl Server {
    pub async fn bind(addr: SocketAddr, app: Router, drain_budget: Duration) -> Result<Self, ServeError> {
        let (phase, _) = watch::channel(Phase::Starting);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServeError::Bind { addr, source })?;
        phase.send_replace(Phase::Serving);
        Ok(Self {
            listener,
            app,
            drain_budget,
            phase,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Serves until `shutdown` resolves, then stops accepting and gives
    /// in-flight requests `drain_budget` to finish.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServeError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = self.local_addr() {
            info!(%addr, "starting server");
        }

        let Self {
            listener,
            app,
            drain_budget,
            phase,
        } = self;

        let (drain_tx, drain_rx) = oneshot::channel::<()>();
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = drain_rx.await;
        });
        let mut task = tokio::spawn(async move { serve.await });

        tokio::select! {
            joined = &mut task => {
                phase.send_replace(Phase::Stopped);
                joined??;
                return Ok(());
            }
            () = shutdown => {}
        }

        phase.send_replace(Phase::Draining);
        info!(budget = ?drain_budget, "shutting down server...");
        let _ = drain_tx.send(());

        match tokio::time::timeout(drain_budget, &mut task).await {
            Ok(joined) => {
                phase.send_replace(Phase::Stopped);
                joined??;
                info!("server exited");
                Ok(())
            }
            Err(_) => {
                task.abort();
                phase.send_replace(Phase::Stopped);
                error!(budget = ?drain_budget, "drain budget exceeded, aborting connections");
                Err(ServeError::DrainTimeout(drain_budget))
            }
        }
    }
}

/// Resolves on SIGINT or SIGTERM; both mean the same thing here.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, initiating graceful shutdown"),
        () = terminate => info!("received SIGTERM, initiating graceful shutdown"),
    }
}
