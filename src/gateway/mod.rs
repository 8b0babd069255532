//! Gateway: HTTP/WebSocket boundary of the live-update pipeline
//!
//! Serves `GET /api/report` for on-demand reads and `GET /ws` for
//! subscribers. The change watcher and broadcast dispatcher run alongside as
//! background tasks.

pub mod handler;
pub mod session;

use crate::dispatch::Dispatcher;
use crate::error::{Result, VigilError};
use crate::models::GatewayConfig;
use crate::registry::ClientRegistry;
use crate::store::ReportStore;
use crate::watcher::ChangeWatcher;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Shared state handed to every request handler
#[derive(Debug, Clone)]
pub struct GatewayState {
    pub registry: ClientRegistry,
    pub store: ReportStore,
}

/// Bound HTTP listener for the gateway
pub struct Gateway {
    listener: TcpListener,
    state: GatewayState,
}

impl Gateway {
    /// Binds the listening socket
    pub async fn bind(addr: &str, state: GatewayState) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| VigilError::GatewayError(format!("Failed to bind to {addr}: {e}")))?;
        Ok(Self { listener, state })
    }

    /// Address actually bound, useful when binding port 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections forever
    pub async fn serve(self) -> Result<()> {
        info!("Gateway listening on http://{}", self.local_addr()?);

        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(|e| VigilError::GatewayError(format!("Accept failed: {e}")))?;

            let io = TokioIo::new(stream);
            let state = self.state.clone();

            debug!("New connection from {}", peer);

            tokio::task::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let state = state.clone();
                    handler::handle_request(req, peer, state)
                });

                if let Err(e) = http1::Builder::new()
                    .serve_connection(io, service)
                    .with_upgrades()
                    .await
                {
                    let err_str = e.to_string();
                    if !err_str.contains("connection closed") && !err_str.contains("early eof") {
                        debug!("Connection error from {}: {}", peer, e);
                    }
                }
            });
        }
    }
}

/// Starts the change watcher and dispatcher tasks feeding `registry`
pub fn spawn_distribution(
    store: ReportStore,
    registry: ClientRegistry,
    poll_interval: Duration,
) -> (JoinHandle<()>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(16);
    let watcher = ChangeWatcher::new(store, poll_interval);
    let dispatcher = Dispatcher::new(registry);
    (
        tokio::spawn(watcher.run(tx)),
        tokio::spawn(dispatcher.run(rx)),
    )
}

/// Runs the whole distribution side: watcher, dispatcher and gateway
pub async fn serve(config: &GatewayConfig) -> Result<()> {
    let registry = ClientRegistry::new();
    let store = ReportStore::new(&config.report_path);

    let gateway = Gateway::bind(
        &config.bind,
        GatewayState {
            registry: registry.clone(),
            store: store.clone(),
        },
    )
    .await?;

    let (watcher, dispatcher) = spawn_distribution(
        store,
        registry,
        Duration::from_millis(config.poll_interval_ms),
    );

    let result = gateway.serve().await;
    watcher.abort();
    dispatcher.abort();
    result
}
