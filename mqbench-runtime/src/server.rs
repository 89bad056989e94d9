//! Readiness endpoint of a subscriber fleet.
//!
//! Publishers started with `--wait-for` poll it so they only begin once every subscriber is
//! listening.
use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Address Parsing Error")]
    AddrParseError(#[from] std::net::AddrParseError),

    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Shared ready flag, flipped once the fleet has started.
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn set_ready(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub async fn bind(port: u16) -> Result<TcpListener, ServerError> {
    let socket_addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    Ok(TcpListener::bind(socket_addr).await?)
}

pub async fn server_task(listener: TcpListener, ready: Readiness) -> Result<(), ServerError> {
    info!(
        "Exposing ready endpoint on http://{}/.",
        listener.local_addr()?
    );

    debug!("Axum server starting up...");
    axum::serve(listener, router(ready)).await?;

    Ok(())
}

fn router(ready: Readiness) -> Router {
    Router::new()
        .route("/", get(ready_handler))
        .with_state(ready)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

async fn ready_handler(State(ready): State<Readiness>) -> StatusCode {
    if ready.is_ready() {
        info!("Confirming ready status.");
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
