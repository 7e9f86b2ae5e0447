//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;

use axum::routing::get;
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::{admission_middleware, GateState};
use crate::error::{Result, SluiceError};

/// Build the router with every route behind the admission middleware.
pub fn router(state: GateState) -> Router {
    Router::new()
        .route("/", get(root))
        .layer(middleware::from_fn_with_state(state, admission_middleware))
}

async fn root() -> &'static str {
    "Rate limiter!"
}

/// HTTP server fronted by the admission gate.
pub struct HttpServer {
    /// Bound listener
    listener: TcpListener,
    /// Middleware state
    state: GateState,
}

impl HttpServer {
    /// Bind the listen address.
    pub async fn bind(addr: SocketAddr, state: GateState) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!(addr = %addr, error = %e, "Failed to bind HTTP listener");
            SluiceError::Io(e)
        })?;
        Ok(Self { listener, state })
    }

    /// The address actually bound, useful when binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the provided signal resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(addr = %self.local_addr()?, "Starting HTTP server with graceful shutdown");

        let app = router(self.state).into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(self.listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                SluiceError::Io(e)
            })
    }
}
