//! HTTP listener
//!
//! One task per connection over hyper's HTTP/1 machinery; shutdown is
//! signal-driven and stops accepting while in-flight requests finish on
//! their own tasks.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::router;
use crate::state::AppState;

/// Bind the configured address and serve until `shutdown` resolves
pub async fn run(
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        state.config.server.host, state.config.server.port
    )
    .parse()
    .context("invalid server host/port")?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    serve(state, listener, shutdown).await
}

/// Serve on an already-bound listener (lets tests pick an ephemeral port)
pub async fn serve(
    state: Arc<AppState>,
    listener: TcpListener,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, prefix = %state.config.server.prefix, "API listening");
    }

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("shutdown signal received, closing listener");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };

                let io = TokioIo::new(stream);
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { Ok::<_, hyper::Error>(router::handle(state, peer.ip(), req).await) }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        warn!(peer = %peer, error = %e, "connection error");
                    }
                });
            }
        }
    }
}
