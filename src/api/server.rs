//! Server lifecycle: bind, serve, shut down on Ctrl-C.

use std::future::Future;

use crate::api::router::triage_router;
use crate::api::types::ApiContext;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Serve the triage API on `addr` until `shutdown` resolves.
pub async fn serve_until<F>(ctx: ApiContext, addr: &str, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    let local = listener.local_addr()?;
    tracing::info!(addr = %local, "Triage API server started");

    axum::serve(listener, triage_router(ctx))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Triage API server stopped");
    Ok(())
}

/// Serve the triage API on `addr` until Ctrl-C.
pub async fn serve(ctx: ApiContext, addr: &str) -> Result<(), ServerError> {
    serve_until(ctx, addr, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    })
    .await
}
