//! TCP listener

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::session::{Session, SessionOutcome};
use crate::state::AppState;

/// Bind and serve until the process is stopped
pub async fn run(state: Arc<AppState>, bind: &str) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {}", bind))?;
    info!(address = %bind, "Listening for scan requests");
    serve(listener, state).await
}

/// Accept connections, one independent session task per client
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Accept failed");
                continue;
            }
        };
        info!(peer = %peer, "Connection accepted");

        let session = Session::new(stream, state.pipeline.clone(), state.session.clone());
        tokio::spawn(async move {
            match session.run().await {
                Ok(SessionOutcome::Completed { hosts }) => {
                    info!(peer = %peer, hosts = hosts, "Connection closed")
                }
                Ok(outcome) => info!(peer = %peer, outcome = ?outcome, "Connection closed"),
                Err(e) => error!(peer = %peer, error = %e, "Session failed"),
            }
        });
    }
}
