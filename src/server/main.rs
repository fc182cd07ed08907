use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use certsync::config::CertsyncConfig;
use certsync::manager::DataManager;
use certsync::server::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = CertsyncConfig::init()?;

    // Prefer the remote gateway; fall back to the local cache when the
    // database is unreachable so the storefront keeps serving known data.
    let manager = match DataManager::open_with_gateway(&config).await {
        Ok(manager) => manager,
        Err(e) => {
            warn!(error = %e, "Gateway unavailable; starting in local-only mode");
            DataManager::open(&config)?
        }
    };

    let state = AppState {
        manager: Arc::new(manager),
    };
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
