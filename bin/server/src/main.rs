//! s83d: Spring '83 board server
//!
//! Stores signed boards in a flat directory and serves them over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (0.0.0.0:8080, ./store, 22 day TTL)
//! s83d
//!
//! # Custom port and store
//! PORT=8383 STORE=/var/lib/s83d s83d
//!
//! # Gate new keys by board count
//! DIFFICULTY=on NUM_BOARDS=1000 s83d
//!
//! # Enable debug logging
//! RUST_LOG=debug s83d
//! ```

mod config;
mod error;
mod handlers;
mod state;
mod test_board;

use config::ServerConfig;
use state::AppState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::args()
        .skip(1)
        .any(|arg| arg == "-h" || arg == "--help")
    {
        config::print_usage();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "s83d=info,spring83=info,tower_http=info".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let state = Arc::new(AppState::from_config(&config)?);
    let app = handlers::router(state);

    let address = config.address();
    let listener = TcpListener::bind(&address).await?;
    info!("{} running on http://{}", config.title, address);
    info!("");
    info!("Endpoints:");
    info!("  GET     /        - Home page");
    info!("  GET     /:key    - Fetch a board (honours If-Modified-Since)");
    info!("  PUT     /:key    - Publish a board (Spring-Signature header)");
    info!("  OPTIONS *        - CORS preflight");

    axum::serve(listener, app).await?;

    Ok(())
}
