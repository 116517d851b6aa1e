//! Geotrack server entry point
//!
//! Wires the tracking engine, the session store, and the fix intake queue
//! together and serves the REST API.

use geotrack_core::config::TrackerConfig;
use geotrack_core::track::engine::TrackingEngine;
use geotrack_core::track::source::{ChannelSource, GrantedPermissions};
use geotrack_core::SessionStore;
use geotrack_server::{run_pump_loop, AppState, EngineHandle, ServerConfig};
use std::sync::Arc;
use std::time::Duration;

/// How often the engine thread is driven when the fix stream is quiet
const PUMP_PERIOD_MS: u64 = 250;

/// Fix intake queue capacity shared with phone clients posting over HTTP
const FIX_QUEUE_CAPACITY: usize = 256;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("geotrack=debug".parse().unwrap()),
        )
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8930u16);

    let config = TrackerConfig::load();

    let store = match SessionStore::open(config.sessions_dir()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("Failed to open session store: {}", e);
            std::process::exit(1);
        }
    };

    match store.recover_interrupted() {
        Ok(0) => {}
        Ok(n) => tracing::info!(recovered = n, "Closed interrupted sessions"),
        Err(e) => tracing::warn!("Session recovery failed: {}", e),
    }

    let (fix_tx, source) = ChannelSource::bounded(FIX_QUEUE_CAPACITY);
    let engine = TrackingEngine::with_policy(
        Arc::clone(&store),
        Box::new(GrantedPermissions),
        config.flush_policy(),
    );
    let handle = EngineHandle::spawn(engine, source);

    tokio::spawn(run_pump_loop(
        handle.clone(),
        Duration::from_millis(PUMP_PERIOD_MS),
    ));

    let server_config = ServerConfig {
        port,
        bind_addr: "0.0.0.0".to_string(),
    };
    let state = AppState::new(handle, store, fix_tx, server_config);

    tracing::info!(port, "Geotrack server starting");

    if let Err(e) = geotrack_server::start_server(state).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
