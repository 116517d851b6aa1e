//! Geotrack Server - Axum REST surface for the tracking engine
//!
//! Hosts the engine on a dedicated thread behind a command channel (the
//! engine is the single writer of the open session; every mutation is
//! serialized through this thread) and exposes the status projection,
//! session history, analytics, and export endpoints the device UI polls.

use axum::http::{header, HeaderValue};
use axum::Router;
use geotrack_core::track::engine::{EngineError, TrackingEngine, TrackingStatus};
use geotrack_core::track::source::{ChannelSource, FixEvent};
use geotrack_core::{Session, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

pub mod api;

/// Commands sent to the engine thread
pub enum EngineCommand {
    Start {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Stop {
        reply: oneshot::Sender<Result<Session, EngineError>>,
    },
    Status {
        reply: oneshot::Sender<TrackingStatus>,
    },
    StatusLine {
        reply: oneshot::Sender<Option<String>>,
    },
    /// Drain queued fixes and run the time-based flush trigger
    Pump,
}

/// Handle to communicate with the engine thread
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// Spawn the engine on a dedicated thread and return a handle
    ///
    /// The thread owns both the engine and the location source; `start`
    /// subscribes the engine to the source, `Pump` applies queued fixes.
    pub fn spawn(mut engine: TrackingEngine, mut source: ChannelSource) -> Self {
        let (tx, mut rx) = mpsc::channel::<EngineCommand>(32);

        std::thread::Builder::new()
            .name("tracking-engine".into())
            .spawn(move || {
                while let Some(cmd) = rx.blocking_recv() {
                    match cmd {
                        EngineCommand::Start { reply } => {
                            let _ = reply.send(engine.start(&mut source));
                        }
                        EngineCommand::Stop { reply } => {
                            let _ = reply.send(engine.stop());
                        }
                        EngineCommand::Status { reply } => {
                            let _ = reply.send(engine.status());
                        }
                        EngineCommand::StatusLine { reply } => {
                            let _ = reply.send(engine.status_line().map(|s| s.to_string()));
                        }
                        EngineCommand::Pump => {
                            engine.pump();
                            engine.flush_tick();
                        }
                    }
                }
            })
            .expect("Failed to spawn tracking engine thread");

        Self { tx }
    }

    pub async fn start(&self) -> anyhow::Result<Result<(), EngineError>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Start { reply })
            .await
            .map_err(|_| anyhow::anyhow!("Engine thread died"))?;
        rx.await.map_err(|_| anyhow::anyhow!("Engine thread died"))
    }

    pub async fn stop(&self) -> anyhow::Result<Result<Session, EngineError>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Stop { reply })
            .await
            .map_err(|_| anyhow::anyhow!("Engine thread died"))?;
        rx.await.map_err(|_| anyhow::anyhow!("Engine thread died"))
    }

    pub async fn status(&self) -> anyhow::Result<TrackingStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Status { reply })
            .await
            .map_err(|_| anyhow::anyhow!("Engine thread died"))?;
        rx.await.map_err(|_| anyhow::anyhow!("Engine thread died"))
    }

    pub async fn status_line(&self) -> anyhow::Result<Option<String>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::StatusLine { reply })
            .await
            .map_err(|_| anyhow::anyhow!("Engine thread died"))?;
        rx.await.map_err(|_| anyhow::anyhow!("Engine thread died"))
    }

    /// Ask the engine thread to drain queued fixes; fire-and-forget
    pub async fn pump(&self) {
        let _ = self.tx.send(EngineCommand::Pump).await;
    }
}

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    /// Handle to the engine thread
    pub engine: EngineHandle,
    /// Durable session store (read path for history/analytics endpoints)
    pub store: Arc<SessionStore>,
    /// Producer side of the location source; the fix-intake endpoint
    /// pushes device fixes here
    pub fix_tx: crossbeam_channel::Sender<FixEvent>,
    /// Server configuration
    pub config: ServerConfig,
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind address
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8930,
            bind_addr: "0.0.0.0".to_string(),
        }
    }
}

impl AppState {
    /// Create a new AppState around the engine handle and store
    pub fn new(
        engine: EngineHandle,
        store: Arc<SessionStore>,
        fix_tx: crossbeam_channel::Sender<FixEvent>,
        config: ServerConfig,
    ) -> Self {
        Self {
            engine,
            store,
            fix_tx,
            config,
        }
    }
}

/// Periodically drive the engine thread so queued fixes are applied and the
/// time-based flush trigger fires even on a quiet stream
pub async fn run_pump_loop(engine: EngineHandle, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        engine.pump().await;
    }
}

/// Build the Axum router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", axum::routing::get(api::get_status))
        .route("/api/v1/tracking", axum::routing::post(api::toggle_tracking))
        .route("/api/v1/fix", axum::routing::post(api::post_fix))
        .route("/api/v1/sessions", axum::routing::get(api::list_sessions))
        .route(
            "/api/v1/sessions/{start_time}",
            axum::routing::get(api::get_session),
        )
        .route(
            "/api/v1/sessions/{start_time}/stats",
            axum::routing::get(api::get_session_stats),
        )
        .route(
            "/api/v1/sessions/{start_time}/region",
            axum::routing::get(api::get_session_region),
        )
        .route(
            "/api/v1/sessions/{start_time}/export/csv",
            axum::routing::get(api::export_csv),
        )
        .route(
            "/api/v1/sessions/{start_time}/export/gpx",
            axum::routing::get(api::export_gpx),
        )
        .route("/api/v1/remote-url", axum::routing::get(api::get_remote_url))
        .layer(CorsLayer::permissive())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .with_state(state)
}

/// Start the web server
pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.bind_addr, state.config.port);
    let app = build_router(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Geotrack server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
