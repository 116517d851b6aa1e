//! Geotrack Core - Tracking engine, geodesic math, session store, analytics
//!
//! This library turns a raw stream of GPS location fixes into durable session
//! records: it accumulates the travelled path and distance inside an explicit
//! state machine, persists in-progress sessions with bounded write
//! amplification, and derives statistics and CSV/GPX exports from stored
//! sessions.

pub mod analytics;
pub mod config;
pub mod format;
pub mod geo;
pub mod store;
pub mod track;

pub use store::sessions::SessionStore;
pub use track::engine::TrackingEngine;
pub use track::session::{Fix, Session};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Unflushed points that force a persistence flush
pub const DEFAULT_FLUSH_POINTS: usize = 20;

/// Maximum time between persistence flushes while tracking (milliseconds)
pub const DEFAULT_FLUSH_INTERVAL_MS: i64 = 30_000;
