//! Persistent application configuration
//!
//! Stores the accuracy preset, flush tuning, and data directory in a JSON
//! file at `<data_dir>/geotrack/config.json`. Missing fields fall back to
//! defaults so old config files keep loading after upgrades.

use crate::track::engine::FlushPolicy;
use crate::{DEFAULT_FLUSH_INTERVAL_MS, DEFAULT_FLUSH_POINTS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Location accuracy presets, trading precision against battery use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccuracyPreset {
    /// Coarse fixes every 10s with 50m minimum movement
    Battery,
    /// High-accuracy fixes every 5s with 20m minimum movement
    Balanced,
    /// High-accuracy fixes every second with 5m minimum movement
    Accuracy,
}

/// Parameters handed to the platform location source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LocationRequest {
    /// Request the high-accuracy (GPS) provider
    pub high_accuracy: bool,
    /// Minimum movement between reported fixes, meters
    pub distance_filter_m: u32,
    /// Desired reporting interval, milliseconds
    pub interval_ms: u64,
}

impl AccuracyPreset {
    /// The location request parameters for this preset
    pub fn request(&self) -> LocationRequest {
        match self {
            AccuracyPreset::Battery => LocationRequest {
                high_accuracy: false,
                distance_filter_m: 50,
                interval_ms: 10_000,
            },
            AccuracyPreset::Balanced => LocationRequest {
                high_accuracy: true,
                distance_filter_m: 20,
                interval_ms: 5_000,
            },
            AccuracyPreset::Accuracy => LocationRequest {
                high_accuracy: true,
                distance_filter_m: 5,
                interval_ms: 1_000,
            },
        }
    }
}

fn default_accuracy() -> AccuracyPreset {
    AccuracyPreset::Balanced
}

fn default_flush_points() -> usize {
    DEFAULT_FLUSH_POINTS
}

fn default_flush_interval_ms() -> i64 {
    DEFAULT_FLUSH_INTERVAL_MS
}

/// Persistent application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Selected accuracy preset
    #[serde(default = "default_accuracy")]
    pub accuracy: AccuracyPreset,
    /// Unflushed points that force a persistence flush
    #[serde(default = "default_flush_points")]
    pub flush_points: usize,
    /// Maximum milliseconds between persistence flushes
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: i64,
    /// Session store directory (None = default under the data dir)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            accuracy: default_accuracy(),
            flush_points: default_flush_points(),
            flush_interval_ms: default_flush_interval_ms(),
            data_dir: None,
        }
    }
}

impl TrackerConfig {
    /// Config file path: `<data_dir>/geotrack/config.json`
    pub fn path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("geotrack")
            .join("config.json")
    }

    /// Load config from disk, falling back to defaults on any error
    pub fn load() -> Self {
        let path = Self::path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded config from disk");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }

    /// Directory for the session store
    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("geotrack")
                .join("sessions")
        })
    }

    /// The flush policy implied by this config
    pub fn flush_policy(&self) -> FlushPolicy {
        FlushPolicy {
            max_unflushed_points: self.flush_points,
            max_interval_ms: self.flush_interval_ms,
        }
    }
}
