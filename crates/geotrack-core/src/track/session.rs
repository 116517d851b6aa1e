//! Session and fix data model
//!
//! The serialized form is the wire contract the store, export tools, and
//! the API all rely on: camelCase field names, `endTime` omitted while a
//! session is still open.

use serde::{Deserialize, Serialize};

/// A single reported device location with a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fix {
    /// Latitude in degrees, [-90, 90]
    pub latitude: f64,
    /// Longitude in degrees, [-180, 180]
    pub longitude: f64,
    /// Epoch milliseconds at which the fix was reported
    pub timestamp_millis: i64,
}

/// One continuous tracking interval from start to stop
///
/// `start_time` doubles as the unique session identifier. `end_time` is
/// absent while the session is open; `distance` is the incrementally
/// accumulated path length in meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session start, epoch milliseconds; unique id
    pub start_time: i64,
    /// Session end, epoch milliseconds; absent while the session is open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    /// Path points in arrival order
    pub points: Vec<Fix>,
    /// Accumulated path distance in meters
    pub distance: f64,
}

impl Session {
    /// Create an empty open session starting at the given time
    pub fn new(start_time: i64) -> Self {
        Self {
            start_time,
            end_time: None,
            points: Vec::new(),
            distance: 0.0,
        }
    }

    /// Store key / filename stem for this session
    pub fn id(&self) -> String {
        format!("session_{}", self.start_time)
    }

    /// True while the session has not been finalized
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Most recently recorded point, if any
    pub fn last_point(&self) -> Option<&Fix> {
        self.points.last()
    }

    /// Duration in milliseconds: end time (or last point for an open
    /// session) minus start time
    pub fn duration_millis(&self) -> i64 {
        let end = self
            .end_time
            .or_else(|| self.last_point().map(|p| p.timestamp_millis))
            .unwrap_or(self.start_time);
        end - self.start_time
    }
}
