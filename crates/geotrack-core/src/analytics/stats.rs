//! Derived session statistics
//!
//! Pure read path: statistics are recomputed from the stored record, never
//! from live engine state. Top speed re-walks the path pairwise, which also
//! serves as an offline cross-check of the incrementally accumulated
//! distance.

use crate::geo;
use crate::track::session::Session;
use serde::Serialize;

/// Meters-per-second to kilometers-per-hour
const MS_TO_KMH: f64 = 3.6;

/// Statistics derived from a stored session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    /// Accumulated path distance in meters
    pub total_distance_m: f64,
    /// Session duration in milliseconds
    pub duration_ms: i64,
    /// Average speed over the whole session in km/h
    pub avg_speed_kmh: f64,
    /// Fastest single segment in km/h
    pub top_speed_kmh: f64,
}

/// Compute statistics for a session, `None` with fewer than 2 points
///
/// Segments with a zero or negative time delta are non-informative and are
/// skipped rather than dividing by zero.
pub fn compute_stats(session: &Session) -> Option<SessionStats> {
    if session.points.len() < 2 {
        return None;
    }

    let duration_ms = session.duration_millis();
    let duration_s = duration_ms as f64 / 1000.0;
    let avg_speed_kmh = if duration_s > 0.0 {
        session.distance / duration_s * MS_TO_KMH
    } else {
        0.0
    };

    let mut top_speed_kmh: f64 = 0.0;
    for pair in session.points.windows(2) {
        let dt_s = (pair[1].timestamp_millis - pair[0].timestamp_millis) as f64 / 1000.0;
        if dt_s <= 0.0 {
            continue;
        }
        let speed = geo::distance_meters(&pair[0], &pair[1]) / dt_s * MS_TO_KMH;
        top_speed_kmh = top_speed_kmh.max(speed);
    }

    Some(SessionStats {
        total_distance_m: session.distance,
        duration_ms,
        avg_speed_kmh,
        top_speed_kmh,
    })
}
