//! Geodesic distance and bounding-region math
//!
//! Pure functions over coordinate fixes: great-circle distance via the
//! haversine formula on a spherical Earth model, and map viewport regions
//! for a recorded path. No state, no validation beyond what the formula
//! itself does — NaN inputs propagate to the caller.

use crate::track::session::Fix;
use serde::Serialize;

/// Spherical Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Floor applied to a zero raw delta so a single-point route still yields a
/// non-degenerate viewport
const MIN_REGION_DELTA: f64 = 0.01;

/// Padding factor applied to the raw bounding box extents (50%)
const REGION_PADDING: f64 = 1.5;

/// A map viewport: center coordinate plus latitude/longitude spans
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    /// Center latitude (midpoint of extremes)
    pub latitude: f64,
    /// Center longitude (midpoint of extremes)
    pub longitude: f64,
    /// Latitude span, padded, never zero
    pub latitude_delta: f64,
    /// Longitude span, padded, never zero
    pub longitude_delta: f64,
}

/// Great-circle distance in meters between two fixes (haversine)
///
/// Symmetric in its arguments and exactly zero for coincident points.
/// Timestamps are ignored; only the coordinates participate.
pub fn distance_meters(a: &Fix, b: &Fix) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Bounding region for a coordinate sequence, or `None` when empty
///
/// The raw bounding box is padded by 50% in each dimension. A degenerate
/// span (single point, or all points on one meridian/parallel) gets the
/// 0.01 degree floor instead of a zero delta.
pub fn bounding_region(points: &[Fix]) -> Option<Region> {
    let first = points.first()?;

    let mut min_lat = first.latitude;
    let mut max_lat = first.latitude;
    let mut min_lng = first.longitude;
    let mut max_lng = first.longitude;

    for p in &points[1..] {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    let lat_delta = (max_lat - min_lat) * REGION_PADDING;
    let lng_delta = (max_lng - min_lng) * REGION_PADDING;

    Some(Region {
        latitude: (max_lat + min_lat) / 2.0,
        longitude: (max_lng + min_lng) / 2.0,
        latitude_delta: if lat_delta > 0.0 {
            lat_delta
        } else {
            MIN_REGION_DELTA
        },
        longitude_delta: if lng_delta > 0.0 {
            lng_delta
        } else {
            MIN_REGION_DELTA
        },
    })
}
