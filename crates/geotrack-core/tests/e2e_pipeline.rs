//! E2E test for the stored-session read path
//!
//! Records a session with the engine, then runs the full offline pipeline
//! over the durable copy: listing, statistics, bounding region, and both
//! export formats.

use geotrack_core::analytics::{export, stats};
use geotrack_core::geo;
use geotrack_core::track::engine::TrackingEngine;
use geotrack_core::track::source::{ChannelSource, GrantedPermissions};
use geotrack_core::{Fix, SessionStore};
use std::sync::Arc;

#[test]
fn test_recorded_session_through_analytics_and_export() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SessionStore::open(dir.path()).unwrap());
    let mut engine = TrackingEngine::new(Arc::clone(&store), Box::new(GrantedPermissions));

    let (_tx, mut source) = ChannelSource::bounded(8);
    engine.start(&mut source).unwrap();
    for (i, lat) in [7.2513, 7.2520, 7.2527, 7.2534].iter().enumerate() {
        engine
            .on_fix(Fix {
                latitude: *lat,
                longitude: 80.3464,
                timestamp_millis: i as i64 * 5_000,
            })
            .unwrap();
    }
    let session = engine.stop().unwrap();

    // Listing surfaces the finalized record
    let listed = store.list_all().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0], session);

    // Stats agree with an offline re-walk of the path
    let computed = stats::compute_stats(&listed[0]).unwrap();
    let rewalked: f64 = listed[0]
        .points
        .windows(2)
        .map(|w| geo::distance_meters(&w[0], &w[1]))
        .sum();
    assert!((computed.total_distance_m - rewalked).abs() < 1e-9);
    assert!(computed.top_speed_kmh > 0.0);

    // Every point appears exactly once in each export, map viewport exists
    let csv = export::to_csv(&listed[0]);
    assert_eq!(csv.lines().count(), 1 + listed[0].points.len());

    let gpx = export::to_gpx(&listed[0]);
    assert_eq!(gpx.matches("<trkpt ").count(), listed[0].points.len());

    let region = geo::bounding_region(&listed[0].points).unwrap();
    assert!(region.latitude_delta > 0.0);
    assert!(region.longitude_delta > 0.0);
}
