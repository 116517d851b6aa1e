//! Tracking session state machine
//!
//! The engine is the single writer of the open session: fixes delivered by
//! the location source are queued on a bounded crossbeam channel and applied
//! in arrival order by [`pump`](TrackingEngine::pump), which the owning
//! thread calls periodically. Distance accumulation is incremental — O(1)
//! per fix, never recomputed from the full path.
//!
//! ## Flush policy
//!
//! The in-progress session is persisted when unflushed points reach a
//! threshold or a time interval has elapsed since the last flush, whichever
//! comes first, and unconditionally on stop. This bounds both data loss on
//! abrupt termination and store write frequency under dense fix streams.
//! A failed flush is logged and retried on the next trigger.

use crate::format::{format_distance, format_elapsed};
use crate::geo;
use crate::store::sessions::SessionStore;
use crate::track::session::{Fix, Session};
use crate::track::source::{FixEvent, LocationSource, PermissionAuthority, Subscription};
use crate::{DEFAULT_FLUSH_INTERVAL_MS, DEFAULT_FLUSH_POINTS};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Capacity of the queue between the fix handler and `pump`
const FIX_QUEUE_CAPACITY: usize = 256;

/// Errors surfaced by the engine state machine
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EngineError {
    #[error("Background location permission not granted")]
    PermissionDenied,

    #[error("A tracking session is already active")]
    AlreadyTracking,

    #[error("No active tracking session")]
    NoActiveSession,
}

/// Engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No open session
    Idle,
    /// One open session being appended to
    Active,
}

/// When to persist the in-progress session
#[derive(Debug, Clone, Copy)]
pub struct FlushPolicy {
    /// Unflushed points that force a flush
    pub max_unflushed_points: usize,
    /// Maximum milliseconds between flushes
    pub max_interval_ms: i64,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            max_unflushed_points: DEFAULT_FLUSH_POINTS,
            max_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
        }
    }
}

impl FlushPolicy {
    /// True when either the point threshold or the time interval is reached
    pub fn should_flush(&self, unflushed_points: usize, now_ms: i64, last_flush_ms: i64) -> bool {
        unflushed_points >= self.max_unflushed_points
            || now_ms - last_flush_ms >= self.max_interval_ms
    }
}

/// Read-only projection of the live session, safe to poll from the UI
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackingStatus {
    /// True while a session is open
    pub is_active: bool,
    /// Milliseconds since the session started, 0 when idle
    pub elapsed_millis: i64,
    /// Accumulated distance in meters, 0 when idle
    pub distance_meters: f64,
    /// Recorded points so far, 0 when idle
    pub point_count: usize,
}

/// The tracking session engine
///
/// One instance per process owns the open session's in-memory state; the
/// [`SessionStore`] owns the durable copy. Constructed Idle; `start` and
/// `stop` drive the two-state machine.
pub struct TrackingEngine {
    store: Arc<SessionStore>,
    permissions: Box<dyn PermissionAuthority>,
    policy: FlushPolicy,
    session: Option<Session>,
    subscription: Option<Subscription>,
    fix_rx: Option<crossbeam_channel::Receiver<FixEvent>>,
    unflushed: usize,
    last_flush_ms: i64,
    status_line: Option<String>,
}

impl TrackingEngine {
    /// Create an idle engine writing to the given store
    pub fn new(store: Arc<SessionStore>, permissions: Box<dyn PermissionAuthority>) -> Self {
        Self::with_policy(store, permissions, FlushPolicy::default())
    }

    /// Create an idle engine with an explicit flush policy
    pub fn with_policy(
        store: Arc<SessionStore>,
        permissions: Box<dyn PermissionAuthority>,
        policy: FlushPolicy,
    ) -> Self {
        Self {
            store,
            permissions,
            policy,
            session: None,
            subscription: None,
            fix_rx: None,
            unflushed: 0,
            last_flush_ms: 0,
            status_line: None,
        }
    }

    /// Current engine state
    pub fn state(&self) -> EngineState {
        if self.session.is_some() {
            EngineState::Active
        } else {
            EngineState::Idle
        }
    }

    /// Start a new tracking session, subscribing to the location source
    ///
    /// Fails with [`EngineError::PermissionDenied`] when background location
    /// access has not been granted, and with [`EngineError::AlreadyTracking`]
    /// when a session is already open (the open session is left untouched).
    pub fn start(&mut self, source: &mut dyn LocationSource) -> Result<(), EngineError> {
        if self.session.is_some() {
            return Err(EngineError::AlreadyTracking);
        }
        if !self.permissions.background_location_granted() {
            return Err(EngineError::PermissionDenied);
        }

        let now = now_millis();
        let mut session = Session::new(now);

        // Seed the path with the best-known location so the session is never
        // empty while we wait for the first live fix
        if let Some(seed) = source.last_known() {
            session.points.push(seed);
        }

        let (tx, rx) = crossbeam_channel::bounded::<FixEvent>(FIX_QUEUE_CAPACITY);
        let subscription = source.watch(Box::new(move |event| {
            if tx.try_send(event).is_err() {
                tracing::warn!("Fix queue full, dropping event");
            }
        }));

        self.session = Some(session);
        self.subscription = Some(subscription);
        self.fix_rx = Some(rx);
        self.unflushed = 0;
        self.last_flush_ms = now;
        self.status_line = Some(self.summary(now));

        tracing::info!(start_time = now, "Tracking session started");
        Ok(())
    }

    /// Apply one location fix to the open session
    ///
    /// Appends the fix in arrival order, extends the accumulated distance by
    /// the haversine distance from the previous point, and runs the flush
    /// policy. No outlier filtering is applied: backward jumps and GPS noise
    /// accumulate as reported.
    pub fn on_fix(&mut self, fix: Fix) -> Result<(), EngineError> {
        let session = self.session.as_mut().ok_or(EngineError::NoActiveSession)?;

        if let Some(last) = session.points.last() {
            session.distance += geo::distance_meters(last, &fix);
        }
        session.points.push(fix);
        self.unflushed += 1;

        self.maybe_flush(now_millis());
        Ok(())
    }

    /// Drain queued stream events and apply them in arrival order
    ///
    /// Call periodically from the thread that owns the engine. Source errors
    /// are logged and tracking continues; fixes that arrive after `stop`
    /// (the unsubscribe race) are ignored once the state is Idle.
    pub fn pump(&mut self) {
        let Some(rx) = self.fix_rx.clone() else {
            return;
        };

        while let Ok(event) = rx.try_recv() {
            match event {
                FixEvent::Fix(fix) => {
                    if self.session.is_some() {
                        // Cannot fail while a session is open
                        let _ = self.on_fix(fix);
                    } else {
                        tracing::debug!(
                            timestamp = fix.timestamp_millis,
                            "Ignoring fix delivered after stop"
                        );
                    }
                }
                FixEvent::Error(msg) => {
                    tracing::warn!(error = %msg, "Location source error, tracking continues");
                }
            }
        }
    }

    /// Time-based flush trigger for quiet streams
    ///
    /// Call periodically alongside [`pump`](Self::pump); flushes when the
    /// interval has elapsed since the last flush even with no new fixes.
    pub fn flush_tick(&mut self) {
        if self.session.is_none() {
            return;
        }
        self.maybe_flush(now_millis());
    }

    /// Stop the open session, returning the finalized record
    ///
    /// Unsubscribes from the location source as its first action, applies
    /// fixes already queued, then finalizes and force-flushes the session.
    /// Fails with [`EngineError::NoActiveSession`] when idle — stopping
    /// twice is a caller bug that must be surfaced, not swallowed.
    pub fn stop(&mut self) -> Result<Session, EngineError> {
        if self.session.is_none() {
            return Err(EngineError::NoActiveSession);
        }

        // Unsubscribe before finalizing so no fix lands mid-stop
        if let Some(mut sub) = self.subscription.take() {
            sub.cancel();
        }

        // Fixes delivered before the logical stop still belong to the session
        self.pump();

        let mut session = match self.session.take() {
            Some(s) => s,
            None => return Err(EngineError::NoActiveSession),
        };

        let now = now_millis();
        let last_point_ts = session
            .last_point()
            .map(|p| p.timestamp_millis)
            .unwrap_or(session.start_time);
        session.end_time = Some(now.max(last_point_ts));

        // Forced flush, bypassing the policy. A failure here is logged; the
        // finalized record is still returned to the caller.
        if let Err(e) = self.store.put(&session) {
            tracing::error!(error = %e, session = %session.id(), "Failed to persist finalized session");
        }

        self.unflushed = 0;
        self.status_line = None;

        tracing::info!(
            session = %session.id(),
            points = session.points.len(),
            distance_m = session.distance,
            "Tracking session stopped"
        );
        Ok(session)
    }

    /// Read-only status projection, callable in either state
    pub fn status(&self) -> TrackingStatus {
        match &self.session {
            Some(s) => TrackingStatus {
                is_active: true,
                elapsed_millis: (now_millis() - s.start_time).max(0),
                distance_meters: s.distance,
                point_count: s.points.len(),
            },
            None => TrackingStatus::default(),
        }
    }

    /// Short summary string for the execution host's notification,
    /// recomputed after each flush trigger; `None` when idle
    pub fn status_line(&self) -> Option<&str> {
        self.status_line.as_deref()
    }

    fn maybe_flush(&mut self, now_ms: i64) {
        if self
            .policy
            .should_flush(self.unflushed, now_ms, self.last_flush_ms)
        {
            self.flush(now_ms);
        }
    }

    /// Persist the open session. On success the counters reset; on failure
    /// they are left so the next trigger retries.
    fn flush(&mut self, now_ms: i64) {
        let Some(session) = self.session.as_ref() else {
            return;
        };

        match self.store.put(session) {
            Ok(()) => {
                tracing::debug!(
                    session = %session.id(),
                    points = session.points.len(),
                    "Flushed in-progress session"
                );
                self.unflushed = 0;
                self.last_flush_ms = now_ms;
                self.status_line = Some(self.summary(now_ms));
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    session = %session.id(),
                    "Failed to flush session, will retry on next trigger"
                );
            }
        }
    }

    fn summary(&self, now_ms: i64) -> String {
        let (elapsed, distance) = match &self.session {
            Some(s) => (now_ms - s.start_time, s.distance),
            None => (0, 0.0),
        };
        format!(
            "Tracking active — {} — {}",
            format_elapsed(elapsed),
            format_distance(distance)
        )
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::source::{ChannelSource, DeniedPermissions, GrantedPermissions};
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    fn engine_with_store(dir: &std::path::Path) -> (TrackingEngine, Arc<SessionStore>) {
        let store = Arc::new(SessionStore::open(dir).unwrap());
        let engine = TrackingEngine::new(Arc::clone(&store), Box::new(GrantedPermissions));
        (engine, store)
    }

    fn fix(lat: f64, lng: f64, ts: i64) -> Fix {
        Fix {
            latitude: lat,
            longitude: lng,
            timestamp_millis: ts,
        }
    }

    #[test]
    fn test_engine_starts_idle() {
        let dir = tempdir().unwrap();
        let (engine, _) = engine_with_store(dir.path());
        assert_eq!(engine.state(), EngineState::Idle);

        let status = engine.status();
        assert!(!status.is_active);
        assert_eq!(status.elapsed_millis, 0);
        assert_eq!(status.distance_meters, 0.0);
        assert_eq!(status.point_count, 0);
        assert!(engine.status_line().is_none());
    }

    #[test]
    fn test_start_requires_permission() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SessionStore::open(dir.path()).unwrap());
        let mut engine = TrackingEngine::new(store, Box::new(DeniedPermissions));

        let (_tx, mut source) = ChannelSource::bounded(8);
        assert_eq!(engine.start(&mut source), Err(EngineError::PermissionDenied));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_start_while_active_leaves_session_untouched() {
        let dir = tempdir().unwrap();
        let (mut engine, _) = engine_with_store(dir.path());
        let (_tx, mut source) = ChannelSource::bounded(8);

        engine.start(&mut source).unwrap();
        engine.on_fix(fix(7.2513, 80.3464, 0)).unwrap();

        let before = engine.status();
        assert_eq!(engine.start(&mut source), Err(EngineError::AlreadyTracking));

        let after = engine.status();
        assert!(after.is_active);
        assert_eq!(after.point_count, before.point_count);
        assert_eq!(after.distance_meters, before.distance_meters);
    }

    #[test]
    fn test_stop_while_idle_fails() {
        let dir = tempdir().unwrap();
        let (mut engine, _) = engine_with_store(dir.path());
        assert_eq!(engine.stop().unwrap_err(), EngineError::NoActiveSession);
    }

    #[test]
    fn test_on_fix_while_idle_fails() {
        let dir = tempdir().unwrap();
        let (mut engine, _) = engine_with_store(dir.path());
        assert_eq!(
            engine.on_fix(fix(7.0, 80.0, 0)).unwrap_err(),
            EngineError::NoActiveSession
        );
    }

    #[test]
    fn test_incremental_distance_accumulation() {
        let dir = tempdir().unwrap();
        let (mut engine, _) = engine_with_store(dir.path());
        let (_tx, mut source) = ChannelSource::bounded(8);

        engine.start(&mut source).unwrap();
        engine.on_fix(fix(7.2513, 80.3464, 0)).unwrap();
        engine.on_fix(fix(7.2520, 80.3464, 5000)).unwrap();

        let status = engine.status();
        assert_eq!(status.point_count, 2);
        assert_relative_eq!(status.distance_meters, 77.8, max_relative = 0.01);
    }

    #[test]
    fn test_distance_matches_pairwise_sum() {
        let dir = tempdir().unwrap();
        let (mut engine, _) = engine_with_store(dir.path());
        let (_tx, mut source) = ChannelSource::bounded(8);

        let fixes: Vec<Fix> = (0..10)
            .map(|i| fix(7.25 + i as f64 * 0.001, 80.34 + i as f64 * 0.0005, i * 1000))
            .collect();

        engine.start(&mut source).unwrap();
        for f in &fixes {
            engine.on_fix(*f).unwrap();
        }

        let expected: f64 = fixes
            .windows(2)
            .map(|w| geo::distance_meters(&w[0], &w[1]))
            .sum();
        assert_relative_eq!(engine.status().distance_meters, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_flush_point_threshold() {
        let dir = tempdir().unwrap();
        let (mut engine, store) = engine_with_store(dir.path());
        let (_tx, mut source) = ChannelSource::bounded(8);

        engine.start(&mut source).unwrap();
        for i in 0..19 {
            engine.on_fix(fix(7.25, 80.34 + i as f64 * 0.0001, i * 1000)).unwrap();
        }
        assert!(store.list_all().unwrap().is_empty(), "19 fixes must not flush");

        engine.on_fix(fix(7.25, 80.34 + 0.0019, 19_000)).unwrap();
        let listed = store.list_all().unwrap();
        assert_eq!(listed.len(), 1, "20th fix triggers exactly one flush");
        assert_eq!(listed[0].points.len(), 20);
        assert!(listed[0].is_open());

        // Counter reset: the next fix must not flush again
        engine.on_fix(fix(7.25, 80.34 + 0.0020, 20_000)).unwrap();
        assert_eq!(store.list_all().unwrap()[0].points.len(), 20);
    }

    #[test]
    fn test_flush_tick_persists_quiet_stream_after_interval() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SessionStore::open(dir.path()).unwrap());
        let policy = FlushPolicy {
            max_unflushed_points: 1000,
            max_interval_ms: 200,
        };
        let mut engine =
            TrackingEngine::with_policy(Arc::clone(&store), Box::new(GrantedPermissions), policy);
        let (_tx, mut source) = ChannelSource::bounded(8);

        engine.start(&mut source).unwrap();
        engine.on_fix(fix(7.25, 80.34, 0)).unwrap();
        assert!(store.list_all().unwrap().is_empty(), "interval not yet elapsed");

        // No new fixes: only the elapsed interval can trigger the flush
        std::thread::sleep(std::time::Duration::from_millis(250));
        engine.flush_tick();

        let listed = store.list_all().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_open());
        assert_eq!(listed[0].points.len(), 1);
    }

    #[test]
    fn test_flush_tick_is_noop_while_idle() {
        let dir = tempdir().unwrap();
        let (mut engine, store) = engine_with_store(dir.path());

        engine.flush_tick();
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_stop_forces_flush_and_finalizes() {
        let dir = tempdir().unwrap();
        let (mut engine, store) = engine_with_store(dir.path());
        let (_tx, mut source) = ChannelSource::bounded(8);

        engine.start(&mut source).unwrap();
        engine.on_fix(fix(7.2513, 80.3464, 0)).unwrap();
        engine.on_fix(fix(7.2520, 80.3464, 5000)).unwrap();

        let session = engine.stop().unwrap();
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(!session.is_open());
        assert!(session.end_time.unwrap() >= session.start_time);
        assert!(session.end_time.unwrap() >= session.points.last().unwrap().timestamp_millis);

        let stored = store.get(session.start_time).unwrap().unwrap();
        assert_eq!(stored, session);
    }

    #[test]
    fn test_late_fix_after_stop_is_ignored() {
        let dir = tempdir().unwrap();
        let (mut engine, _) = engine_with_store(dir.path());
        let (tx, mut source) = ChannelSource::bounded(8);

        engine.start(&mut source).unwrap();
        engine.on_fix(fix(7.25, 80.34, 0)).unwrap();
        engine.stop().unwrap();

        // Simulates the unsubscribe race: an event still reaches the queue
        let _ = tx.try_send(FixEvent::Fix(fix(7.26, 80.35, 1000)));
        std::thread::sleep(std::time::Duration::from_millis(100));
        engine.pump();

        let status = engine.status();
        assert!(!status.is_active);
        assert_eq!(status.point_count, 0);
    }

    #[test]
    fn test_source_error_does_not_abort_tracking() {
        let dir = tempdir().unwrap();
        let (mut engine, _) = engine_with_store(dir.path());
        let (tx, mut source) = ChannelSource::bounded(8);

        engine.start(&mut source).unwrap();
        tx.send(FixEvent::Error("GPS unavailable".into())).unwrap();
        tx.send(FixEvent::Fix(fix(7.25, 80.34, 0))).unwrap();

        // Wait for the forwarder thread to move both events into the queue
        std::thread::sleep(std::time::Duration::from_millis(200));
        engine.pump();

        let status = engine.status();
        assert!(status.is_active);
        assert_eq!(status.point_count, 1);
    }

    #[test]
    fn test_status_line_format() {
        let dir = tempdir().unwrap();
        let (mut engine, _) = engine_with_store(dir.path());
        let (_tx, mut source) = ChannelSource::bounded(8);

        engine.start(&mut source).unwrap();
        let line = engine.status_line().unwrap();
        assert!(line.starts_with("Tracking active — 00:0"));
        assert!(line.ends_with("— 0 m"));
    }

    #[test]
    fn test_policy_point_threshold() {
        let policy = FlushPolicy::default();
        assert!(!policy.should_flush(19, 1000, 0));
        assert!(policy.should_flush(20, 1000, 0));
        assert!(policy.should_flush(25, 1000, 0));
    }

    #[test]
    fn test_policy_interval_threshold() {
        let policy = FlushPolicy::default();
        assert!(!policy.should_flush(0, 29_999, 0));
        assert!(policy.should_flush(0, 30_000, 0));
        assert!(policy.should_flush(3, 90_000, 50_000));
    }
}
