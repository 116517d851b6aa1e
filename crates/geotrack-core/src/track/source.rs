//! Location source subscription abstraction
//!
//! A location source delivers fix events to a single registered handler
//! until the returned [`Subscription`] is cancelled. [`ChannelSource`] is
//! the concrete source used by the server and tests: fixes pushed into a
//! bounded crossbeam channel are forwarded to the handler by a dedicated
//! thread.

use crate::track::session::Fix;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// An event delivered by a location source
#[derive(Debug, Clone)]
pub enum FixEvent {
    /// A reported device location
    Fix(Fix),
    /// A fix-acquisition error; tracking continues
    Error(String),
}

/// Handler registered with a location source
pub type FixHandler = Box<dyn FnMut(FixEvent) + Send>;

/// A push-based stream of location fixes
///
/// At most one subscription is active at a time; the engine cancels it as
/// the first action of `stop()`.
pub trait LocationSource: Send {
    /// Best-known current location, used to seed a new session
    fn last_known(&self) -> Option<Fix>;

    /// Register a handler and begin delivering fix events to it
    fn watch(&mut self, handler: FixHandler) -> Subscription;
}

/// Handle to an active location watch; cancels on [`cancel`](Self::cancel)
/// or drop
pub struct Subscription {
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Subscription {
    /// Stop delivery and wait for the forwarder thread to finish
    pub fn cancel(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(h) = self.thread.take() {
            let _ = h.join();
        }
    }

    /// Check whether the forwarder thread is still delivering
    pub(crate) fn is_active(&self) -> bool {
        self.thread
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Location source fed by a crossbeam channel
///
/// The producing side (GPS bridge, fix-intake API, test driver) pushes
/// [`FixEvent`]s into the sender returned by [`bounded`](Self::bounded).
pub struct ChannelSource {
    rx: crossbeam_channel::Receiver<FixEvent>,
    last_known: Arc<Mutex<Option<Fix>>>,
}

impl ChannelSource {
    /// Create a source with the given channel capacity, returning the
    /// producer side alongside it
    pub fn bounded(capacity: usize) -> (crossbeam_channel::Sender<FixEvent>, Self) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (
            tx,
            Self {
                rx,
                last_known: Arc::new(Mutex::new(None)),
            },
        )
    }
}

impl LocationSource for ChannelSource {
    fn last_known(&self) -> Option<Fix> {
        self.last_known.lock().ok().and_then(|g| *g)
    }

    fn watch(&mut self, mut handler: FixHandler) -> Subscription {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag_clone = Arc::clone(&stop_flag);
        let rx = self.rx.clone();
        let last_known = Arc::clone(&self.last_known);

        let thread = std::thread::Builder::new()
            .name("fix-forwarder".into())
            .spawn(move || {
                loop {
                    if flag_clone.load(Ordering::Acquire) {
                        break;
                    }
                    match rx.recv_timeout(Duration::from_millis(50)) {
                        Ok(event) => {
                            if let FixEvent::Fix(fix) = &event {
                                if let Ok(mut g) = last_known.lock() {
                                    *g = Some(*fix);
                                }
                            }
                            handler(event);
                        }
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                            tracing::debug!("Fix channel disconnected, forwarder exiting");
                            break;
                        }
                    }
                }
            })
            .expect("Failed to spawn fix forwarder thread");

        Subscription {
            stop_flag,
            thread: Some(thread),
        }
    }
}

/// Boolean authority the engine queries before starting a session
pub trait PermissionAuthority: Send {
    /// True when background location access has been granted
    fn background_location_granted(&self) -> bool;
}

/// Authority that always reports granted; used where the host platform has
/// already settled permissions before the engine runs
pub struct GrantedPermissions;

impl PermissionAuthority for GrantedPermissions {
    fn background_location_granted(&self) -> bool {
        true
    }
}

/// Authority that always reports denied
pub struct DeniedPermissions;

impl PermissionAuthority for DeniedPermissions {
    fn background_location_granted(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn fix(ts: i64) -> Fix {
        Fix {
            latitude: 7.25,
            longitude: 80.34,
            timestamp_millis: ts,
        }
    }

    #[test]
    fn test_channel_source_delivers_in_order() {
        let (tx, mut source) = ChannelSource::bounded(16);
        let (seen_tx, seen_rx) = mpsc::channel();

        let mut sub = source.watch(Box::new(move |event| {
            if let FixEvent::Fix(f) = event {
                let _ = seen_tx.send(f.timestamp_millis);
            }
        }));

        for ts in [1, 2, 3] {
            tx.send(FixEvent::Fix(fix(ts))).unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(seen_rx.recv_timeout(Duration::from_secs(2)).unwrap());
        }
        assert_eq!(seen, vec![1, 2, 3]);

        sub.cancel();
        assert!(!sub.is_active());
    }

    #[test]
    fn test_last_known_tracks_latest_fix() {
        let (tx, mut source) = ChannelSource::bounded(16);
        assert!(source.last_known().is_none());

        let (seen_tx, seen_rx) = mpsc::channel();
        let _sub = source.watch(Box::new(move |_| {
            let _ = seen_tx.send(());
        }));

        tx.send(FixEvent::Fix(fix(42))).unwrap();
        seen_rx.recv_timeout(Duration::from_secs(2)).unwrap();

        assert_eq!(source.last_known().unwrap().timestamp_millis, 42);
    }

    #[test]
    fn test_cancelled_subscription_stops_delivery() {
        let (tx, mut source) = ChannelSource::bounded(16);
        let (seen_tx, seen_rx) = mpsc::channel();

        let mut sub = source.watch(Box::new(move |event| {
            if let FixEvent::Fix(f) = event {
                let _ = seen_tx.send(f.timestamp_millis);
            }
        }));
        sub.cancel();

        // Sent after cancellation: nothing may reach the handler
        let _ = tx.send(FixEvent::Fix(fix(99)));
        assert!(seen_rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_permission_authorities() {
        assert!(GrantedPermissions.background_location_granted());
        assert!(!DeniedPermissions.background_location_granted());
    }
}
