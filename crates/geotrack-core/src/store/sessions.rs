//! Durable key-value session store
//!
//! One JSON file per session in a flat directory, named by the session id
//! (`session_<startTime>.json`). Writes go through a temp file followed by a
//! rename so a reader observes either the old or the new record, never a
//! torn one. Records that fail to deserialize are reported as corrupt and
//! skipped; a listing never aborts because of a single bad entry.

use crate::track::session::Session;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from the session store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt session record {key}: {source}")]
    Corrupt {
        key: String,
        source: serde_json::Error,
    },
}

/// Durable store for session records
#[derive(Debug)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Open (creating if needed) a store rooted at the given directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory holding the session records
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Upsert a session record, overwriting any prior flush of the same key
    ///
    /// Atomic with respect to the key: the record is written to a temp file
    /// and renamed into place.
    pub fn put(&self, session: &Session) -> Result<(), StoreError> {
        let path = self.path_for(session.start_time);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(session)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        Ok(())
    }

    /// Fetch a session by its start time, `None` when absent
    pub fn get(&self, start_time: i64) -> Result<Option<Session>, StoreError> {
        let path = self.path_for(start_time);
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let session = serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
            key: format!("session_{start_time}"),
            source,
        })?;
        Ok(Some(session))
    }

    /// List all stored sessions, most recent first
    ///
    /// Corrupt records are logged and excluded; the listing itself still
    /// succeeds.
    pub fn list_all(&self) -> Result<Vec<Session>, StoreError> {
        let mut sessions = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !stem.starts_with("session_") || path.extension().map(|e| e != "json").unwrap_or(true)
            {
                continue;
            }

            let contents = match fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read session record, skipping");
                    continue;
                }
            };

            match serde_json::from_str::<Session>(&contents) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Corrupt session record, excluded from listing"
                    );
                }
            }
        }

        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(sessions)
    }

    /// Close sessions left open by an interrupted process
    ///
    /// A record without an end time means the process died while tracking.
    /// Such sessions are closed at their last point's timestamp (or the
    /// start time if no point was ever recorded) and rewritten. Returns the
    /// number of recovered records.
    pub fn recover_interrupted(&self) -> Result<usize, StoreError> {
        let mut recovered = 0;

        for mut session in self.list_all()? {
            if !session.is_open() {
                continue;
            }
            let close_at = session
                .last_point()
                .map(|p| p.timestamp_millis)
                .unwrap_or(session.start_time);
            session.end_time = Some(close_at);
            self.put(&session)?;

            tracing::info!(
                session = %session.id(),
                closed_at = close_at,
                "Recovered interrupted session"
            );
            recovered += 1;
        }

        Ok(recovered)
    }

    fn path_for(&self, start_time: i64) -> PathBuf {
        self.dir.join(format!("session_{start_time}.json"))
    }
}
