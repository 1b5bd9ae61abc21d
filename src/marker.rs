//! Persistent state markers.
//!
//! The valve controller and the hazard monitor keep their long-lived state
//! as marker files: existence is the flag, the file's recorded timestamp is
//! when it was raised. A process restart therefore resumes mid-duty-cycle
//! and keeps a latched hazard latched.

use log::warn;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Keyed timestamp markers. Implementations must tolerate concurrent use
/// from the control and monitor threads.
pub trait MarkerStore: Send + Sync {
    fn exists(&self, key: &str) -> bool;

    /// Raise the marker. A no-op if it is already raised, so the original
    /// timestamp survives repeated calls.
    fn set(&self, key: &str);

    fn clear(&self, key: &str);

    /// Time since the marker was raised, or `None` if it is not raised.
    fn elapsed(&self, key: &str) -> Option<Duration>;
}

// ───────────────────────────────────────────────────────────────
// Filesystem store
// ───────────────────────────────────────────────────────────────

/// Marker files under a root directory (tmpfs on the rig). The key is the
/// relative path; the content is the raise time as epoch seconds.
#[derive(Debug, Clone)]
pub struct FsMarkerStore {
    root: PathBuf,
}

impl FsMarkerStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl MarkerStore for FsMarkerStore {
    fn exists(&self, key: &str) -> bool {
        self.path_of(key).exists()
    }

    fn set(&self, key: &str) {
        let path = self.path_of(key);
        if path.exists() {
            return;
        }

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("failed to create marker dir {}: {e}", parent.display());
                return;
            }
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        if let Err(e) = fs::write(&path, format!("{now}")) {
            warn!("failed to write marker {}: {e}", path.display());
        }
    }

    fn clear(&self, key: &str) {
        let path = self.path_of(key);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove marker {}: {e}", path.display());
            }
        }
    }

    fn elapsed(&self, key: &str) -> Option<Duration> {
        let content = fs::read_to_string(self.path_of(key)).ok()?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();

        // An unparsable marker counts as infinitely old rather than fresh,
        // so a corrupted file cannot mask an overdue condition.
        let raised = content.trim().parse::<f64>().unwrap_or(0.0);
        Some(Duration::from_secs_f64((now - raised).max(0.0)))
    }
}

// ───────────────────────────────────────────────────────────────
// In-memory store
// ───────────────────────────────────────────────────────────────

/// Map-backed store for the simulated rig and tests. [`MemMarkerStore::backdate`]
/// shifts a marker into the past so duration-gated logic can be exercised
/// without sleeping.
#[derive(Debug, Default)]
pub struct MemMarkerStore {
    map: Mutex<HashMap<String, SystemTime>>,
}

impl MemMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backdate(&self, key: &str, by: Duration) {
        let mut map = self.map.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(ts) = map.get_mut(key) {
            *ts -= by;
        }
    }
}

impl MarkerStore for MemMarkerStore {
    fn exists(&self, key: &str) -> bool {
        self.map
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(key)
    }

    fn set(&self, key: &str) {
        self.map
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(key.to_string())
            .or_insert_with(SystemTime::now);
    }

    fn clear(&self, key: &str) {
        self.map
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
    }

    fn elapsed(&self, key: &str) -> Option<Duration> {
        let map = self.map.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let ts = map.get(key)?;
        Some(ts.elapsed().unwrap_or_default())
    }
}
