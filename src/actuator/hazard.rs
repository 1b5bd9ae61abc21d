//! Hazard latch.
//!
//! A detected leak or a broken valve raises the `hazard` marker. The latch
//! is sticky on purpose: it survives restarts, keeps the valve forced
//! closed, and only an operator clearing the marker re-enables cooling.

use crate::actuator::valve::ValveController;
use crate::actuator::work_log::WorkLog;
use crate::marker::MarkerStore;
use crate::types::ValveState;
use std::time::{Duration, Instant};

pub const MARKER_HAZARD: &str = "hazard";

/// How often an already-latched hazard re-raises its work-log notice.
const RENOTIFY_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Latch the hazard and force the valve closed. The work-log error fires on
/// the raising edge only.
pub fn notify(
    markers: &dyn MarkerStore,
    work_log: &WorkLog,
    valve: &ValveController,
    message: &str,
) {
    if !markers.exists(MARKER_HAZARD) {
        work_log.error(message);
        markers.set(MARKER_HAZARD);
    }

    valve.set_state(ValveState::Close);
}

pub fn is_active(markers: &dyn MarkerStore) -> bool {
    markers.exists(MARKER_HAZARD)
}

/// Operator reset.
pub fn clear(markers: &dyn MarkerStore) {
    markers.clear(MARKER_HAZARD);
}

/// Per-thread view of the latch with a rate limit on repeat notices.
#[derive(Debug, Default)]
pub struct HazardGate {
    last_notice: Option<Instant>,
}

impl HazardGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// If the hazard is latched: force the valve closed, re-raise the
    /// work-log notice at most once per [`RENOTIFY_INTERVAL`], and return
    /// true so the caller suppresses cooling.
    pub fn check(
        &mut self,
        markers: &dyn MarkerStore,
        work_log: &WorkLog,
        valve: &ValveController,
    ) -> bool {
        if !markers.exists(MARKER_HAZARD) {
            return false;
        }

        let due = self
            .last_notice
            .is_none_or(|at| at.elapsed() > RENOTIFY_INTERVAL);
        if due {
            work_log.error("cooling is suspended by a previously detected water leak or valve fault");
            self.last_notice = Some(Instant::now());
        }

        valve.set_state(ValveState::Close);
        true
    }
}
