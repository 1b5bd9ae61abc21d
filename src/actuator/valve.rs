//! Solenoid valve controller with duty-cycle gating.
//!
//! State the duty cycle depends on lives in the marker store, not in memory:
//! which phase the valve is in and for how long is derived from the
//! `valve/open` / `valve/close` marker timestamps. A process restart lands
//! back in the correct phase with the correct remaining time.

use crate::actuator::work_log::WorkLog;
use crate::marker::MarkerStore;
use crate::ports::ValvePin;
use crate::types::{ControlMessage, CoolingState, DutyParameters, ValveState};
use log::{info, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Raised while the cooling state is WORKING; cleared on IDLE.
pub const MARKER_STATE_WORKING: &str = "valve/state/working";
/// Raised while the cooling state is IDLE; cleared on WORKING.
pub const MARKER_STATE_IDLE: &str = "valve/state/idle";
/// Raised when the valve physically opens; cleared when it closes.
pub const MARKER_OPEN: &str = "valve/open";
/// Raised when the valve physically closes; cleared when it opens.
pub const MARKER_CLOSE: &str = "valve/close";

/// Most recent physical transitions retained for diagnostics. The
/// controller duty-cycles indefinitely, so the history must stay bounded.
pub const TRANSITION_HISTORY_LIMIT: usize = 32;

/// Physical valve state plus how long it has been in that state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValveStatus {
    pub state: ValveState,
    pub duration: Duration,
}

struct Inner {
    pin: Box<dyn ValvePin>,
    transitions: VecDeque<ValveState>,
}

pub struct ValveController {
    inner: Mutex<Inner>,
    markers: Arc<dyn MarkerStore>,
    work_log: WorkLog,
}

impl ValveController {
    pub fn new(pin: Box<dyn ValvePin>, markers: Arc<dyn MarkerStore>, work_log: WorkLog) -> Self {
        Self {
            inner: Mutex::new(Inner {
                pin,
                transitions: VecDeque::with_capacity(TRANSITION_HISTORY_LIMIT),
            }),
            markers,
            work_log,
        }
    }

    /// Establish the startup state: cooling IDLE, valve closed. The IDLE
    /// timestamp is refreshed so "idle since" means "since this boot".
    pub fn init(&self) -> ValveStatus {
        self.markers.clear(MARKER_STATE_WORKING);
        self.markers.clear(MARKER_STATE_IDLE);
        self.markers.set(MARKER_STATE_IDLE);

        self.set_state(ValveState::Close)
    }

    /// Drive the valve to `target` and return the resulting status.
    ///
    /// The open/close markers are swapped on the edge only, so their
    /// timestamps measure time in the current physical state.
    pub fn set_state(&self, target: ValveState) -> ValveStatus {
        {
            let mut inner = self
                .inner
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);

            match inner.pin.get() {
                Ok(current) if current != target => {
                    info!("VALVE: {current} -> {target}");
                    if inner.transitions.len() == TRANSITION_HISTORY_LIMIT {
                        inner.transitions.pop_front();
                    }
                    inner.transitions.push_back(current);
                }
                Ok(_) => {}
                Err(e) => warn!("failed to read valve pin: {e}"),
            }

            if let Err(e) = inner.pin.set(target) {
                warn!("failed to drive valve pin: {e}");
            }

            match target {
                ValveState::Open => {
                    self.markers.clear(MARKER_CLOSE);
                    self.markers.set(MARKER_OPEN);
                }
                ValveState::Close => {
                    self.markers.clear(MARKER_OPEN);
                    self.markers.set(MARKER_CLOSE);
                }
            }
        }

        self.get_status()
    }

    /// Physical state and the time spent in it.
    pub fn get_status(&self) -> ValveStatus {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let state = match inner.pin.get() {
            Ok(state) => state,
            Err(e) => {
                warn!("failed to read valve pin: {e}");
                ValveState::Close
            }
        };

        let marker = match state {
            ValveState::Open => MARKER_OPEN,
            ValveState::Close => MARKER_CLOSE,
        };
        let duration = match self.markers.elapsed(marker) {
            Some(duration) => duration,
            None => {
                // CLOSE without a marker happens before the first set_state;
                // OPEN without one means a set_state was bypassed.
                debug_assert_eq!(state, ValveState::Close, "open valve without marker");
                Duration::ZERO
            }
        };

        ValveStatus { state, duration }
    }

    /// Apply the WORKING state, closing the valve during OFF-duty phases.
    pub fn set_cooling_working(&self, duty: &DutyParameters) -> ValveStatus {
        self.markers.clear(MARKER_STATE_IDLE);

        if !self.markers.exists(MARKER_STATE_WORKING) {
            self.markers.set(MARKER_STATE_WORKING);
            self.work_log.info("cooling started");
            info!("COOLING: IDLE -> WORKING");
            return self.set_state(ValveState::Open);
        }

        if !duty.enabled {
            info!("COOLING: WORKING");
            return self.set_state(ValveState::Open);
        }

        let status = self.get_status();
        match status.state {
            ValveState::Open => {
                if status.duration.as_secs_f64() >= duty.on_sec {
                    info!("COOLING: WORKING (OFF duty, {:.0} sec left)", duty.off_sec);
                    self.work_log.info("entering OFF duty, closing the valve");
                    self.set_state(ValveState::Close)
                } else {
                    info!(
                        "COOLING: WORKING (ON duty, {:.0} sec left)",
                        duty.on_sec - status.duration.as_secs_f64()
                    );
                    self.set_state(ValveState::Open)
                }
            }
            ValveState::Close => {
                if status.duration.as_secs_f64() >= duty.off_sec {
                    info!("COOLING: WORKING (ON duty, {:.0} sec left)", duty.on_sec);
                    self.work_log.info("entering ON duty, opening the valve");
                    self.set_state(ValveState::Open)
                } else {
                    info!(
                        "COOLING: WORKING (OFF duty, {:.0} sec left)",
                        duty.off_sec - status.duration.as_secs_f64()
                    );
                    self.set_state(ValveState::Close)
                }
            }
        }
    }

    /// Apply the IDLE state: valve closed, WORKING marker cleared.
    pub fn set_cooling_idle(&self) -> ValveStatus {
        self.markers.clear(MARKER_STATE_WORKING);

        if !self.markers.exists(MARKER_STATE_IDLE) {
            self.markers.set(MARKER_STATE_IDLE);
            self.work_log.info("cooling stopped");
            info!("COOLING: WORKING -> IDLE");
        } else {
            info!("COOLING: IDLE");
        }

        self.set_state(ValveState::Close)
    }

    pub fn set_cooling_state(&self, message: &ControlMessage) -> ValveStatus {
        match message.state {
            CoolingState::Working => self.set_cooling_working(&message.duty),
            CoolingState::Idle => self.set_cooling_idle(),
        }
    }

    /// Recent physical transitions (previous state at each edge), newest
    /// last, capped at [`TRANSITION_HISTORY_LIMIT`].
    pub fn transitions(&self) -> Vec<ValveState> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .transitions
            .iter()
            .copied()
            .collect()
    }
}
