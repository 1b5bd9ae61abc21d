//! Control-message intake and execution.
//!
//! The decision engine publishes [`ControlMessage`]s on a channel; the
//! control loop drains it once per tick, keeps the newest message, and
//! reapplies the last known instruction when the channel is quiet. The
//! hazard latch overrides everything.

use crate::actuator::hazard::HazardGate;
use crate::actuator::valve::{ValveController, ValveStatus};
use crate::actuator::work_log::WorkLog;
use crate::config::ControlConfig;
use crate::marker::MarkerStore;
use crate::types::{ControlMessage, CoolingState, DutyParameters};
use log::info;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Silence longer than this many publish intervals raises a work-log error.
const STALE_INTERVALS: u32 = 3;

pub struct ControlHandle {
    interval: Duration,
    rx: Receiver<ControlMessage>,
    valve: Arc<ValveController>,
    markers: Arc<dyn MarkerStore>,
    work_log: WorkLog,
    gate: HazardGate,
    last_message: ControlMessage,
    receive_time: Instant,
    receive_count: u64,
}

impl ControlHandle {
    pub fn new(
        config: &ControlConfig,
        rx: Receiver<ControlMessage>,
        valve: Arc<ValveController>,
        markers: Arc<dyn MarkerStore>,
        work_log: WorkLog,
    ) -> Self {
        Self {
            interval: Duration::from_secs_f64(config.interval_sec),
            rx,
            valve,
            markers,
            work_log,
            gate: HazardGate::new(),
            last_message: ControlMessage::initial(),
            receive_time: Instant::now(),
            receive_count: 0,
        }
    }

    /// Drain the channel and return the instruction to apply this tick.
    pub fn poll_message(&mut self) -> ControlMessage {
        let mut newest = None;
        while let Ok(message) = self.rx.try_recv() {
            info!("Receive: {message:?}");
            self.receive_time = Instant::now();
            self.receive_count += 1;
            newest = Some(message);
        }

        let Some(message) = newest else {
            if self.receive_time.elapsed() > self.interval * STALE_INTERVALS {
                self.work_log.error("cooling instructions are not arriving");
            }
            return self.last_message.clone();
        };

        if message.mode_index != self.last_message.mode_index {
            let before = if self.last_message.mode_index == -1 {
                "init".to_string()
            } else {
                self.last_message.mode_index.to_string()
            };
            self.work_log.info(&format!(
                "cooling mode changed ({before} -> {after})",
                after = message.mode_index
            ));
        }

        self.last_message = message.clone();
        message
    }

    /// Apply an instruction, with the hazard latch taking precedence.
    pub fn execute(&mut self, message: &ControlMessage) -> ValveStatus {
        let effective = if self
            .gate
            .check(self.markers.as_ref(), &self.work_log, &self.valve)
        {
            ControlMessage {
                state: CoolingState::Idle,
                mode_index: 0,
                duty: DutyParameters::default(),
            }
        } else {
            message.clone()
        };

        self.valve.set_cooling_state(&effective)
    }

    /// One control tick.
    pub fn tick(&mut self) -> ValveStatus {
        let message = self.poll_message();
        self.execute(&message)
    }

    pub fn receive_count(&self) -> u64 {
        self.receive_count
    }
}
