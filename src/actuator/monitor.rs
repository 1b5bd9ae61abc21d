//! Flow monitor: leak, supply-shut and stuck-valve detection.
//!
//! Runs on its own tick, independent of the control loop, so a hazard is
//! caught even while the decision engine is silent.

use crate::actuator::hazard;
use crate::actuator::valve::{ValveController, ValveStatus};
use crate::actuator::work_log::WorkLog;
use crate::config::MonitorConfig;
use crate::marker::MarkerStore;
use crate::ports::FlowSensorPort;
use crate::types::ValveState;
use log::{debug, info, warn};
use std::sync::Arc;

/// Each leak tier `i` is allowed `5 * (i + 1)` seconds of transient flow
/// above its cap before it trips.
const LEAK_TIER_STEP_SEC: f64 = 5.0;
/// Grace before residual flow through a closed valve counts as a fault.
const STUCK_VALVE_GRACE_SEC: f64 = 120.0;

/// One observation: valve status plus the flow reading (if any).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MistCondition {
    pub valve: ValveStatus,
    pub flow: Option<f64>,
}

pub struct FlowMonitor {
    config: MonitorConfig,
    valve: Arc<ValveController>,
    sensor: Box<dyn FlowSensorPort>,
    markers: Arc<dyn MarkerStore>,
    work_log: WorkLog,
    /// Last reading observed; `Some(0.0)` gates off sampling while closed.
    last_flow: Option<f64>,
    /// Consecutive ticks without a usable reading.
    flow_unknown: u32,
    /// Raised once per giveup crossing so the error does not repeat every tick.
    giveup_reported: bool,
    monitor_count: u64,
    /// Ticks between periodic condition log lines (about one per minute).
    log_period: u64,
}

impl FlowMonitor {
    pub fn new(
        config: MonitorConfig,
        valve: Arc<ValveController>,
        sensor: Box<dyn FlowSensorPort>,
        markers: Arc<dyn MarkerStore>,
        work_log: WorkLog,
    ) -> Self {
        let log_period = ((60.0 / config.interval_sec).ceil() as u64).max(1);
        Self {
            config,
            valve,
            sensor,
            markers,
            work_log,
            last_flow: Some(0.0),
            flow_unknown: 0,
            giveup_reported: false,
            monitor_count: 0,
            log_period,
        }
    }

    fn get_flow(&mut self) -> Option<f64> {
        match self.sensor.get_value(true) {
            Ok(flow) => flow,
            Err(e) => {
                warn!("flow read failed: {e}");
                None
            }
        }
    }

    /// Observe the rig.
    ///
    /// While the valve is open the sensor is always read. While it is
    /// closed, sampling continues only until the flow reaches zero; after
    /// that the sensor is left alone (it may be powered down) until the
    /// valve opens again.
    pub fn sample(&mut self) -> MistCondition {
        let status = self.valve.get_status();

        let (valve, flow) = if status.state == ValveState::Open {
            let flow = self.get_flow();
            self.last_flow = flow;
            // Powering the sensor on can take seconds; the valve may have
            // moved meanwhile, so re-read the status.
            (self.valve.get_status(), flow)
        } else if self.last_flow != Some(0.0) {
            let flow = self.get_flow();
            self.last_flow = flow;
            (status, flow)
        } else {
            (status, Some(0.0))
        };

        MistCondition { valve, flow }
    }

    /// One monitor tick: sample, then classify.
    pub fn tick(&mut self) {
        let condition = self.sample();
        self.check(&condition);
    }

    pub fn check(&mut self, condition: &MistCondition) {
        self.monitor_count += 1;

        if (self.monitor_count - 1) % self.log_period == 0 {
            let flow = condition
                .flow
                .map_or_else(|| "?".to_string(), |f| format!("{f:.2}"));
            info!(
                "Valve Condition: {} (flow = {flow} L/min)",
                condition.valve.state
            );
        }

        self.check_sensing(condition);

        if condition.flow.is_some() {
            self.check_mist_condition(condition);
        }
    }

    /// Track reading health: past half the giveup budget the sensor gets
    /// power-cycled, past the full budget it is declared unusable.
    fn check_sensing(&mut self, condition: &MistCondition) {
        if condition.flow.is_none() {
            self.flow_unknown += 1;
        } else {
            self.flow_unknown = 0;
            self.giveup_reported = false;
        }

        if self.flow_unknown > self.config.sense_giveup {
            if !self.giveup_reported {
                self.work_log.error("flow meter is unusable");
                self.giveup_reported = true;
            }
        } else if self.flow_unknown > self.config.sense_giveup / 2 {
            self.work_log
                .warn("flow meter is not responding, resetting it");
            if let Err(e) = self.sensor.stop() {
                warn!("failed to stop flow sensor: {e}");
            }
        }
    }

    fn check_mist_condition(&mut self, condition: &MistCondition) {
        let status = condition.valve;
        let Some(flow) = condition.flow else { return };
        let duration = status.duration.as_secs_f64();

        match status.state {
            ValveState::Open => {
                debug!("valve is open for {duration:.1} sec (flow: {flow:.2} L/min)");

                for (i, cap) in self.config.flow_on_max.iter().enumerate() {
                    let budget = LEAK_TIER_STEP_SEC * (i + 1) as f64;
                    if flow > *cap && duration > budget {
                        hazard::notify(
                            self.markers.as_ref(),
                            &self.work_log,
                            &self.valve,
                            &format!(
                                "water leak detected ({duration:.1} sec after opening \
                                 the flow is still {flow:.1} L/min [> {cap:.1} L/min])"
                            ),
                        );
                    }
                }

                if flow < self.config.flow_on_min && duration > LEAK_TIER_STEP_SEC {
                    // Not a hazard; the rig recovers once the supply opens.
                    self.work_log.error(&format!(
                        "main water supply is shut ({duration:.1} sec after opening \
                         the flow is only {flow:.1} L/min)"
                    ));
                }
            }
            ValveState::Close => {
                debug!("valve is closed for {duration:.1} sec");

                if duration >= self.config.power_off_sec && flow == 0.0 {
                    match self.sensor.is_powered() {
                        Ok(true) => {
                            self.work_log
                                .info("valve has long been closed, powering off the flow meter");
                            if let Err(e) = self.sensor.stop() {
                                warn!("failed to stop flow sensor: {e}");
                            }
                        }
                        Ok(false) => {}
                        Err(e) => warn!("failed to query flow sensor power: {e}"),
                    }
                } else if duration > STUCK_VALVE_GRACE_SEC && flow > self.config.flow_off_max {
                    hazard::notify(
                        self.markers.as_ref(),
                        &self.work_log,
                        &self.valve,
                        &format!(
                            "valve is stuck, stopping control ({duration:.1} sec after \
                             closing the flow is still {flow:.1} L/min)"
                        ),
                    );
                }
            }
        }
    }
}
