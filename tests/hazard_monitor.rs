//! Flow-monitor classification: leak tiers, supply-shut, stuck valve,
//! sensor power-down and reading-health tracking.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use unit_cooler::actuator::hazard;
use unit_cooler::actuator::monitor::FlowMonitor;
use unit_cooler::actuator::valve::{ValveController, MARKER_CLOSE, MARKER_OPEN};
use unit_cooler::actuator::work_log::{MemorySink, Severity, WorkLog};
use unit_cooler::adapters::sim::SimPin;
use unit_cooler::config::MonitorConfig;
use unit_cooler::marker::{MarkerStore, MemMarkerStore};
use unit_cooler::ports::FlowSensorPort;
use unit_cooler::types::ValveState;
use unit_cooler::{Error, Result};

/// Sensor that replays a script of readings; the last entry repeats.
struct ScriptedSensor {
    readings: Mutex<VecDeque<Result<Option<f64>>>>,
    last: Mutex<Result<Option<f64>>>,
    reads: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    powered: bool,
}

impl ScriptedSensor {
    fn new(script: Vec<Result<Option<f64>>>) -> Self {
        Self {
            readings: Mutex::new(script.into()),
            last: Mutex::new(Ok(None)),
            reads: Arc::new(AtomicUsize::new(0)),
            stops: Arc::new(AtomicUsize::new(0)),
            powered: true,
        }
    }

    fn counters(&self) -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        (Arc::clone(&self.reads), Arc::clone(&self.stops))
    }
}

impl FlowSensorPort for ScriptedSensor {
    fn get_value(&mut self, _force_power_on: bool) -> Result<Option<f64>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut readings = self.readings.lock().unwrap();
        if let Some(next) = readings.pop_front() {
            *self.last.lock().unwrap() = next.clone();
        }
        self.last.lock().unwrap().clone()
    }

    fn is_powered(&mut self) -> Result<bool> {
        Ok(self.powered)
    }

    fn stop(&mut self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.powered = false;
        Ok(())
    }
}

struct Rig {
    monitor: FlowMonitor,
    valve: Arc<ValveController>,
    markers: Arc<MemMarkerStore>,
    sink: Arc<MemorySink>,
    pin: SimPin,
}

fn rig(script: Vec<Result<Option<f64>>>) -> (Rig, (Arc<AtomicUsize>, Arc<AtomicUsize>)) {
    let markers = Arc::new(MemMarkerStore::new());
    let sink = Arc::new(MemorySink::new());
    let work_log = WorkLog::new(Arc::clone(&sink) as _);
    let pin = SimPin::new();
    let valve = Arc::new(ValveController::new(
        Box::new(pin.clone()),
        Arc::clone(&markers) as Arc<dyn MarkerStore>,
        work_log.clone(),
    ));
    valve.init();

    let sensor = ScriptedSensor::new(script);
    let counters = sensor.counters();
    let monitor = FlowMonitor::new(
        MonitorConfig::default(),
        Arc::clone(&valve),
        Box::new(sensor),
        Arc::clone(&markers) as Arc<dyn MarkerStore>,
        work_log,
    );

    (
        Rig {
            monitor,
            valve,
            markers,
            sink,
            pin,
        },
        counters,
    )
}

#[test]
fn sustained_high_flow_latches_a_leak_hazard() {
    let (mut rig, _) = rig(vec![Ok(Some(3.5))]);
    rig.valve.set_state(ValveState::Open);
    rig.markers.backdate(MARKER_OPEN, Duration::from_secs(20));

    rig.monitor.tick();

    assert!(hazard::is_active(rig.markers.as_ref()));
    assert!(!rig.pin.is_open());
    assert_eq!(rig.sink.count_matching(Severity::Error, "water leak"), 1);

    // Already latched: further ticks keep the valve closed without
    // repeating the work-log error.
    rig.monitor.tick();
    assert_eq!(rig.sink.count_matching(Severity::Error, "water leak"), 1);
}

#[test]
fn transient_fill_flow_is_tolerated() {
    let (mut rig, _) = rig(vec![Ok(Some(3.5))]);
    rig.valve.set_state(ValveState::Open);
    rig.markers.backdate(MARKER_OPEN, Duration::from_secs(2));

    rig.monitor.tick();

    assert!(!hazard::is_active(rig.markers.as_ref()));
    assert!(rig.pin.is_open());
}

#[test]
fn tighter_tiers_catch_smaller_leaks_later() {
    // 1.8 L/min passes tiers 0 and 1 but violates the 1.5 cap once the
    // valve has been open longer than 15 s.
    let (mut rig, _) = rig(vec![Ok(Some(1.8))]);
    rig.valve.set_state(ValveState::Open);
    rig.markers.backdate(MARKER_OPEN, Duration::from_secs(10));

    rig.monitor.tick();
    assert!(!hazard::is_active(rig.markers.as_ref()));

    rig.markers.backdate(MARKER_OPEN, Duration::from_secs(6));
    rig.monitor.tick();
    assert!(hazard::is_active(rig.markers.as_ref()));
}

#[test]
fn low_flow_reports_a_shut_supply_without_latching() {
    let (mut rig, _) = rig(vec![Ok(Some(0.05))]);
    rig.valve.set_state(ValveState::Open);
    rig.markers.backdate(MARKER_OPEN, Duration::from_secs(10));

    rig.monitor.tick();

    assert_eq!(
        rig.sink
            .count_matching(Severity::Error, "main water supply is shut"),
        1
    );
    // Not a hazard: the valve stays under normal control.
    assert!(!hazard::is_active(rig.markers.as_ref()));
    assert!(rig.pin.is_open());
}

#[test]
fn residual_flow_through_a_closed_valve_is_a_stuck_valve() {
    let (mut rig, _) = rig(vec![Ok(Some(0.5))]);
    rig.valve.set_state(ValveState::Open);
    rig.monitor.tick(); // observes flow while open
    rig.valve.set_state(ValveState::Close);
    rig.markers.backdate(MARKER_CLOSE, Duration::from_secs(150));

    // Flow has not drained to zero, so the closed valve is resampled and
    // the residual flow classified.
    rig.monitor.tick();

    assert!(hazard::is_active(rig.markers.as_ref()));
    assert_eq!(rig.sink.count_matching(Severity::Error, "valve is stuck"), 1);
}

#[test]
fn long_closed_valve_powers_the_sensor_off() {
    // First reading drains to zero, then the rig sits closed past the
    // power-off budget.
    let (mut rig, (_, stops)) = rig(vec![Ok(Some(0.0))]);
    rig.markers.backdate(MARKER_CLOSE, Duration::from_secs(700));

    // last_flow starts at zero, so the closed valve is not re-sampled and
    // the cached zero drives the power-off branch.
    rig.monitor.tick();

    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert_eq!(
        rig.sink
            .count_matching(Severity::Info, "powering off the flow meter"),
        1
    );
    assert!(!hazard::is_active(rig.markers.as_ref()));
}

#[test]
fn closed_valve_with_zero_flow_is_not_resampled() {
    let (mut rig, (reads, _)) = rig(vec![Ok(Some(0.0))]);

    rig.monitor.tick();
    rig.monitor.tick();
    rig.monitor.tick();
    assert_eq!(reads.load(Ordering::SeqCst), 0);

    // Opening the valve resumes sampling.
    rig.valve.set_state(ValveState::Open);
    rig.monitor.tick();
    assert_eq!(reads.load(Ordering::SeqCst), 1);
}

#[test]
fn closed_valve_keeps_sampling_until_flow_reaches_zero() {
    let (mut rig, (reads, _)) = rig(vec![Ok(Some(0.8)), Ok(Some(0.3)), Ok(Some(0.0))]);
    rig.valve.set_state(ValveState::Open);
    rig.monitor.tick(); // 0.8, open
    rig.valve.set_state(ValveState::Close);

    rig.monitor.tick(); // 0.3, still draining
    rig.monitor.tick(); // 0.0, sampling stops after this
    rig.monitor.tick();
    rig.monitor.tick();

    assert_eq!(reads.load(Ordering::SeqCst), 3);
}

#[test]
fn unreadable_sensor_is_reset_then_given_up_on() {
    let giveup = MonitorConfig::default().sense_giveup; // 10
    let script = vec![Err(Error::Io("bus fault".to_string()))];
    let (mut rig, (_, stops)) = rig(script);
    rig.valve.set_state(ValveState::Open);

    for _ in 0..giveup {
        rig.monitor.tick();
    }
    // Past half the budget the sensor gets power-cycled, but no giveup yet.
    assert!(stops.load(Ordering::SeqCst) >= 1);
    assert_eq!(rig.sink.count_matching(Severity::Error, "unusable"), 0);
    assert!(
        rig.sink
            .count_matching(Severity::Warn, "not responding")
            >= 1
    );

    rig.monitor.tick();
    assert_eq!(rig.sink.count_matching(Severity::Error, "unusable"), 1);

    // The error does not repeat while the outage continues.
    rig.monitor.tick();
    rig.monitor.tick();
    assert_eq!(rig.sink.count_matching(Severity::Error, "unusable"), 1);
}

#[test]
fn giveup_error_re_arms_after_a_good_reading() {
    let giveup = MonitorConfig::default().sense_giveup;
    let mut script: Vec<Result<Option<f64>>> = Vec::new();
    for _ in 0..=giveup {
        script.push(Err(Error::Io("bus fault".to_string())));
    }
    script.push(Ok(Some(1.0)));
    script.push(Err(Error::Io("bus fault".to_string())));
    let (mut rig, _) = rig(script);
    rig.valve.set_state(ValveState::Open);

    for _ in 0..=giveup {
        rig.monitor.tick();
    }
    assert_eq!(rig.sink.count_matching(Severity::Error, "unusable"), 1);

    // One good reading re-arms the latch...
    rig.monitor.tick();
    // ...so a second outage reports again.
    for _ in 0..=giveup {
        rig.monitor.tick();
    }
    assert_eq!(rig.sink.count_matching(Severity::Error, "unusable"), 2);
}
