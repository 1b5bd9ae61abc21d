//! Demo daemon: runs the whole controller against the simulated rig.
//!
//! The control loop is fed by a small built-in instruction generator that
//! alternates WORKING and IDLE, so the valve, duty cycle, markers and
//! monitor can all be watched from the log output. Pass a JSON config path
//! to override defaults.

use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use unit_cooler::actuator::control::ControlHandle;
use unit_cooler::actuator::monitor::FlowMonitor;
use unit_cooler::actuator::valve::ValveController;
use unit_cooler::actuator::work_log::{LogOnlySink, WorkLog};
use unit_cooler::actuator::worker;
use unit_cooler::adapters::sim::{SimFlowSensor, SimPin};
use unit_cooler::config::CoolerConfig;
use unit_cooler::marker::{MarkerStore, MemMarkerStore};
use unit_cooler::types::{ControlMessage, CoolingState, DutyParameters};

fn load_config() -> Result<CoolerConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let raw = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))
        }
        None => Ok(CoolerConfig::default()),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    info!("starting simulated rig");

    let markers: Arc<dyn MarkerStore> = Arc::new(MemMarkerStore::new());
    let work_log = WorkLog::new(Arc::new(LogOnlySink));

    let pin = SimPin::new();
    let valve = Arc::new(ValveController::new(
        Box::new(pin.clone()),
        Arc::clone(&markers),
        work_log.clone(),
    ));
    valve.init();

    let monitor_valve = Arc::clone(&valve);
    let sensor = SimFlowSensor::new(pin);

    let (tx, rx) = mpsc::channel::<ControlMessage>();
    let mut control = ControlHandle::new(
        &config.control,
        rx,
        Arc::clone(&valve),
        Arc::clone(&markers),
        work_log.clone(),
    );
    let mut monitor = FlowMonitor::new(
        config.monitor.clone(),
        monitor_valve,
        Box::new(sensor),
        Arc::clone(&markers),
        work_log,
    );

    let shutdown = Arc::new(AtomicBool::new(false));

    // Instruction generator standing in for the decision engine.
    let feeder = {
        let shutdown = Arc::clone(&shutdown);
        thread::spawn(move || {
            let mut working = true;
            while !shutdown.load(Ordering::Relaxed) {
                let message = ControlMessage {
                    state: if working {
                        CoolingState::Working
                    } else {
                        CoolingState::Idle
                    },
                    mode_index: i32::from(working),
                    duty: DutyParameters {
                        enabled: true,
                        on_sec: 2.0,
                        off_sec: 4.0,
                    },
                };
                if tx.send(message).is_err() {
                    break;
                }
                working = !working;
                thread::sleep(Duration::from_secs(10));
            }
        })
    };

    let control_interval = Duration::from_secs(1);
    let monitor_interval = Duration::from_secs_f64(config.monitor.interval_sec.min(2.0));

    thread::scope(|scope| {
        let control_shutdown = Arc::clone(&shutdown);
        scope.spawn(move || {
            worker::control_loop(&mut control, control_interval, &control_shutdown);
        });

        let monitor_shutdown = Arc::clone(&shutdown);
        scope.spawn(move || {
            worker::monitor_loop(&mut monitor, monitor_interval, &monitor_shutdown);
        });

        // Run for a fixed demo window, then stop everything.
        thread::sleep(Duration::from_secs(60));
        shutdown.store(true, Ordering::Relaxed);
    });

    let _ = feeder.join();
    info!("simulated rig stopped");
    Ok(())
}
