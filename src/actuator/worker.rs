//! Periodic worker loops.
//!
//! Both the control and the monitor loop are plain threads driven by the
//! same runner: tick, log failures without dying, sleep in slices so a
//! shutdown request is honored promptly.

use crate::actuator::control::ControlHandle;
use crate::actuator::monitor::FlowMonitor;
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Run `tick` every `interval` until `shutdown` is raised. A failing tick
/// is logged and the loop carries on; transient bus errors must not kill
/// the rig.
pub fn run_periodic<F>(name: &str, interval: Duration, shutdown: &AtomicBool, mut tick: F)
where
    F: FnMut() -> anyhow::Result<()>,
{
    info!("{name} loop started (interval: {:.1} sec)", interval.as_secs_f64());

    while !shutdown.load(Ordering::Relaxed) {
        let started = Instant::now();

        if let Err(e) = tick() {
            error!("{name} tick failed: {e:#}");
        }

        let elapsed = started.elapsed();
        if elapsed > interval {
            debug!("{name} tick overran its interval ({:.1} sec)", elapsed.as_secs_f64());
        }

        let deadline = started + interval;
        while !shutdown.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }

    info!("{name} loop stopped");
}

/// Control loop body: consume instructions and drive the valve.
pub fn control_loop(handle: &mut ControlHandle, interval: Duration, shutdown: &AtomicBool) {
    run_periodic("control", interval, shutdown, || {
        handle.tick();
        Ok(())
    });
}

/// Monitor loop body: sample the flow and classify hazards.
pub fn monitor_loop(monitor: &mut FlowMonitor, interval: Duration, shutdown: &AtomicBool) {
    run_periodic("monitor", interval, shutdown, || {
        monitor.tick();
        Ok(())
    });
}
