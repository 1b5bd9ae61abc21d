//! Rig configuration.
//!
//! All tunable parameters for the cooling rig. The crate never loads these
//! itself — the owning process deserializes and injects them (the demo
//! binary reads a JSON file).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level injected configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoolerConfig {
    pub valve: ValveConfig,
    pub sensor: SensorConfig,
    pub monitor: MonitorConfig,
    pub control: ControlConfig,
}

/// Valve output and marker storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValveConfig {
    /// BCM GPIO number of the valve output line.
    pub pin_no: u8,
    /// Root directory of the marker store. Must be shared by every process
    /// instance on the rig; tmpfs keeps the flash alive.
    pub marker_dir: PathBuf,
}

impl Default for ValveConfig {
    fn default() -> Self {
        Self {
            pin_no: 17,
            marker_dir: PathBuf::from("/dev/shm/unit_cooler"),
        }
    }
}

/// Flow-sensor bus access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Cross-process device lock file guarding the bus.
    pub lock_file: PathBuf,
    /// Bound on lock acquisition; failing it is "device busy", not fatal.
    pub lock_timeout_sec: f64,
    /// Settle time after enabling the L1 supply. Empirically several
    /// seconds before the sensor answers — orders of magnitude above the
    /// bus master's documented timeout. Do not shrink without confirming
    /// against hardware.
    pub power_on_settle_sec: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            lock_file: PathBuf::from("/dev/shm/fd_q10c.lock"),
            lock_timeout_sec: 5.0,
            power_on_settle_sec: 5.0,
        }
    }
}

/// Leak/stuck-valve classification thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Open-state flow caps in L/min, one per leak tier. Tier `i` trips when
    /// flow still exceeds `flow_on_max[i]` more than `5·(i+1)` seconds after
    /// the valve opened, so the caps must not increase with the index: a
    /// brief fill transient is normal, sustained high flow is a leak.
    pub flow_on_max: Vec<f64>,
    /// Below this while OPEN for >5 s the main supply is considered shut.
    pub flow_on_min: f64,
    /// Above this while CLOSE for >120 s the valve is considered broken.
    pub flow_off_max: f64,
    /// Closed-for-this-long with zero flow powers the sensor down.
    pub power_off_sec: f64,
    /// Consecutive unknown readings before the flow meter is declared
    /// unusable; at half of it the sensor gets power-cycled.
    pub sense_giveup: u32,
    /// Monitor tick interval.
    pub interval_sec: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            flow_on_max: vec![3.0, 2.0, 1.5],
            flow_on_min: 0.2,
            flow_off_max: 0.01,
            power_off_sec: 600.0,
            sense_giveup: 10,
            interval_sec: 10.0,
        }
    }
}

/// Control-message intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Interval the decision engine publishes at; silence for 3× this long
    /// raises a work-log error.
    pub interval_sec: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self { interval_sec: 60.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = CoolerConfig::default();
        assert!(!c.monitor.flow_on_max.is_empty());
        assert!(c.monitor.flow_on_min > 0.0);
        assert!(c.monitor.flow_off_max < c.monitor.flow_on_min);
        assert!(c.monitor.power_off_sec > 120.0);
        assert!(c.monitor.sense_giveup >= 2);
        assert!(c.sensor.lock_timeout_sec > 0.0);
        assert!(c.control.interval_sec > 0.0);
    }

    #[test]
    fn leak_tiers_do_not_increase() {
        let c = CoolerConfig::default();
        for pair in c.monitor.flow_on_max.windows(2) {
            assert!(
                pair[0] >= pair[1],
                "tier caps must decay as the time budget grows"
            );
        }
    }

    #[test]
    fn serde_roundtrip() {
        let c = CoolerConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let c2: CoolerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c.valve.pin_no, c2.valve.pin_no);
        assert_eq!(c.monitor.flow_on_max, c2.monitor.flow_on_max);
        assert!((c.sensor.power_on_settle_sec - c2.sensor.power_on_settle_sec).abs() < 1e-9);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: CoolerConfig =
            serde_json::from_str(r#"{"valve":{"pin_no":27}}"#).unwrap();
        assert_eq!(c.valve.pin_no, 27);
        assert_eq!(c.monitor.sense_giveup, 10);
        assert_eq!(c.valve.marker_dir, PathBuf::from("/dev/shm/unit_cooler"));
    }
}
