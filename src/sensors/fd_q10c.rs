//! FD-Q10C clamp-on flow sensor.
//!
//! Typed facade over the IO-Link stack. Every public call takes the
//! cross-process device lock for its whole duration, so concurrent readers
//! on the rig serialize at the bus.

use crate::config::SensorConfig;
use crate::error::{ProtocolError, Result};
use crate::iolink::isdu::{self, DataType, Value};
use crate::iolink::master::Ltc2874;
use crate::lock::DeviceLock;
use crate::ports::{FlowSensorPort, SpiPort, UartPort};
use log::debug;
use std::time::Duration;

/// Vendor product name, used as the liveness probe.
const PARAM_PRODUCT_NAME: u8 = 0x12;
/// Instantaneous flow, raw u16 in units of 0.01 L/min.
const PARAM_FLOW_RATE: u8 = 0x94;

pub struct FdQ10c<S: SpiPort, U: UartPort> {
    master: Ltc2874<S>,
    uart: U,
    lock: DeviceLock,
}

impl<S: SpiPort, U: UartPort> FdQ10c<S, U> {
    pub fn new(spi: S, uart: U, config: &SensorConfig) -> Self {
        Self {
            master: Ltc2874::new(spi, Duration::from_secs_f64(config.power_on_settle_sec)),
            uart,
            lock: DeviceLock::new(
                &config.lock_file,
                Duration::from_secs_f64(config.lock_timeout_sec),
            ),
        }
    }

    /// Read one ISDU parameter under the device lock.
    ///
    /// `Ok(None)` means the sensor was powered down and `force_power_on` was
    /// false: deliberately not an error, the monitor treats it as "sensor
    /// intentionally asleep".
    pub fn read_param(
        &mut self,
        index: u8,
        ty: DataType,
        force_power_on: bool,
    ) -> Result<Option<Value>> {
        let _guard = self.lock.acquire()?;

        if !force_power_on && !self.master.is_powered()? {
            debug!("sensor is powered down, skipping read");
            return Ok(None);
        }

        let mut session = self.master.start_session(&mut self.uart)?;
        let outcome = isdu::read(&mut self.master, session.as_mut(), index, ty);
        let stopped = self.master.stop_session(Some(session), false);

        let value = outcome?;
        stopped?;
        Ok(Some(value))
    }

    /// True iff the device identifies with the expected product prefix.
    ///
    /// Failures propagate instead of reading as "not a flow sensor": a busy
    /// device lock in particular must stay distinguishable from a dead or
    /// foreign device.
    pub fn ping(&mut self) -> Result<bool> {
        match self.read_param(PARAM_PRODUCT_NAME, DataType::String, true)? {
            Some(Value::String(name)) => Ok(name.starts_with("FD-Q")),
            _ => Ok(false),
        }
    }

    /// Flow in L/min rounded to two decimals, or `None` when powered down.
    /// Raw counts are hundredths of a L/min.
    pub fn flow(&mut self, force_power_on: bool) -> Result<Option<f64>> {
        match self.read_param(PARAM_FLOW_RATE, DataType::Uint16, force_power_on)? {
            Some(Value::Uint16(raw)) => Ok(Some((f64::from(raw) * 0.01 * 100.0).round() / 100.0)),
            Some(_) => Err(ProtocolError::Decode("flow parameter decoded as non-u16").into()),
            None => Ok(None),
        }
    }

    /// Supply state without opening a session.
    pub fn powered(&mut self) -> Result<bool> {
        let _guard = self.lock.acquire()?;
        self.master.is_powered()
    }

    /// Disable the line driver and cut the sensor supply.
    pub fn power_off(&mut self) -> Result<()> {
        let _guard = self.lock.acquire()?;
        self.master.stop_session(None, true)
    }
}

impl<S: SpiPort, U: UartPort> FlowSensorPort for FdQ10c<S, U> {
    fn get_value(&mut self, force_power_on: bool) -> Result<Option<f64>> {
        self.flow(force_power_on)
    }

    fn is_powered(&mut self) -> Result<bool> {
        self.powered()
    }

    fn stop(&mut self) -> Result<()> {
        self.power_off()
    }
}
