//! Simulated rig.
//!
//! [`SimDevice`] is a behavioral model of the bus master plus an attached
//! FD-Q10C: SPI register writes switch its supply and line driver, and the
//! UART side answers M-sequence frames, echo included. It backs the
//! protocol tests and the demo binary, so the whole stack above the port
//! traits runs unmodified on a development host.

use crate::error::Result;
use crate::iolink::codec::checksum;
use crate::ports::{FlowSensorPort, SpiPort, UartConfig, UartPort, UartSession, ValvePin};
use crate::types::ValveState;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// ───────────────────────────────────────────────────────────────
// Valve pin
// ───────────────────────────────────────────────────────────────

/// Simulated valve output line. Clones share the level.
#[derive(Debug, Clone, Default)]
pub struct SimPin {
    level: Arc<AtomicBool>,
}

impl SimPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }
}

impl ValvePin for SimPin {
    fn set(&mut self, state: ValveState) -> Result<()> {
        self.level.store(state == ValveState::Open, Ordering::SeqCst);
        Ok(())
    }

    fn get(&mut self) -> Result<ValveState> {
        Ok(ValveState::from_level(self.level.load(Ordering::SeqCst)))
    }
}

// ───────────────────────────────────────────────────────────────
// Flow sensor (facade level)
// ───────────────────────────────────────────────────────────────

/// Flow sensor model at the port level: reports flow when the valve is
/// open, remembers whether it has been powered down.
pub struct SimFlowSensor {
    pin: SimPin,
    powered: Arc<AtomicBool>,
    open_flow: f64,
}

impl SimFlowSensor {
    pub fn new(pin: SimPin) -> Self {
        Self {
            pin,
            powered: Arc::new(AtomicBool::new(true)),
            open_flow: 1.23,
        }
    }

    /// Flow reported while the valve is open.
    pub fn set_open_flow(&mut self, flow: f64) {
        self.open_flow = flow;
    }

    pub fn power_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.powered)
    }
}

impl FlowSensorPort for SimFlowSensor {
    fn get_value(&mut self, force_power_on: bool) -> Result<Option<f64>> {
        if force_power_on {
            self.powered.store(true, Ordering::SeqCst);
        }
        if !self.powered.load(Ordering::SeqCst) {
            return Ok(None);
        }

        Ok(Some(if self.pin.is_open() { self.open_flow } else { 0.0 }))
    }

    fn is_powered(&mut self) -> Result<bool> {
        Ok(self.powered.load(Ordering::SeqCst))
    }

    fn stop(&mut self) -> Result<()> {
        self.powered.store(false, Ordering::SeqCst);
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Bus-level device model
// ───────────────────────────────────────────────────────────────

const REG_CTRL: u8 = 0x0D;
const REG_ENL: u8 = 0x0E;

const PARAM_PRODUCT_NAME: u8 = 0x12;
const PARAM_FLOW_RATE: u8 = 0x94;

#[derive(Debug)]
struct DeviceState {
    powered: bool,
    drive_enabled: bool,
    page: HashMap<u8, u8>,
    /// Bytes waiting on the UART rx side (echo plus replies).
    rx: VecDeque<u8>,
    /// Polled-read reply bytes for the ISDU block in flight.
    isdu_reply: VecDeque<u8>,
    /// Request payload bytes accumulated across the three request frames.
    request: Vec<u8>,
    flow_raw: u16,
    product_name: String,
    corrupt_next: bool,
    wait_polls: u32,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            powered: false,
            drive_enabled: false,
            page: HashMap::new(),
            rx: VecDeque::new(),
            isdu_reply: VecDeque::new(),
            request: Vec::new(),
            flow_raw: 0,
            product_name: "FD-Q10C".to_string(),
            corrupt_next: false,
            wait_polls: 0,
        }
    }
}

impl DeviceState {
    fn push_reply(&mut self, value: u8) {
        let mut ck = checksum(&[value]);
        if self.corrupt_next {
            ck ^= 0x01;
            self.corrupt_next = false;
        }
        self.rx.push_back(value);
        self.rx.push_back(ck);
    }

    fn push_ack(&mut self) {
        self.rx.push_back(checksum(&[]));
    }

    /// Assemble the three-frame ISDU read request; on the third frame,
    /// queue the reply block.
    fn isdu_request(&mut self, addr: u8, payload: u8) {
        match addr {
            0x10 => self.request = vec![payload],
            _ => self.request.push(payload),
        }

        if self.request.len() < 3 {
            return;
        }

        let index = self.request[1];
        let valid = self.request[0] ^ index == self.request[2];
        let request_len = self.request[0] & 0x0F;
        self.request.clear();

        self.isdu_reply.clear();
        if !valid {
            self.isdu_reply.push_back(0xC1);
            return;
        }

        match index {
            PARAM_FLOW_RATE => {
                let data = self.flow_raw.to_be_bytes();
                self.queue_short_reply(&data);
            }
            PARAM_PRODUCT_NAME => {
                let data = self.product_name.clone().into_bytes();
                self.queue_extended_reply(&data, request_len);
            }
            _ => {
                self.isdu_reply.push_back(0xC1);
            }
        }
    }

    fn queue_short_reply(&mut self, data: &[u8]) {
        let header = 0xD0 | (data.len() as u8 + 2);
        let ck = data.iter().fold(header, |acc, b| acc ^ b);

        self.isdu_reply.push_back(header);
        self.isdu_reply.extend(data);
        self.isdu_reply.push_back(ck);
    }

    /// Extended-length framing: the block checksum folds in the request
    /// length instead of the size byte.
    fn queue_extended_reply(&mut self, data: &[u8], request_len: u8) {
        let header = 0xD1;
        let size = data.len() as u8 + 3;
        let ck = data.iter().fold(header ^ request_len, |acc, b| acc ^ b);

        self.isdu_reply.push_back(header);
        self.isdu_reply.push_back(size);
        self.isdu_reply.extend(data);
        self.isdu_reply.push_back(ck);
    }

    fn isdu_poll(&mut self) -> u8 {
        if self.wait_polls > 0 && !self.isdu_reply.is_empty() {
            self.wait_polls -= 1;
            return 0x01;
        }
        self.isdu_reply.pop_front().unwrap_or(0x00)
    }

    /// Handle one transmitted frame. The echo has already been queued.
    fn on_frame(&mut self, frame: &[u8]) {
        if !self.powered || frame.len() < 2 {
            return;
        }

        let mc = frame[0];
        let is_read = mc >> 7 == 1;
        let channel = (mc >> 5) & 0x03;
        let addr = mc & 0x1F;

        match (channel, is_read) {
            // Page channel: direct parameters.
            (1, false) => {
                if let Some(value) = frame.get(2) {
                    self.page.insert(addr, *value);
                }
                self.push_ack();
            }
            (1, true) => {
                let value = self.page.get(&addr).copied().unwrap_or(0x00);
                self.push_reply(value);
            }
            // ISDU channel.
            (3, false) => {
                if let Some(payload) = frame.get(2) {
                    self.isdu_request(addr, *payload);
                }
                self.push_ack();
            }
            (3, true) => {
                let value = if addr == 0x10 && !self.isdu_reply.is_empty() {
                    self.isdu_poll()
                } else {
                    self.isdu_reply.pop_front().unwrap_or(0x00)
                };
                self.push_reply(value);
            }
            _ => {}
        }
    }
}

/// Shared handle to the simulated bus master + sensor pair.
#[derive(Clone, Default)]
pub struct SimDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl SimDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spi(&self) -> SimSpi {
        SimSpi {
            state: Arc::clone(&self.state),
        }
    }

    pub fn uart(&self) -> SimUart {
        SimUart {
            state: Arc::clone(&self.state),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DeviceState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn is_powered(&self) -> bool {
        self.lock().powered
    }

    pub fn set_powered(&self, powered: bool) {
        self.lock().powered = powered;
    }

    pub fn set_flow_raw(&self, raw: u16) {
        self.lock().flow_raw = raw;
    }

    /// Corrupt the checksum of the next single-byte reply.
    pub fn corrupt_next_reply(&self) {
        self.lock().corrupt_next = true;
    }

    /// Answer the next `n` ISDU header polls with WAIT.
    pub fn set_wait_polls(&self, n: u32) {
        self.lock().wait_polls = n;
    }
}

/// SPI side of [`SimDevice`].
pub struct SimSpi {
    state: Arc<Mutex<DeviceState>>,
}

impl SpiPort for SimSpi {
    fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut rx = vec![0u8; tx.len()];
        let Some(&cmd) = tx.first() else {
            return Ok(rx);
        };
        let reg = (cmd >> 1) & 0x0F;

        match cmd >> 5 {
            // Write command.
            0b011 => match reg {
                REG_ENL => state.powered = tx.get(1) == Some(&0x11),
                REG_CTRL => {
                    if let Some(&value) = tx.get(1) {
                        // The wakeup pulse is transient; only the drive
                        // enable bit is state.
                        state.drive_enabled = value & 0x01 == 0x01;
                    }
                }
                _ => {}
            },
            // Read command.
            0b000 => {
                let value = match reg {
                    REG_ENL => {
                        if state.powered {
                            0x11
                        } else {
                            0x00
                        }
                    }
                    REG_CTRL => u8::from(state.drive_enabled),
                    _ => 0x00,
                };
                if let Some(slot) = rx.get_mut(1) {
                    *slot = value;
                }
            }
            _ => {}
        }

        Ok(rx)
    }
}

/// UART side of [`SimDevice`].
pub struct SimUart {
    state: Arc<Mutex<DeviceState>>,
}

impl UartPort for SimUart {
    fn open(&mut self, _config: &UartConfig) -> Result<Box<dyn UartSession>> {
        Ok(Box::new(SimUartSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct SimUartSession {
    state: Arc<Mutex<DeviceState>>,
}

impl UartSession for SimUartSession {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Half-duplex line: the transmitted frame echoes back.
        state.rx.extend(bytes);
        state.on_frame(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut n = 0;
        while n < buf.len() {
            let Some(byte) = state.rx.pop_front() else { break };
            buf[n] = byte;
            n += 1;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_pin_levels_are_shared() {
        let mut pin = SimPin::new();
        let observer = pin.clone();

        pin.set(ValveState::Open).unwrap();
        assert!(observer.is_open());
        pin.set(ValveState::Close).unwrap();
        assert!(!observer.is_open());
    }

    #[test]
    fn sim_flow_sensor_follows_the_valve() {
        let mut pin = SimPin::new();
        let mut sensor = SimFlowSensor::new(pin.clone());

        assert_eq!(sensor.get_value(true).unwrap(), Some(0.0));
        pin.set(ValveState::Open).unwrap();
        assert_eq!(sensor.get_value(true).unwrap(), Some(1.23));

        sensor.stop().unwrap();
        assert_eq!(sensor.get_value(false).unwrap(), None);
        assert_eq!(sensor.get_value(true).unwrap(), Some(1.23));
    }

    #[test]
    fn unpowered_device_stays_silent() {
        let dev = SimDevice::new();
        let mut uart = dev.uart();
        let mut session = uart.open(&UartConfig::default()).unwrap();

        session.write_all(&[0xF0, 0x2D]).unwrap();

        // Echo only, no reply.
        let mut buf = [0u8; 8];
        assert_eq!(session.read(&mut buf).unwrap(), 2);
        assert_eq!(session.read(&mut buf).unwrap(), 0);
    }
}
