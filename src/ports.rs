//! Port traits — the boundary between the rig's control logic and hardware.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ controller / monitor (domain)
//! ```
//!
//! Driven adapters (the real SPI/UART/GPIO stack, or the simulated rig in
//! [`crate::adapters::sim`]) implement these traits. The selection happens at
//! construction time, never at call time, so the domain code reads the same
//! on the bench and on the rig.

use crate::error::Result;
use crate::types::ValveState;
use std::time::Duration;

// ───────────────────────────────────────────────────────────────
// SPI control bus (bus-master register interface)
// ───────────────────────────────────────────────────────────────

/// Raw full-duplex SPI exchange with the bus-master chip. The command-byte
/// framing lives in [`crate::iolink::master`]; implementations only shift
/// bytes.
pub trait SpiPort: Send {
    /// Clock `tx` out and return the same number of bytes read back.
    fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>>;
}

// ───────────────────────────────────────────────────────────────
// UART (the C/Q line behind the bus master)
// ───────────────────────────────────────────────────────────────

/// Line parameters for the sensor link. The bus master forwards the UART
/// onto the single C/Q wire, which is why transmitted frames echo back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartConfig {
    pub baud: u32,
    pub data_bits: u8,
    pub even_parity: bool,
    pub stop_bits: u8,
    /// Per-read timeout; short, because the framed read loop polls.
    pub read_timeout: Duration,
}

impl Default for UartConfig {
    fn default() -> Self {
        // 38400 8E1 with a 10 ms read timeout, the profile the FD-Q10C talks.
        Self {
            baud: 38_400,
            data_bits: 8,
            even_parity: true,
            stop_bits: 1,
            read_timeout: Duration::from_millis(10),
        }
    }
}

/// An open UART session. Dropping the session closes the port.
pub trait UartSession: Send {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    /// Read up to `buf.len()` bytes; returns 0 on timeout.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Opens UART sessions. One session per bus transaction.
pub trait UartPort: Send {
    fn open(&mut self, config: &UartConfig) -> Result<Box<dyn UartSession>>;
}

// ───────────────────────────────────────────────────────────────
// Valve pin (digital output with readback)
// ───────────────────────────────────────────────────────────────

/// The single digital output line driving the solenoid valve.
/// `get` must report the level actually driven, not a cached copy, because
/// the controller derives all timing from the physical state.
pub trait ValvePin: Send {
    fn set(&mut self, state: ValveState) -> Result<()>;
    fn get(&mut self) -> Result<ValveState>;
}

// ───────────────────────────────────────────────────────────────
// Flow sensor (facade-level port)
// ───────────────────────────────────────────────────────────────

/// Typed flow-sensor API consumed by the monitor. The hardware
/// implementation is [`crate::sensors::FdQ10c`]; the simulated rig provides
/// [`crate::adapters::sim::SimFlowSensor`].
pub trait FlowSensorPort: Send {
    /// Current flow in L/min. `Ok(None)` means the sensor is powered down
    /// and `force_power_on` was false — distinct from a true zero reading.
    fn get_value(&mut self, force_power_on: bool) -> Result<Option<f64>>;

    /// Whether the sensor's bus supply is currently on.
    fn is_powered(&mut self) -> Result<bool>;

    /// Power the sensor down (drive disable + supply off).
    fn stop(&mut self) -> Result<()>;
}
