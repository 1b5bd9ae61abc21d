//! LTC2874 bus-master driver.
//!
//! The LTC2874 bridges our SPI control bus onto the sensor's single C/Q
//! wire: register writes sequence the L1 power supply and the line driver,
//! and an ordinary UART provides the byte stream. Because the line is
//! half-duplex, everything we transmit echoes straight back — the framed
//! exchange skips its own echo before handing the reply up.

use crate::error::{ProtocolError, Result};
use crate::iolink::codec::{self, Channel, Direction, MSG_TYPE_0};
use crate::ports::{SpiPort, UartConfig, UartPort, UartSession};
use log::{debug, trace};
use std::thread;
use std::time::Duration;

/// Line-driver control register: wakeup pulse and drive enable.
const REG_CTRL: u8 = 0x0D;
/// L1 supply enable register.
const REG_ENL: u8 = 0x0E;

/// L1 on with a 480 µs C/Q overcurrent timeout. Reading this exact value
/// back is the "powered" check.
const PWR_ON: u8 = 0x11;
const PWR_OFF: u8 = 0x00;

const CTRL_WAKEUP: u8 = 0x10;
const CTRL_DRIVE_ENABLE: u8 = 0x01;
const CTRL_DRIVE_DISABLE: u8 = 0x00;

/// SPI command prefixes (bits 7..5 of the first transfer byte).
const SPI_CMD_READ: u8 = 0b000 << 5;
const SPI_CMD_WRITE: u8 = 0b011 << 5;

/// Register-level driver for the bus master. Owns the SPI port; UART
/// sessions are opened per transaction and must be closed on every path via
/// [`Ltc2874::stop_session`].
pub struct Ltc2874<S: SpiPort> {
    spi: S,
    settle: Duration,
}

impl<S: SpiPort> Ltc2874<S> {
    /// `settle` is the wait after enabling the L1 supply before the sensor
    /// answers (configured, deliberately conservative).
    pub fn new(spi: S, settle: Duration) -> Self {
        Self { spi, settle }
    }

    /// Single register read.
    pub fn reg_read(&mut self, reg: u8) -> Result<u8> {
        let recv = self.spi.transfer(&[SPI_CMD_READ | (reg << 1), 0x00])?;
        trace!("SPI READ: {}", dump(&recv));

        recv.get(1).copied().ok_or_else(|| {
            ProtocolError::ShortResponse {
                wanted: 2,
                got: recv.len(),
            }
            .into()
        })
    }

    /// Single register write.
    pub fn reg_write(&mut self, reg: u8, data: u8) -> Result<()> {
        self.spi.transfer(&[SPI_CMD_WRITE | (reg << 1), data])?;
        Ok(())
    }

    /// True iff the L1 supply register reads back the enabled code.
    pub fn is_powered(&mut self) -> Result<bool> {
        Ok(self.reg_read(REG_ENL)? == PWR_ON)
    }

    /// Power the L1 supply on (if needed), wake the line, enable the driver
    /// and open a UART session.
    pub fn start_session(&mut self, uart: &mut dyn UartPort) -> Result<Box<dyn UartSession>> {
        if self.is_powered()? {
            debug!("L1 supply is already on");
        } else {
            debug!("powering on the L1 supply");
            self.reg_write(REG_ENL, PWR_ON)?;
            thread::sleep(self.settle);
        }

        self.reg_write(REG_CTRL, CTRL_WAKEUP)?;
        self.reg_write(REG_CTRL, CTRL_DRIVE_ENABLE)?;

        uart.open(&UartConfig::default())
    }

    /// Close the UART (if a session is handed in), disable the line driver
    /// and optionally cut the L1 supply. Reachable from every error path
    /// that opened a session.
    pub fn stop_session(
        &mut self,
        session: Option<Box<dyn UartSession>>,
        power_off: bool,
    ) -> Result<()> {
        drop(session);

        self.reg_write(REG_CTRL, CTRL_DRIVE_DISABLE)?;

        if power_off {
            debug!("powering off the L1 supply");
            self.reg_write(REG_ENL, PWR_OFF)?;
        }

        Ok(())
    }

    /// Transmit one frame and read back `reply_len` bytes.
    ///
    /// The driver is enabled only around the write; the echo of the
    /// transmitted frame is consumed and discarded before the reply.
    pub fn exchange(
        &mut self,
        session: &mut dyn UartSession,
        tx: &[u8],
        reply_len: usize,
    ) -> Result<Vec<u8>> {
        self.reg_write(REG_CTRL, CTRL_DRIVE_ENABLE)?;

        trace!("COM SEND: {}", dump(tx));
        session.write_all(tx)?;
        session.flush()?;

        self.reg_write(REG_CTRL, CTRL_DRIVE_DISABLE)?;

        let wanted = tx.len() + reply_len;
        let mut buf = vec![0u8; wanted];
        let mut got = 0;
        while got < wanted {
            let n = session.read(&mut buf[got..])?;
            if n == 0 {
                break; // read timeout, nothing more is coming
            }
            got += n;
        }
        trace!("COM RECV: {}", dump(&buf[..got]));

        if got < wanted {
            return Err(ProtocolError::ShortResponse { wanted, got }.into());
        }

        Ok(buf[tx.len()..].to_vec())
    }

    /// Read a single-byte direct parameter at the page channel.
    pub fn dir_param_read(&mut self, session: &mut dyn UartSession, addr: u8) -> Result<u8> {
        debug!("dir_param_read(addr: 0x{addr:02X})");

        let msq = codec::build(Direction::Read, Channel::Page, addr, MSG_TYPE_0, None);
        let reply = self.exchange(session, &msq, 2)?;
        codec::check_reply(&reply)
    }

    /// Write a single-byte direct parameter at the page channel.
    pub fn dir_param_write(
        &mut self,
        session: &mut dyn UartSession,
        addr: u8,
        value: u8,
    ) -> Result<()> {
        debug!("dir_param_write(addr: 0x{addr:02X}, value: 0x{value:02X})");

        let msq = codec::build(Direction::Write, Channel::Page, addr, MSG_TYPE_0, Some(&[value]));
        let reply = self.exchange(session, &msq, 1)?;
        codec::check_ack(&reply)
    }
}

fn dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("0x{b:02X}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sim::SimDevice;
    use std::time::Duration;

    fn master(dev: &SimDevice) -> Ltc2874<crate::adapters::sim::SimSpi> {
        Ltc2874::new(dev.spi(), Duration::ZERO)
    }

    #[test]
    fn power_sequencing_round_trip() {
        let dev = SimDevice::new();
        let mut m = master(&dev);
        let mut uart = dev.uart();

        assert!(!m.is_powered().unwrap());
        let session = m.start_session(&mut uart).unwrap();
        assert!(m.is_powered().unwrap());

        // Plain stop keeps the supply on.
        m.stop_session(Some(session), false).unwrap();
        assert!(m.is_powered().unwrap());

        m.stop_session(None, true).unwrap();
        assert!(!m.is_powered().unwrap());
    }

    #[test]
    fn dir_param_round_trip() {
        let dev = SimDevice::new();
        let mut m = master(&dev);
        let mut uart = dev.uart();

        let mut session = m.start_session(&mut uart).unwrap();
        m.dir_param_write(session.as_mut(), 0x05, 0xA7).unwrap();
        assert_eq!(m.dir_param_read(session.as_mut(), 0x05).unwrap(), 0xA7);
        m.stop_session(Some(session), true).unwrap();
    }

    #[test]
    fn corrupted_reply_is_a_checksum_error() {
        let dev = SimDevice::new();
        let mut m = master(&dev);
        let mut uart = dev.uart();

        let mut session = m.start_session(&mut uart).unwrap();
        m.dir_param_write(session.as_mut(), 0x05, 0x11).unwrap();
        dev.corrupt_next_reply();
        assert!(matches!(
            m.dir_param_read(session.as_mut(), 0x05),
            Err(crate::error::Error::Checksum { .. })
        ));
        m.stop_session(Some(session), true).unwrap();
    }
}
