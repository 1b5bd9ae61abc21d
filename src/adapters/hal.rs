//! Hardware adapters: bridge `embedded-hal` and `std::io` devices onto the
//! port traits.

use crate::error::{Error, Result};
use crate::ports::{SpiPort, UartConfig, UartPort, UartSession, ValvePin};
use crate::types::ValveState;
use embedded_hal::digital::StatefulOutputPin;
use embedded_hal::spi::SpiDevice;
use std::io;

/// Valve output on a stateful HAL pin. The readback comes from the pin
/// itself, matching the controller's requirement that `get` reflects the
/// driven level.
pub struct HalPin<P> {
    pin: P,
}

impl<P: StatefulOutputPin + Send> HalPin<P> {
    pub fn new(pin: P) -> Self {
        Self { pin }
    }
}

impl<P: StatefulOutputPin + Send> ValvePin for HalPin<P> {
    fn set(&mut self, state: ValveState) -> Result<()> {
        let result = match state {
            ValveState::Open => self.pin.set_high(),
            ValveState::Close => self.pin.set_low(),
        };
        result.map_err(|e| Error::Io(format!("valve pin: {e:?}")))
    }

    fn get(&mut self) -> Result<ValveState> {
        self.pin
            .is_set_high()
            .map(ValveState::from_level)
            .map_err(|e| Error::Io(format!("valve pin: {e:?}")))
    }
}

/// SPI port on a HAL SPI device (chip select handled by the HAL).
pub struct HalSpi<S> {
    spi: S,
}

impl<S: SpiDevice + Send> HalSpi<S> {
    pub fn new(spi: S) -> Self {
        Self { spi }
    }
}

impl<S: SpiDevice + Send> SpiPort for HalSpi<S> {
    fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>> {
        let mut buf = tx.to_vec();
        self.spi
            .transfer_in_place(&mut buf)
            .map_err(|e| Error::Io(format!("spi transfer: {e:?}")))?;
        Ok(buf)
    }
}

/// UART session over any blocking reader/writer with a read timeout
/// configured out of band (a serial port handle, a pty in tests).
pub struct IoUart<T> {
    inner: T,
}

impl<T: io::Read + io::Write + Send> IoUart<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T: io::Read + io::Write + Send> UartSession for IoUart<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner
            .write_all(bytes)
            .map_err(|e| Error::Io(format!("uart write: {e}")))
    }

    fn flush(&mut self) -> Result<()> {
        self.inner
            .flush()
            .map_err(|e| Error::Io(format!("uart flush: {e}")))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(0)
            }
            Err(e) => Err(Error::Io(format!("uart read: {e}"))),
        }
    }
}

/// Port whose sessions come from a closure, so any serial-port crate can be
/// plugged in by the owning binary without this crate depending on it.
pub struct FnUart<F> {
    open: F,
}

impl<F> FnUart<F>
where
    F: FnMut(&UartConfig) -> Result<Box<dyn UartSession>> + Send,
{
    pub fn new(open: F) -> Self {
        Self { open }
    }
}

impl<F> UartPort for FnUart<F>
where
    F: FnMut(&UartConfig) -> Result<Box<dyn UartSession>> + Send,
{
    fn open(&mut self, config: &UartConfig) -> Result<Box<dyn UartSession>> {
        (self.open)(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::UartPort;

    /// Reader/writer that parrots written bytes back and then times out.
    struct LoopbackPort {
        buffered: Vec<u8>,
    }

    impl io::Read for LoopbackPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.buffered.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "timeout"));
            }
            let n = self.buffered.len().min(buf.len());
            buf[..n].copy_from_slice(&self.buffered[..n]);
            self.buffered.drain(..n);
            Ok(n)
        }
    }

    impl io::Write for LoopbackPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buffered.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn io_uart_maps_timeouts_to_zero_reads() {
        let mut session = IoUart::new(LoopbackPort { buffered: Vec::new() });
        session.write_all(&[0xAA, 0xBB]).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(session.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[0xAA, 0xBB]);
        // Drained: the timeout surfaces as a zero-length read.
        assert_eq!(session.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn fn_uart_opens_through_the_closure() {
        let mut port = FnUart::new(|_config: &UartConfig| {
            Ok(Box::new(IoUart::new(LoopbackPort { buffered: Vec::new() }))
                as Box<dyn UartSession>)
        });

        let mut session = port.open(&UartConfig::default()).unwrap();
        session.write_all(&[0x01]).unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(session.read(&mut buf).unwrap(), 1);
    }
}
