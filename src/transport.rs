//! Serial transport towards the host.

use std::io::{Read, Write};

use serialport::SerialPort;

use crate::errors::Result;

/// Byte-oriented serial link used by the bridge.
///
/// `read_byte` is only called after `byte_available` returned `true`.
pub trait SerialTransport {
    fn byte_available(&mut self) -> Result<bool>;
    fn read_byte(&mut self) -> Result<u8>;
    /// Write every byte, blocking until the driver has accepted them.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;
}

impl<T: SerialTransport + ?Sized> SerialTransport for &mut T {
    fn byte_available(&mut self) -> Result<bool> {
        (**self).byte_available()
    }

    fn read_byte(&mut self) -> Result<u8> {
        (**self).read_byte()
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_all(bytes)
    }
}

impl SerialTransport for Box<dyn SerialPort> {
    fn byte_available(&mut self) -> Result<bool> {
        Ok(self.bytes_to_read()? > 0)
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        Read::read_exact(self, &mut byte)?;
        Ok(byte[0])
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        Write::write_all(self, bytes)?;
        Write::flush(self)?;
        Ok(())
    }
}
