//! Two-wire bus master interface.
//!
//! The bridge only ever acts as bus master. Drivers implement [`BusMaster`];
//! the bridge calls it in the order `begin_transaction`, `write`,
//! `end_transaction_hold`, then `request` / `read_available`.

use thiserror::Error;

/// Status reported when ending a write transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("write did not fit the driver's transmit buffer")]
    DataTooLong,
    #[error("address not acknowledged")]
    AddressNack,
    #[error("data byte not acknowledged")]
    DataNack,
    #[error("bus timeout")]
    Timeout,
    #[error("bus error (code {0})")]
    Other(u8),
}

/// Bus master driver capability.
///
/// Ending a transaction is split into two named operations: holding the bus
/// (no stop condition, the next read uses a repeated start) and releasing it
/// (stop condition).
pub trait BusMaster {
    /// Start queueing a write to the 7-bit `address`.
    fn begin_transaction(&mut self, address: u8);

    /// Queue bytes for the current transaction, returns how many were accepted.
    fn write(&mut self, bytes: &[u8]) -> usize;

    /// Transmit the queued bytes and keep the bus claimed.
    fn end_transaction_hold(&mut self) -> Result<(), BusError>;

    /// Transmit the queued bytes and issue a stop condition.
    fn end_transaction_release(&mut self) -> Result<(), BusError>;

    /// Read up to `len` bytes from `address` into the driver's receive
    /// buffer. Returns the number of bytes actually received.
    fn request(&mut self, address: u8, len: usize) -> usize;

    /// Move received bytes into `buf`, returns how many were copied.
    fn read_available(&mut self, buf: &mut [u8]) -> usize;
}

impl<B: BusMaster + ?Sized> BusMaster for &mut B {
    fn begin_transaction(&mut self, address: u8) {
        (**self).begin_transaction(address)
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        (**self).write(bytes)
    }

    fn end_transaction_hold(&mut self) -> Result<(), BusError> {
        (**self).end_transaction_hold()
    }

    fn end_transaction_release(&mut self) -> Result<(), BusError> {
        (**self).end_transaction_release()
    }

    fn request(&mut self, address: u8, len: usize) -> usize {
        (**self).request(address, len)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        (**self).read_available(buf)
    }
}
