//! Simulated CapTIvate controller.
//!
//! Behaves like the controller on the far side of the bus: it acknowledges
//! its own address, remembers the last valid cycle request and serves the
//! matching cycle packet on the following read. Used by the host binary and
//! by tests in place of real hardware.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use log::trace;

use crate::bus::{BusError, BusMaster};
use crate::cycle::{CMD_CYCLE_PACKET, FULL_PACKET_LEN, SINGLE_PACKET_LEN};
use crate::readings::{electrode_index, CYCLES, SLOTS_PER_CYCLE};

/// Transmit buffer size of a typical two-wire driver.
const TX_CAPACITY: usize = 32;

const DEFAULT_BASELINE: u16 = 400;

/// How the simulated controller answers cycle reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// 22-byte packets with four elements.
    #[default]
    Full,
    /// 10-byte packets with one element, as older firmware sends.
    SingleElement,
    /// No data at all.
    Silent,
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(ResponseMode::Full),
            "single" | "single-element" => Ok(ResponseMode::SingleElement),
            "silent" => Ok(ResponseMode::Silent),
            other => Err(format!(
                "unknown response mode '{other}' (expected full, single or silent)"
            )),
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseMode::Full => "full",
            ResponseMode::SingleElement => "single",
            ResponseMode::Silent => "silent",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedController {
    address: u8,
    sensor_id: u8,
    mode: ResponseMode,
    baseline: u16,
    tick: u32,
    tx_address: Option<u8>,
    tx: Vec<u8>,
    pending_cycle: Option<u8>,
    rx: VecDeque<u8>,
}

impl SimulatedController {
    pub fn new(address: u8, sensor_id: u8) -> Self {
        Self {
            address,
            sensor_id,
            mode: ResponseMode::Full,
            baseline: DEFAULT_BASELINE,
            tick: 0,
            tx_address: None,
            tx: Vec::with_capacity(TX_CAPACITY),
            pending_cycle: None,
            rx: VecDeque::with_capacity(FULL_PACKET_LEN),
        }
    }

    pub fn with_mode(mut self, mode: ResponseMode) -> Self {
        self.mode = mode;
        self
    }

    /// Lowest count the simulated electrodes report. Zero is clamped to 1 so
    /// a served reading never looks like a missing one.
    pub fn with_baseline(mut self, baseline: u16) -> Self {
        self.baseline = baseline.max(1);
        self
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    /// Count reported for `electrode` at the current tick.
    pub fn raw_count(&self, electrode: usize) -> u16 {
        let offset = (electrode as u16).wrapping_mul(8);
        let ripple = ((self.tick as usize + electrode * 3) % 32) as u16;
        self.baseline.saturating_add(offset).saturating_add(ripple)
    }

    fn finish_write(&mut self) -> Result<(), BusError> {
        let Some(address) = self.tx_address.take() else {
            return Err(BusError::Other(4));
        };
        if address != self.address {
            self.pending_cycle = None;
            return Err(BusError::AddressNack);
        }

        self.pending_cycle = match self.tx.as_slice() {
            [CMD_CYCLE_PACKET, sid, cycle] if *sid == self.sensor_id && *cycle < CYCLES => {
                Some(*cycle)
            }
            other => {
                trace!("sim: ignoring command {:02X?}", other);
                None
            }
        };
        Ok(())
    }

    fn build_packet(&self, cycle: u8) -> Vec<u8> {
        let elements = match self.mode {
            ResponseMode::Full => SLOTS_PER_CYCLE,
            ResponseMode::SingleElement => 1,
            ResponseMode::Silent => return Vec::new(),
        };
        let len = if elements == 1 {
            SINGLE_PACKET_LEN
        } else {
            FULL_PACKET_LEN
        };

        let mut packet = Vec::with_capacity(len);
        packet.extend_from_slice(&[CMD_CYCLE_PACKET, self.sensor_id, cycle, 0, 0, 0]);
        for slot in 0..elements {
            let value = electrode_index(cycle, slot)
                .map(|e| self.raw_count(e))
                .unwrap_or(0);
            packet.extend_from_slice(&[0, 0]);
            packet.extend_from_slice(&value.to_le_bytes());
        }
        packet
    }
}

impl BusMaster for SimulatedController {
    fn begin_transaction(&mut self, address: u8) {
        self.tx_address = Some(address);
        self.tx.clear();
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        if self.tx_address.is_none() {
            return 0;
        }
        let room = TX_CAPACITY - self.tx.len();
        let accepted = bytes.len().min(room);
        self.tx.extend_from_slice(&bytes[..accepted]);
        accepted
    }

    fn end_transaction_hold(&mut self) -> Result<(), BusError> {
        self.finish_write()
    }

    fn end_transaction_release(&mut self) -> Result<(), BusError> {
        self.finish_write()
    }

    fn request(&mut self, address: u8, len: usize) -> usize {
        self.rx.clear();
        if address != self.address {
            return 0;
        }
        let Some(cycle) = self.pending_cycle else {
            return 0;
        };

        let mut packet = self.build_packet(cycle);
        packet.truncate(len);
        self.rx.extend(packet);
        self.tick = self.tick.wrapping_add(1);
        self.rx.len()
    }

    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.rx.len());
        for (dst, src) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *dst = src;
        }
        n
    }
}
