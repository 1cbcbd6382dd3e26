//! Single-cycle transaction against the CapTIvate controller.
//!
//! Each cycle is requested with a 3-byte command and answered with a cycle
//! packet: a 6-byte header followed by 4-byte elements
//! `[reserved, reserved, raw-lo, raw-hi]`. Firmware builds that only report a
//! single element answer with the 10-byte form.

use log::{debug, trace};

use crate::bus::BusMaster;
use crate::config::BridgeConfig;
use crate::readings::{electrode_index, Readings, SLOTS_PER_CYCLE};

/// Command code requesting a cycle packet.
pub const CMD_CYCLE_PACKET: u8 = 0x01;

/// Default 7-bit address of the controller.
pub const DEFAULT_ADDRESS: u8 = 0x0A;

const PACKET_HEADER_LEN: usize = 6;
const ELEMENT_LEN: usize = 4;

/// Cycle packet carrying all four elements.
pub const FULL_PACKET_LEN: usize = PACKET_HEADER_LEN + SLOTS_PER_CYCLE * ELEMENT_LEN;

/// Fallback cycle packet carrying one element.
pub const SINGLE_PACKET_LEN: usize = PACKET_HEADER_LEN + ELEMENT_LEN;

/// What a cycle transaction did to the reading buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// `slots` electrode values were written from a `received`-byte packet.
    Decoded { received: usize, slots: usize },
    /// Fewer than [`SINGLE_PACKET_LEN`] bytes arrived; nothing was written.
    Abandoned { received: usize },
}

impl CycleOutcome {
    pub fn is_decoded(&self) -> bool {
        matches!(self, CycleOutcome::Decoded { .. })
    }

    pub fn received(&self) -> usize {
        match *self {
            CycleOutcome::Decoded { received, .. } | CycleOutcome::Abandoned { received } => {
                received
            }
        }
    }

    /// Number of electrode slots updated by this cycle.
    pub fn slots(&self) -> usize {
        match *self {
            CycleOutcome::Decoded { slots, .. } => slots,
            CycleOutcome::Abandoned { .. } => 0,
        }
    }
}

/// Issues cycle requests and decodes the answers into a [`Readings`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReader {
    address: u8,
    sensor_id: u8,
    repeated_start: bool,
}

impl Default for CycleReader {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS, 0)
    }
}

impl CycleReader {
    pub fn new(address: u8, sensor_id: u8) -> Self {
        Self {
            address,
            sensor_id,
            repeated_start: true,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.i2c_address, config.sensor_id).with_repeated_start(config.repeated_start)
    }

    /// Choose whether the command write keeps the bus (repeated start) or
    /// releases it with a stop condition before the read.
    pub fn with_repeated_start(mut self, repeated_start: bool) -> Self {
        self.repeated_start = repeated_start;
        self
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn sensor_id(&self) -> u8 {
        self.sensor_id
    }

    /// Run one cycle transaction and write whatever it yields into `readings`.
    ///
    /// Never fails: a short or missing answer leaves the cycle's electrodes
    /// untouched and is reported as [`CycleOutcome::Abandoned`].
    pub fn read_cycle<B: BusMaster + ?Sized>(
        &self,
        bus: &mut B,
        cycle: u8,
        readings: &mut Readings,
    ) -> CycleOutcome {
        let mut packet = [0u8; FULL_PACKET_LEN];
        let received = self.transact(bus, cycle, &mut packet);

        if received < SINGLE_PACKET_LEN {
            debug!(
                "cycle {:02}: abandoned, {} byte(s) received",
                cycle, received
            );
            return CycleOutcome::Abandoned { received };
        }

        let slots = decode_cycle_packet(cycle, &packet[..received], readings);
        trace!(
            "cycle {:02}: {} byte(s), {} slot(s) decoded",
            cycle,
            received,
            slots
        );
        CycleOutcome::Decoded { received, slots }
    }

    /// Send the request and read the answer, falling back to the single
    /// element length whenever the full packet does not arrive.
    fn transact<B: BusMaster + ?Sized>(
        &self,
        bus: &mut B,
        cycle: u8,
        packet: &mut [u8; FULL_PACKET_LEN],
    ) -> usize {
        let command = [CMD_CYCLE_PACKET, self.sensor_id, cycle];

        bus.begin_transaction(self.address);
        let queued = bus.write(&command);
        if queued != command.len() {
            debug!(
                "cycle {:02}: driver queued {}/{} command bytes",
                cycle,
                queued,
                command.len()
            );
        }

        let status = if self.repeated_start {
            bus.end_transaction_hold()
        } else {
            bus.end_transaction_release()
        };
        if let Err(e) = status {
            // The read is still attempted; a NACKed command shows up as a short answer.
            debug!("cycle {:02}: command write failed: {}", cycle, e);
        }

        let received = self.fetch(bus, FULL_PACKET_LEN, packet);
        if received == FULL_PACKET_LEN {
            return received;
        }

        trace!(
            "cycle {:02}: got {} of {} bytes, retrying with {}",
            cycle,
            received,
            FULL_PACKET_LEN,
            SINGLE_PACKET_LEN
        );
        self.fetch(bus, SINGLE_PACKET_LEN, packet)
    }

    fn fetch<B: BusMaster + ?Sized>(&self, bus: &mut B, len: usize, packet: &mut [u8]) -> usize {
        let reported = bus.request(self.address, len).min(len);
        bus.read_available(&mut packet[..reported])
    }
}

/// Decode the elements contained in `packet` into `readings`.
///
/// An element is decoded only if its value bytes lie inside the packet, so a
/// 22-byte packet yields 4 values and a 10-byte packet yields 1. Returns the
/// number of electrodes written.
pub fn decode_cycle_packet(cycle: u8, packet: &[u8], readings: &mut Readings) -> usize {
    let mut written = 0;
    for slot in 0..SLOTS_PER_CYCLE {
        let base = PACKET_HEADER_LEN + ELEMENT_LEN * slot;
        if base + 3 >= packet.len() {
            break;
        }
        let raw = u16::from_le_bytes([packet[base + 2], packet[base + 3]]);
        if let Some(electrode) = electrode_index(cycle, slot) {
            if readings.set(electrode, raw) {
                written += 1;
            }
        }
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusError;
    use std::collections::VecDeque;

    /// Bus that answers successive requests with scripted packets.
    #[derive(Default)]
    struct ScriptedBus {
        answers: VecDeque<Vec<u8>>,
        pending: Vec<u8>,
        writes: Vec<(u8, Vec<u8>)>,
        requests: Vec<usize>,
        holds: usize,
        releases: usize,
        nack: bool,
    }

    impl ScriptedBus {
        fn answering(answers: Vec<Vec<u8>>) -> Self {
            Self {
                answers: answers.into(),
                ..Default::default()
            }
        }
    }

    impl BusMaster for ScriptedBus {
        fn begin_transaction(&mut self, address: u8) {
            self.writes.push((address, Vec::new()));
        }

        fn write(&mut self, bytes: &[u8]) -> usize {
            if let Some((_, buf)) = self.writes.last_mut() {
                buf.extend_from_slice(bytes);
            }
            bytes.len()
        }

        fn end_transaction_hold(&mut self) -> Result<(), BusError> {
            self.holds += 1;
            if self.nack {
                Err(BusError::AddressNack)
            } else {
                Ok(())
            }
        }

        fn end_transaction_release(&mut self) -> Result<(), BusError> {
            self.releases += 1;
            Ok(())
        }

        fn request(&mut self, _address: u8, len: usize) -> usize {
            self.requests.push(len);
            let mut answer = self.answers.pop_front().unwrap_or_default();
            answer.truncate(len);
            self.pending = answer;
            self.pending.len()
        }

        fn read_available(&mut self, buf: &mut [u8]) -> usize {
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            n
        }
    }

    fn packet(values: &[u16]) -> Vec<u8> {
        let mut p = vec![CMD_CYCLE_PACKET, 0, 0, 0, 0, 0];
        for v in values {
            p.extend_from_slice(&[0xAA, 0xBB]);
            p.extend_from_slice(&v.to_le_bytes());
        }
        p
    }

    #[test]
    fn sends_command_and_holds_bus() {
        let mut bus = ScriptedBus::answering(vec![packet(&[1, 2, 3, 4])]);
        let mut readings = Readings::zeroed();
        CycleReader::new(0x0A, 0).read_cycle(&mut bus, 5, &mut readings);

        assert_eq!(bus.writes, vec![(0x0A, vec![0x01, 0x00, 0x05])]);
        assert_eq!(bus.holds, 1);
        assert_eq!(bus.releases, 0);
        assert_eq!(bus.requests, vec![FULL_PACKET_LEN]);
    }

    #[test]
    fn release_mode_issues_stop() {
        let mut bus = ScriptedBus::answering(vec![packet(&[1, 2, 3, 4])]);
        let mut readings = Readings::zeroed();
        CycleReader::new(0x0A, 3)
            .with_repeated_start(false)
            .read_cycle(&mut bus, 0, &mut readings);
        assert_eq!(bus.releases, 1);
        assert_eq!(bus.holds, 0);
        assert_eq!(bus.writes[0].1, vec![0x01, 0x03, 0x00]);
    }

    #[test]
    fn full_packet_fills_four_slots() {
        let mut bus = ScriptedBus::answering(vec![packet(&[10, 20, 30, 40])]);
        let mut readings = Readings::zeroed();
        let outcome = CycleReader::default().read_cycle(&mut bus, 3, &mut readings);

        assert_eq!(
            outcome,
            CycleOutcome::Decoded {
                received: 22,
                slots: 4
            }
        );
        // cycle 3: 8 * 1 + 2k + 1
        assert_eq!(readings[9], 10);
        assert_eq!(readings[11], 20);
        assert_eq!(readings[13], 30);
        assert_eq!(readings[15], 40);
    }

    #[test]
    fn fallback_updates_only_first_slot() {
        let mut readings = Readings::zeroed();
        for e in [0, 2, 4, 6] {
            readings.set(e, 0x0BAD);
        }
        let mut bus = ScriptedBus::answering(vec![Vec::new(), packet(&[0x4242])]);
        let outcome = CycleReader::default().read_cycle(&mut bus, 0, &mut readings);

        assert_eq!(bus.requests, vec![FULL_PACKET_LEN, SINGLE_PACKET_LEN]);
        assert_eq!(outcome.slots(), 1);
        assert_eq!(readings[0], 0x4242);
        assert_eq!(readings[2], 0x0BAD);
        assert_eq!(readings[4], 0x0BAD);
        assert_eq!(readings[6], 0x0BAD);
    }

    #[test]
    fn short_answer_after_fallback_is_abandoned() {
        let mut readings = Readings::zeroed();
        readings.set(1, 77);
        let mut bus = ScriptedBus::answering(vec![vec![1, 2, 3], vec![1, 2, 3, 4, 5, 6, 7, 8, 9]]);
        let outcome = CycleReader::default().read_cycle(&mut bus, 1, &mut readings);

        assert_eq!(outcome, CycleOutcome::Abandoned { received: 9 });
        assert!(!outcome.is_decoded());
        assert_eq!(readings[1], 77);
    }

    #[test]
    fn nack_still_attempts_read() {
        let mut bus = ScriptedBus::answering(vec![packet(&[5, 6, 7, 8])]);
        bus.nack = true;
        let mut readings = Readings::zeroed();
        let outcome = CycleReader::default().read_cycle(&mut bus, 0, &mut readings);
        assert!(outcome.is_decoded());
        assert_eq!(readings[0], 5);
    }

    #[test]
    fn decode_respects_packet_bounds() {
        let full = packet(&[1, 2, 3, 4]);
        let mut readings = Readings::zeroed();
        // 17 bytes holds elements 0 and 1 completely, element 2 only partially.
        assert_eq!(decode_cycle_packet(0, &full[..17], &mut readings), 2);
        assert_eq!(readings[0], 1);
        assert_eq!(readings[2], 2);
        assert_eq!(readings[4], 0);
    }

    #[test]
    fn decode_ignores_out_of_range_cycle() {
        let mut readings = Readings::zeroed();
        assert_eq!(decode_cycle_packet(16, &packet(&[1, 2, 3, 4]), &mut readings), 0);
        assert_eq!(readings, Readings::zeroed());
    }
}
