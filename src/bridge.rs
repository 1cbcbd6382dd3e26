//! Command dispatcher: the bridge's main loop.
//!
//! The host sends a single `r`/`R` to request a scan. The bridge then reads
//! all 16 cycles from the controller and answers with one CA64 frame. Every
//! other byte is dropped without a reply.
//!
//! Everything runs on one thread: a stalled bus or serial write stalls the
//! loop, and no command can arrive while a scan is running.

use std::thread;
use std::time::Duration;

use log::{debug, info, trace};

use crate::bus::BusMaster;
use crate::config::BridgeConfig;
use crate::cycle::CycleReader;
use crate::errors::Result;
use crate::frame::FrameEncoder;
use crate::scan::{collect_scan_report, ScanReport};
use crate::transport::SerialTransport;

/// Whether `byte` asks for a scan.
pub fn is_trigger(byte: u8) -> bool {
    matches!(byte, b'r' | b'R')
}

/// Result of one [`Bridge::poll`] iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// No byte was waiting.
    Idle,
    /// A byte arrived that is not a trigger; it was consumed and dropped.
    Ignored(u8),
    /// A scan ran and a frame with `sequence` was sent.
    Scanned { sequence: u8, decoded_cycles: usize },
}

/// Bridge between a [`BusMaster`] and a [`SerialTransport`].
///
/// # Example
/// ```ignore
/// let port = serialport::new("/dev/ttyUSB0", 230_400).open()?;
/// let sim = SimulatedController::new(0x0A, 0);
/// let mut bridge = Bridge::new(sim, port);
/// bridge.run()?;
/// ```
pub struct Bridge<B, T> {
    bus: B,
    transport: T,
    reader: CycleReader,
    encoder: FrameEncoder,
    idle_poll: Duration,
    scans: u64,
}

impl<B: BusMaster, T: SerialTransport> Bridge<B, T> {
    // ------------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------------

    pub fn new(bus: B, transport: T) -> Self {
        Self::from_config(bus, transport, &BridgeConfig::default())
    }

    pub fn from_config(bus: B, transport: T, config: &BridgeConfig) -> Self {
        Self {
            bus,
            transport,
            reader: CycleReader::from_config(config),
            encoder: FrameEncoder::new(),
            idle_poll: config.idle_poll(),
            scans: 0,
        }
    }

    pub fn with_reader(mut self, reader: CycleReader) -> Self {
        self.reader = reader;
        self
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Handle at most one pending byte from the host.
    pub fn poll(&mut self) -> Result<Dispatch> {
        if !self.transport.byte_available()? {
            return Ok(Dispatch::Idle);
        }

        let byte = self.transport.read_byte()?;
        if !is_trigger(byte) {
            trace!("ignoring byte {:#04X}", byte);
            return Ok(Dispatch::Ignored(byte));
        }

        let (sequence, report) = self.scan_and_send()?;
        Ok(Dispatch::Scanned {
            sequence,
            decoded_cycles: report.decoded_cycles(),
        })
    }

    /// Run one scan and send its frame, whatever the host asked.
    pub fn scan_and_send(&mut self) -> Result<(u8, ScanReport)> {
        let report = collect_scan_report(&self.reader, &mut self.bus);
        let sequence = self.encoder.send(&mut self.transport, &report.readings)?;
        self.scans += 1;
        debug!(
            "frame seq={} cycles={}/16 min={} max={}",
            sequence,
            report.decoded_cycles(),
            report.readings.min(),
            report.readings.max()
        );
        Ok((sequence, report))
    }

    /// Poll forever. Returns only when the serial transport fails.
    pub fn run(&mut self) -> Result<()> {
        info!(
            "bridge running: controller={:#04X} sensor_id={}",
            self.reader.address(),
            self.reader.sensor_id()
        );
        loop {
            if self.poll()? == Dispatch::Idle && !self.idle_poll.is_zero() {
                thread::sleep(self.idle_poll);
            }
        }
    }

    // ------------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------------

    /// Sequence number the next frame will carry.
    pub fn sequence(&self) -> u8 {
        self.encoder.sequence()
    }

    pub fn reset_sequence(&mut self) {
        self.encoder.reset();
    }

    /// Frames sent since construction.
    pub fn scans(&self) -> u64 {
        self.scans
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_parts(self) -> (B, T) {
        (self.bus, self.transport)
    }
}
