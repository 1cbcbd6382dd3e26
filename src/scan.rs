//! Full 16-cycle scan.

use log::debug;

use crate::bus::BusMaster;
use crate::cycle::{CycleOutcome, CycleReader};
use crate::readings::{Readings, CYCLES};

/// Readings from one scan together with the per-cycle outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub readings: Readings,
    pub outcomes: [CycleOutcome; CYCLES as usize],
}

impl ScanReport {
    /// Number of cycles that produced at least a single-element packet.
    pub fn decoded_cycles(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_decoded()).count()
    }

    /// Cycles that were abandoned, in ascending order.
    pub fn abandoned_cycles(&self) -> Vec<u8> {
        self.outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| !o.is_decoded())
            .map(|(c, _)| c as u8)
            .collect()
    }
}

/// Read all cycles into a fresh, zeroed buffer.
pub fn collect_scan<B: BusMaster + ?Sized>(reader: &CycleReader, bus: &mut B) -> Readings {
    collect_scan_report(reader, bus).readings
}

/// Like [`collect_scan`], also returning what each cycle did.
pub fn collect_scan_report<B: BusMaster + ?Sized>(reader: &CycleReader, bus: &mut B) -> ScanReport {
    let mut readings = Readings::zeroed();
    let mut outcomes = [CycleOutcome::Abandoned { received: 0 }; CYCLES as usize];

    for cycle in 0..CYCLES {
        outcomes[cycle as usize] = reader.read_cycle(bus, cycle, &mut readings);
    }

    let report = ScanReport { readings, outcomes };
    let decoded = report.decoded_cycles();
    if decoded < CYCLES as usize {
        debug!(
            "scan: {}/{} cycles decoded, abandoned {:?}",
            decoded,
            CYCLES,
            report.abandoned_cycles()
        );
    }
    report
}
