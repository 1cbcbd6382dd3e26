//! Reading buffer and the cycle/slot to electrode mapping.

use std::ops::Index;

/// Number of bus cycles in one full scan.
pub const CYCLES: u8 = 16;

/// Electrode values carried by one full cycle packet.
pub const SLOTS_PER_CYCLE: usize = 4;

/// Total electrodes covered by a scan.
pub const ELECTRODES: usize = CYCLES as usize * SLOTS_PER_CYCLE;

/// Map a (cycle, slot) pair to its electrode index.
///
/// Even cycles cover the even columns of a row pair and odd cycles the odd
/// ones: `E = 8 * (cycle >> 1) + 2 * slot + (cycle & 1)`. Returns `None` for a
/// cycle outside `0..16` or a slot outside `0..4`.
pub fn electrode_index(cycle: u8, slot: usize) -> Option<usize> {
    if cycle >= CYCLES || slot >= SLOTS_PER_CYCLE {
        return None;
    }
    let c = cycle as usize;
    Some(8 * (c >> 1) + 2 * slot + (c & 1))
}

/// Raw counts for all 64 electrodes, indexed by electrode.
///
/// Zero doubles as "no reading": a cycle that could not be read leaves its
/// electrodes at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readings([u16; ELECTRODES]);

impl Default for Readings {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl Readings {
    pub const fn zeroed() -> Self {
        Self([0; ELECTRODES])
    }

    pub fn from_array(values: [u16; ELECTRODES]) -> Self {
        Self(values)
    }

    /// Value of one electrode, `None` when `electrode >= 64`.
    pub fn get(&self, electrode: usize) -> Option<u16> {
        self.0.get(electrode).copied()
    }

    /// Store a value; returns `false` (and stores nothing) when out of range.
    pub fn set(&mut self, electrode: usize, value: u16) -> bool {
        match self.0.get_mut(electrode) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u16> {
        self.0.to_vec()
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }

    pub fn min(&self) -> u16 {
        self.iter().min().unwrap_or(0)
    }

    pub fn max(&self) -> u16 {
        self.iter().max().unwrap_or(0)
    }
}

impl Index<usize> for Readings {
    type Output = u16;

    fn index(&self, electrode: usize) -> &u16 {
        &self.0[electrode]
    }
}

impl From<[u16; ELECTRODES]> for Readings {
    fn from(values: [u16; ELECTRODES]) -> Self {
        Self(values)
    }
}
