//! Bridge configuration.
//!
//! Loaded from an optional JSON file; every field falls back to its default
//! when missing, so `{}` is a valid configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cycle::DEFAULT_ADDRESS;
use crate::errors::{BridgeError, Result};

/// Serial baud rate the host viewer expects.
pub const DEFAULT_BAUD_RATE: u32 = 230_400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// 7-bit address of the CapTIvate controller.
    pub i2c_address: u8,
    /// Sensor identifier sent in every cycle request.
    pub sensor_id: u8,
    /// Keep the bus between command and read (repeated start).
    pub repeated_start: bool,
    pub baud_rate: u32,
    /// Sleep between polls that found no command byte.
    pub idle_poll_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            i2c_address: DEFAULT_ADDRESS,
            sensor_id: 0,
            repeated_start: true,
            baud_rate: DEFAULT_BAUD_RATE,
            idle_poll_ms: 1,
        }
    }
}

impl BridgeConfig {
    /// Read and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // 0x00-0x07 and 0x78-0x7F are reserved I2C addresses.
        if !(0x08..=0x77).contains(&self.i2c_address) {
            return Err(BridgeError::Config(format!(
                "i2c_address {:#04X} is outside 0x08..=0x77",
                self.i2c_address
            )));
        }
        if self.baud_rate == 0 {
            return Err(BridgeError::Config("baud_rate must be non-zero".into()));
        }
        Ok(())
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}
