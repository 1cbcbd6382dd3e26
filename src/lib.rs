//! CapTIvate I2C-to-serial bridge.
//!
//! The bridge polls a CapTIvate capacitive-sensing controller for its raw
//! cycle counts and relays one full 64-electrode scan to the host per `r`
//! command, as a fixed 137-byte `CA64` frame protected by CRC16-CCITT.
//!
//! # Pieces
//!
//! 1. [`CycleReader`] requests one cycle packet over the bus, falling back
//!    from the 22-byte to the 10-byte packet, and maps its elements to
//!    electrodes with `E = 8 * (c >> 1) + 2 * k + (c & 1)`.
//! 2. [`collect_scan`] runs all 16 cycles into a zeroed [`Readings`] buffer.
//! 3. [`FrameEncoder`] serializes the buffer with a wrapping sequence number.
//! 4. [`Bridge`] ties them to a [`SerialTransport`] and answers host triggers.
//!
//! The host side of the link is covered by [`FrameDecoder`].

pub mod bridge;
pub mod bus;
pub mod config;
pub mod crc;
pub mod cycle;
mod errors;
pub mod frame;
pub mod logging;
pub mod readings;
pub mod scan;
pub mod sim;
pub mod transport;

pub use bridge::{is_trigger, Bridge, Dispatch};
pub use bus::{BusError, BusMaster};
pub use config::BridgeConfig;
pub use crc::{crc16, Crc16};
pub use cycle::{CycleOutcome, CycleReader};
pub use errors::*;
pub use frame::{
    decode_frame, DecoderStats, Frame, FrameDecoder, FrameEncoder, FRAME_LEN, HEADER, PAYLOAD_LEN,
};
pub use readings::{electrode_index, Readings, CYCLES, ELECTRODES, SLOTS_PER_CYCLE};
pub use scan::{collect_scan, collect_scan_report, ScanReport};
pub use sim::{ResponseMode, SimulatedController};
pub use transport::SerialTransport;

// ============================================================================
// Python Bindings
// ============================================================================

#[cfg(feature = "python")]
mod python {
    use pyo3::prelude::*;
    use pyo3::types::{PyBytes, PyDict};

    use crate::{DecoderStats, Frame, FrameDecoder, FRAME_LEN, HEADER, PAYLOAD_LEN};

    /// A decoded CA64 frame.
    ///
    /// Attributes:
    ///     sequence: Frame sequence number (0-255, wrapping).
    ///     readings: 64 raw counts in electrode order.
    ///     crc_ok: Whether the CRC16 trailer matched.
    #[pyclass(name = "Frame", frozen, eq)]
    #[derive(Clone, PartialEq, Eq)]
    struct PyFrame {
        #[pyo3(get)]
        sequence: u8,
        #[pyo3(get)]
        readings: Vec<u16>,
        #[pyo3(get)]
        crc_ok: bool,
    }

    #[pymethods]
    impl PyFrame {
        fn __repr__(&self) -> String {
            format!(
                "Frame(sequence={}, crc_ok={}, min={}, max={})",
                self.sequence,
                self.crc_ok,
                self.readings.iter().min().copied().unwrap_or(0),
                self.readings.iter().max().copied().unwrap_or(0)
            )
        }

        fn __len__(&self) -> usize {
            self.readings.len()
        }

        /// Convert to dictionary for easy serialization.
        fn to_dict<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
            let dict = PyDict::new(py);
            dict.set_item("sequence", self.sequence)?;
            dict.set_item("readings", self.readings.clone())?;
            dict.set_item("crc_ok", self.crc_ok)?;
            Ok(dict)
        }
    }

    impl From<Frame> for PyFrame {
        fn from(f: Frame) -> Self {
            PyFrame {
                sequence: f.sequence,
                readings: f.readings.to_vec(),
                crc_ok: f.crc_ok,
            }
        }
    }

    /// Streaming CA64 decoder; feed it whatever the serial port returns.
    ///
    /// Example:
    ///     >>> dec = FrameDecoder()
    ///     >>> for frame in dec.feed(port.read(1024)):
    ///     ...     print(frame.sequence, frame.readings[:8])
    #[pyclass(name = "FrameDecoder")]
    struct PyFrameDecoder {
        inner: FrameDecoder,
    }

    #[pymethods]
    impl PyFrameDecoder {
        #[new]
        fn new() -> Self {
            PyFrameDecoder {
                inner: FrameDecoder::new(),
            }
        }

        /// Feed received bytes and return the frames they complete.
        fn feed(&mut self, data: &[u8]) -> Vec<PyFrame> {
            self.inner.push(data).into_iter().map(PyFrame::from).collect()
        }

        fn clear(&mut self) {
            self.inner.clear();
        }

        /// Decoder counters as a dict (frames, crc_errors, sequence_gaps, discarded_bytes).
        #[getter]
        fn stats<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
            let DecoderStats {
                frames,
                crc_errors,
                sequence_gaps,
                discarded_bytes,
            } = self.inner.stats();
            let dict = PyDict::new(py);
            dict.set_item("frames", frames)?;
            dict.set_item("crc_errors", crc_errors)?;
            dict.set_item("sequence_gaps", sequence_gaps)?;
            dict.set_item("discarded_bytes", discarded_bytes)?;
            Ok(dict)
        }

        fn __repr__(&self) -> String {
            let s = self.inner.stats();
            format!(
                "FrameDecoder(frames={}, crc_errors={}, buffered={})",
                s.frames,
                s.crc_errors,
                self.inner.buffered()
            )
        }
    }

    /// CRC16-CCITT (poly 0x1021, init 0xFFFF) of `data`.
    #[pyfunction]
    fn crc16(data: &[u8]) -> u16 {
        crate::crc16(data)
    }

    /// Electrode index for a cycle and element slot, or None when out of range.
    #[pyfunction]
    fn electrode_index(cycle: u8, slot: usize) -> Option<usize> {
        crate::electrode_index(cycle, slot)
    }

    /// Send Rust log records to Python's `logging` at `level` (default from CAPTIVATE_LOG).
    #[pyfunction]
    #[pyo3(signature = (level=None))]
    fn init_logging(level: Option<&str>) {
        let level = level
            .and_then(crate::logging::parse_level)
            .unwrap_or_else(crate::logging::env_level);
        crate::logging::init_python_logging(level);
    }

    /// The Python module definition
    #[pymodule]
    #[pyo3(name = "_core")]
    fn captivate_bridge(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_class::<PyFrame>()?;
        m.add_class::<PyFrameDecoder>()?;
        m.add_function(wrap_pyfunction!(crc16, m)?)?;
        m.add_function(wrap_pyfunction!(electrode_index, m)?)?;
        m.add_function(wrap_pyfunction!(init_logging, m)?)?;

        m.add("FRAME_LEN", FRAME_LEN)?;
        m.add("PAYLOAD_LEN", PAYLOAD_LEN)?;
        m.add("HEADER", PyBytes::new(m.py(), &HEADER))?;
        Ok(())
    }
}
