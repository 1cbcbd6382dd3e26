//! CA64 frame encoding (bridge side) and decoding (host side).
//!
//! Frame layout, little-endian:
//!
//! | Field    | Size | Value                                   |
//! |----------|------|-----------------------------------------|
//! | Header   | 4    | `"CA64"`                                |
//! | Length   | 2    | 128                                     |
//! | Sequence | 1    | wraps 0..=255, one step per frame       |
//! | Payload  | 128  | 64 × u16 in electrode order             |
//! | CRC16    | 2    | over sequence, length and payload       |
//!
//! The header is not covered by the CRC.

use log::{trace, warn};

use crate::crc::Crc16;
use crate::errors::{FrameError, Result};
use crate::readings::{Readings, ELECTRODES};
use crate::transport::SerialTransport;

pub const HEADER: [u8; 4] = *b"CA64";
pub const PAYLOAD_LEN: usize = ELECTRODES * 2;
pub const FRAME_LEN: usize = HEADER.len() + 2 + 1 + PAYLOAD_LEN + 2;

const LENGTH_OFFSET: usize = HEADER.len();
const SEQUENCE_OFFSET: usize = LENGTH_OFFSET + 2;
const PAYLOAD_OFFSET: usize = SEQUENCE_OFFSET + 1;
const CRC_OFFSET: usize = PAYLOAD_OFFSET + PAYLOAD_LEN;

/// CRC over `[sequence, length-lo, length-hi, payload..]`.
pub fn frame_checksum(sequence: u8, payload: &[u8]) -> u16 {
    let length = (payload.len() as u16).to_le_bytes();
    let mut crc = Crc16::new();
    crc.update(&[sequence, length[0], length[1]]);
    crc.update(payload);
    crc.finish()
}

// ============================================================================
// Encoder
// ============================================================================

/// Builds frames and owns the outgoing sequence counter.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FrameEncoder {
    sequence: u8,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number the next frame will carry.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn reset(&mut self) {
        self.sequence = 0;
    }

    /// Assemble a frame for `readings` and advance the sequence counter.
    pub fn encode(&mut self, readings: &Readings) -> [u8; FRAME_LEN] {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        let mut frame = [0u8; FRAME_LEN];
        frame[..LENGTH_OFFSET].copy_from_slice(&HEADER);
        frame[LENGTH_OFFSET..SEQUENCE_OFFSET].copy_from_slice(&(PAYLOAD_LEN as u16).to_le_bytes());
        frame[SEQUENCE_OFFSET] = sequence;

        for (chunk, value) in frame[PAYLOAD_OFFSET..CRC_OFFSET]
            .chunks_exact_mut(2)
            .zip(readings.iter())
        {
            chunk.copy_from_slice(&value.to_le_bytes());
        }

        let crc = frame_checksum(sequence, &frame[PAYLOAD_OFFSET..CRC_OFFSET]);
        frame[CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        frame
    }

    /// Encode `readings` and write the frame to `transport`.
    ///
    /// Returns the sequence number carried by the frame. The counter advances
    /// even if the write fails.
    pub fn send<T: SerialTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        readings: &Readings,
    ) -> Result<u8> {
        let sequence = self.sequence;
        let frame = self.encode(readings);
        transport.write_all(&frame)?;
        trace!("sent frame seq={}", sequence);
        Ok(sequence)
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// A frame as received by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence: u8,
    pub readings: Readings,
    /// Whether the trailer matched the recomputed CRC.
    pub crc_ok: bool,
}

/// Parse the first [`FRAME_LEN`] bytes of `bytes` without rejecting a bad CRC.
fn parse_frame(bytes: &[u8]) -> std::result::Result<Frame, FrameError> {
    if bytes.len() < FRAME_LEN {
        return Err(FrameError::Truncated { len: bytes.len() });
    }
    if bytes[..LENGTH_OFFSET] != HEADER {
        return Err(FrameError::BadHeader);
    }
    let length = u16::from_le_bytes([bytes[LENGTH_OFFSET], bytes[LENGTH_OFFSET + 1]]);
    if length as usize != PAYLOAD_LEN {
        return Err(FrameError::BadLength(length));
    }

    let sequence = bytes[SEQUENCE_OFFSET];
    let payload = &bytes[PAYLOAD_OFFSET..CRC_OFFSET];
    let received = u16::from_le_bytes([bytes[CRC_OFFSET], bytes[CRC_OFFSET + 1]]);
    let computed = frame_checksum(sequence, payload);

    let mut values = [0u16; ELECTRODES];
    for (value, chunk) in values.iter_mut().zip(payload.chunks_exact(2)) {
        *value = u16::from_le_bytes([chunk[0], chunk[1]]);
    }

    Ok(Frame {
        sequence,
        readings: Readings::from_array(values),
        crc_ok: received == computed,
    })
}

/// Decode one complete frame, rejecting it if the CRC does not match.
pub fn decode_frame(bytes: &[u8]) -> std::result::Result<Frame, FrameError> {
    let frame = parse_frame(bytes)?;
    if !frame.crc_ok {
        let received = u16::from_le_bytes([bytes[CRC_OFFSET], bytes[CRC_OFFSET + 1]]);
        return Err(FrameError::Crc {
            received,
            computed: frame_checksum(frame.sequence, &bytes[PAYLOAD_OFFSET..CRC_OFFSET]),
        });
    }
    Ok(frame)
}

/// Counters kept by [`FrameDecoder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames returned, including those with a bad CRC.
    pub frames: usize,
    pub crc_errors: usize,
    /// Sequence discontinuities between consecutive good frames.
    pub sequence_gaps: usize,
    /// Bytes skipped while searching for a header.
    pub discarded_bytes: usize,
}

/// Streaming decoder that finds frames in an arbitrary byte stream.
#[derive(Debug, Default, Clone)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    last_seq: Option<u8>,
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Bytes buffered while waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Forget buffered bytes and sequence history, keeping the counters.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.last_seq = None;
    }

    /// Feed received bytes, returning every frame they complete.
    ///
    /// Frames with a bad CRC are returned with `crc_ok == false`. A header
    /// followed by a wrong length field is treated as noise and skipped.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(data);
        let mut frames = Vec::new();

        loop {
            let Some(start) = find_header(&self.buf) else {
                // Keep a possible partial header at the tail.
                let keep = self.buf.len().min(HEADER.len() - 1);
                let drop = self.buf.len() - keep;
                self.discard(drop);
                break;
            };
            self.discard(start);

            if self.buf.len() < FRAME_LEN {
                break;
            }

            match parse_frame(&self.buf[..FRAME_LEN]) {
                Ok(frame) => {
                    self.buf.drain(..FRAME_LEN);
                    self.record(&frame);
                    frames.push(frame);
                }
                Err(e) => {
                    trace!("resync: {}", e);
                    self.discard(1);
                }
            }
        }

        frames
    }

    fn discard(&mut self, n: usize) {
        if n > 0 {
            self.buf.drain(..n);
            self.stats.discarded_bytes += n;
        }
    }

    fn record(&mut self, frame: &Frame) {
        self.stats.frames += 1;
        if !frame.crc_ok {
            self.stats.crc_errors += 1;
            warn!("CRC mismatch in frame seq={}", frame.sequence);
            return;
        }
        if let Some(last) = self.last_seq {
            if frame.sequence != last.wrapping_add(1) {
                self.stats.sequence_gaps += 1;
            }
        }
        self.last_seq = Some(frame.sequence);
    }
}

fn find_header(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER.len()).position(|w| w == HEADER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc16;

    fn ramp() -> Readings {
        let mut values = [0u16; ELECTRODES];
        for (i, v) in values.iter_mut().enumerate() {
            *v = (i as u16) * 257 + 3;
        }
        Readings::from_array(values)
    }

    #[test]
    fn frame_shape() {
        let frame = FrameEncoder::new().encode(&ramp());
        assert_eq!(FRAME_LEN, 137);
        assert_eq!(&frame[..4], b"CA64");
        assert_eq!(&frame[4..6], &[128, 0]);
        assert_eq!(frame[6], 0);
        assert_eq!(&frame[7..9], &3u16.to_le_bytes());
        assert_eq!(&frame[133..135], &(63u16 * 257 + 3).to_le_bytes());
    }

    #[test]
    fn crc_covers_sequence_length_and_payload() {
        let frame = FrameEncoder::new().encode(&ramp());
        let mut covered = vec![frame[6], frame[4], frame[5]];
        covered.extend_from_slice(&frame[7..135]);
        let trailer = u16::from_le_bytes([frame[135], frame[136]]);
        assert_eq!(crc16(&covered), trailer);
    }

    #[test]
    fn header_is_outside_the_crc() {
        let mut frame = FrameEncoder::new().encode(&ramp());
        frame[0] = b'X';
        let trailer = u16::from_le_bytes([frame[135], frame[136]]);
        assert_eq!(frame_checksum(frame[6], &frame[7..135]), trailer);
    }

    #[test]
    fn corruption_in_covered_region_is_detected() {
        let clean = FrameEncoder::new().encode(&ramp());
        for i in 4..CRC_OFFSET {
            let mut frame = clean;
            frame[i] ^= 0x01;
            match decode_frame(&frame) {
                Err(FrameError::Crc { .. }) | Err(FrameError::BadLength(_)) => {}
                other => panic!("byte {i}: corruption not detected: {other:?}"),
            }
        }
    }

    #[test]
    fn sequence_advances_and_wraps() {
        let mut encoder = FrameEncoder::new();
        let readings = Readings::zeroed();
        let first = encoder.encode(&readings)[6];
        for _ in 1..256 {
            encoder.encode(&readings);
        }
        assert_eq!(encoder.sequence(), 0);
        assert_eq!(encoder.encode(&readings)[6], first);
        assert_eq!(encoder.sequence(), 1);
        encoder.reset();
        assert_eq!(encoder.sequence(), 0);
    }

    #[test]
    fn zero_payload_has_valid_crc() {
        let frame = FrameEncoder::new().encode(&Readings::zeroed());
        assert!(frame[7..135].iter().all(|&b| b == 0));
        let decoded = decode_frame(&frame).unwrap();
        assert!(decoded.crc_ok);
        assert_eq!(decoded.readings, Readings::zeroed());
    }

    #[test]
    fn decode_rejects_bad_frames() {
        let frame = FrameEncoder::new().encode(&ramp());
        assert_eq!(
            decode_frame(&frame[..100]),
            Err(FrameError::Truncated { len: 100 })
        );

        let mut bad_header = frame;
        bad_header[3] = b'5';
        assert_eq!(decode_frame(&bad_header), Err(FrameError::BadHeader));

        let mut bad_length = frame;
        bad_length[4] = 64;
        assert_eq!(decode_frame(&bad_length), Err(FrameError::BadLength(64)));
    }

    #[test]
    fn decoder_resyncs_after_garbage() {
        let mut encoder = FrameEncoder::new();
        let mut stream = b"#OK CONNECT\nCA6".to_vec();
        stream.extend_from_slice(&encoder.encode(&ramp()));
        stream.extend_from_slice(&[0xFF, 0x00]);
        stream.extend_from_slice(&encoder.encode(&Readings::zeroed()));

        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(&stream);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].sequence, 0);
        assert_eq!(frames[0].readings, ramp());
        assert_eq!(frames[1].sequence, 1);
        assert_eq!(decoder.stats().frames, 2);
        assert_eq!(decoder.stats().sequence_gaps, 0);
        assert_eq!(decoder.stats().discarded_bytes, 15 + 2);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn decoder_handles_split_delivery() {
        let frame = FrameEncoder::new().encode(&ramp());
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&frame[..2]).is_empty());
        assert!(decoder.push(&frame[2..70]).is_empty());
        let frames = decoder.push(&frame[70..]);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].crc_ok);
    }

    #[test]
    fn decoder_skips_wrong_length_header() {
        let mut fake = FrameEncoder::new().encode(&ramp());
        fake[4] = 0x10;
        let real = FrameEncoder::new().encode(&ramp());

        let mut stream = fake.to_vec();
        stream.extend_from_slice(&real);
        let frames = FrameDecoder::new().push(&stream);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].crc_ok);
    }

    #[test]
    fn decoder_reports_crc_errors_and_gaps() {
        let mut encoder = FrameEncoder::new();
        let a = encoder.encode(&ramp());
        let mut b = encoder.encode(&ramp());
        b[50] ^= 0x80;
        encoder.encode(&ramp());
        let d = encoder.encode(&ramp());

        let mut decoder = FrameDecoder::new();
        let mut frames = decoder.push(&a);
        frames.extend(decoder.push(&b));
        frames.extend(decoder.push(&d));

        assert_eq!(frames.len(), 3);
        assert!(!frames[1].crc_ok);
        let stats = decoder.stats();
        assert_eq!(stats.crc_errors, 1);
        // seq 0 then seq 3 (seq 1 corrupt, seq 2 never delivered)
        assert_eq!(stats.sequence_gaps, 1);
    }

    #[test]
    fn decoder_bounds_buffer_without_header() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&vec![0x55; 10_000]);
        assert_eq!(decoder.buffered(), HEADER.len() - 1);
        assert_eq!(decoder.stats().discarded_bytes, 10_000 - 3);
    }
}
