//! Frame assembly and the soft-bit-consuming frame-search state machine.
//! `build` is stateless; `process` is a state machine that consumes a
//! soft-bit stream incrementally and emits completed frames.

use std::collections::VecDeque;

use crate::errors::FramingError;
use crate::ldpc::{Code, Variant};
use crate::types::{HardBit, Llr};

/// Preamble: four strong zero bits.
pub const PREAMBLE_BITS: [HardBit; 4] = [0, 0, 0, 0];

/// Sync word `0xB4`, transmitted MSB-first.
pub const SYNC_WORD_BITS: [HardBit; 8] = [1, 0, 1, 1, 0, 1, 0, 0];

const HEADER_INFO_BITS: usize = 14;
const HEADER_TOTAL_BITS: usize = 16;

/// CRC-2 over `x^2 + x + 1` (generator `0b11` once the implicit leading
/// term is dropped), processed MSB-first. Used for the 14-bit header
/// payload only.
fn crc2(bits: &[HardBit]) -> u8 {
    const POLY: u8 = 0b11;
    let mut reg: u8 = 0;
    for &bit in bits {
        let top = (reg >> 1) & 1;
        reg = ((reg << 1) | (bit & 1)) & 0b11;
        if top == 1 {
            reg ^= POLY;
        }
    }
    reg
}

fn bits_msb_first(value: u32, width: u32) -> impl Iterator<Item = HardBit> {
    (0..width).rev().map(move |i| ((value >> i) & 1) as HardBit)
}

fn bits_to_value(bits: &[HardBit]) -> u32 {
    bits.iter().fold(0u32, |acc, &b| (acc << 1) | b as u32)
}

/// Parsed, CRC-verified frame header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    pub frame_type: u8,
    pub variant: Variant,
    pub sequence_no: u8,
}

fn header_bits(frame_type: u8, variant: Variant, sequence_no: u8) -> Vec<HardBit> {
    let mut info = Vec::with_capacity(HEADER_INFO_BITS);
    info.extend(bits_msb_first(frame_type as u32, 4));
    info.extend(bits_msb_first(variant.to_bits() as u32, 2));
    info.extend(bits_msb_first(sequence_no as u32, 8));
    let crc = crc2(&info);
    let mut full = info;
    full.extend(bits_msb_first(crc as u32, 2));
    full
}

fn parse_header(hard: &[HardBit]) -> Option<Header> {
    debug_assert_eq!(hard.len(), HEADER_TOTAL_BITS);
    let info = &hard[..HEADER_INFO_BITS];
    let received_crc = bits_to_value(&hard[HEADER_INFO_BITS..]) as u8;
    if crc2(info) != received_crc {
        return None;
    }
    let frame_type = bits_to_value(&info[0..4]) as u8;
    let ldpc_bits = bits_to_value(&info[4..6]) as u8;
    let sequence_no = bits_to_value(&info[6..14]) as u8;
    let variant = Variant::from_bits(ldpc_bits)?;
    Some(Header { frame_type, variant, sequence_no })
}

/// Pack hard bits MSB-first into bytes, zero-padding the final byte if the
/// bit count is not a multiple of 8.
pub fn bits_to_bytes(bits: &[HardBit]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| chunk.iter().fold(0u8, |acc, &b| (acc << 1) | (b & 1)))
        .collect()
}

/// Unpack bytes into MSB-first hard bits.
pub fn bytes_to_bits(bytes: &[u8]) -> Vec<HardBit> {
    bytes.iter().flat_map(|&b| (0..8).rev().map(move |i| (b >> i) & 1)).collect()
}

/// A decoded frame, ready for delivery to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub frame_type: u8,
    pub sequence_no: u8,
    pub variant: Variant,
    pub payload: Vec<u8>,
    pub ldpc_iterations: u32,
}

/// Build the full wire bit-array for one frame.
pub fn build(
    payload: &[u8],
    sequence_no: u8,
    frame_type: u8,
    variant: Variant,
) -> Result<Vec<HardBit>, FramingError> {
    let capacity_bytes = variant.k() / 8;
    if payload.len() > capacity_bytes {
        return Err(FramingError::PayloadTooLarge {
            payload_bytes: payload.len(),
            capacity_bytes,
            ldpc_n_type: variant.to_bits(),
        });
    }

    let mut message = bytes_to_bits(payload);
    message.resize(variant.k(), 0);

    let codeword = Code::build(variant).encode(&message);

    let mut out = Vec::with_capacity(4 + 8 + HEADER_TOTAL_BITS + codeword.len());
    out.extend(PREAMBLE_BITS);
    out.extend(SYNC_WORD_BITS);
    out.extend(header_bits(frame_type, variant, sequence_no));
    out.extend(codeword);
    Ok(out)
}

#[derive(Debug, Clone)]
enum State {
    SearchPreamble,
    SearchSync { since: usize },
    ReadHeader,
    ReadPayload(Header),
}

/// Frame search statistics, surfaced via the observer/stats API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramerStats {
    pub frames_decoded: u64,
    pub ldpc_failures: u64,
    pub header_crc_errors: u64,
}

/// The soft-bit-consuming frame search state machine.
pub struct Framer {
    state: State,
    pending: VecDeque<Llr>,
    preamble_llr_min: Llr,
    sync_search_timeout: usize,
    max_ldpc_iterations: u32,
    pub stats: FramerStats,
}

impl Framer {
    pub fn new(preamble_llr_min: Llr, sync_search_timeout: usize, max_ldpc_iterations: u32) -> Self {
        Self {
            state: State::SearchPreamble,
            pending: VecDeque::new(),
            preamble_llr_min,
            sync_search_timeout,
            max_ldpc_iterations,
            stats: FramerStats::default(),
        }
    }

    /// Reset the search state machine and discard buffered bits, but keep
    /// accumulated stats (mirrors `Demodulator::clear_buffers`/`reset`
    /// scoping at the framer level — call sites decide which to clear).
    pub fn reset(&mut self) {
        self.state = State::SearchPreamble;
        self.pending.clear();
    }

    /// Consume `soft_bits`, returning any frames completed by this call,
    /// in arrival order. Never blocks; never grows its internal buffer
    /// past one frame's worth of soft bits once draining catches up.
    pub fn process(&mut self, soft_bits: &[Llr]) -> Vec<Frame> {
        self.pending.extend(soft_bits.iter().copied());
        let mut frames = Vec::new();

        loop {
            match self.state.clone() {
                State::SearchPreamble => {
                    if self.pending.len() < PREAMBLE_BITS.len() {
                        break;
                    }
                    let matches = self
                        .pending
                        .iter()
                        .take(PREAMBLE_BITS.len())
                        .all(|&l| l > self.preamble_llr_min);
                    if matches {
                        for _ in 0..PREAMBLE_BITS.len() {
                            self.pending.pop_front();
                        }
                        self.state = State::SearchSync { since: 0 };
                    } else {
                        self.pending.pop_front();
                    }
                }
                State::SearchSync { since } => {
                    if self.pending.len() < SYNC_WORD_BITS.len() {
                        break;
                    }
                    let hard: Vec<HardBit> = self
                        .pending
                        .iter()
                        .take(SYNC_WORD_BITS.len())
                        .map(|&l| crate::types::llr_to_bit(l))
                        .collect();
                    let hamming = hard
                        .iter()
                        .zip(SYNC_WORD_BITS.iter())
                        .filter(|(a, b)| a != b)
                        .count();
                    if hamming <= 1 {
                        for _ in 0..SYNC_WORD_BITS.len() {
                            self.pending.pop_front();
                        }
                        self.state = State::ReadHeader;
                    } else {
                        self.pending.pop_front();
                        let since = since + 1;
                        if since >= self.sync_search_timeout {
                            self.state = State::SearchPreamble;
                        } else {
                            self.state = State::SearchSync { since };
                        }
                    }
                }
                State::ReadHeader => {
                    if self.pending.len() < HEADER_TOTAL_BITS {
                        break;
                    }
                    let hard: Vec<HardBit> = self
                        .pending
                        .iter()
                        .take(HEADER_TOTAL_BITS)
                        .map(|&l| crate::types::llr_to_bit(l))
                        .collect();
                    for _ in 0..HEADER_TOTAL_BITS {
                        self.pending.pop_front();
                    }
                    match parse_header(&hard) {
                        Some(header) => self.state = State::ReadPayload(header),
                        None => {
                            self.stats.header_crc_errors += 1;
                            self.state = State::SearchPreamble;
                        }
                    }
                }
                State::ReadPayload(header) => {
                    let n = header.variant.n();
                    if self.pending.len() < n {
                        break;
                    }
                    let llrs: Vec<Llr> = self.pending.iter().take(n).copied().collect();
                    for _ in 0..n {
                        self.pending.pop_front();
                    }
                    let code = Code::build(header.variant);
                    let decoded = code.decode(&llrs, self.max_ldpc_iterations);
                    self.state = State::SearchPreamble;
                    if decoded.converged {
                        self.stats.frames_decoded += 1;
                        frames.push(Frame {
                            frame_type: header.frame_type,
                            sequence_no: header.sequence_no,
                            variant: header.variant,
                            payload: bits_to_bytes(&decoded.message),
                            ldpc_iterations: decoded.iterations,
                        });
                    } else {
                        self.stats.ldpc_failures += 1;
                    }
                }
            }
        }

        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strong(bit: HardBit) -> Llr {
        if bit == 0 { 100 } else { -100 }
    }

    #[test]
    fn build_validates_capacity() {
        let err = build(&[0u8; 100], 0, 0, Variant::N16).unwrap_err();
        assert!(matches!(err, FramingError::PayloadTooLarge { .. }));
    }

    #[test]
    fn build_starts_with_preamble_and_sync_word() {
        let bits = build(&[0x42], 5, 0, Variant::N16).unwrap();
        assert_eq!(&bits[0..4], &PREAMBLE_BITS);
        assert_eq!(&bits[4..12], &SYNC_WORD_BITS);
    }

    #[test]
    fn header_round_trips_through_crc() {
        for seq in [0u8, 1, 42, 255] {
            let bits = header_bits(0, Variant::N64, seq);
            let header = parse_header(&bits).expect("valid crc");
            assert_eq!(header.sequence_no, seq);
            assert_eq!(header.variant, Variant::N64);
        }
    }

    #[test]
    fn corrupted_header_crc_is_rejected() {
        let mut bits = header_bits(0, Variant::N32, 7);
        bits[0] ^= 1; // flip a frame_type bit without updating crc
        assert!(parse_header(&bits).is_none());
    }

    #[test]
    fn process_recovers_frame_built_by_build() {
        let payload = vec![0xABu8, 0xCD];
        let wire_bits = build(&payload, 3, 0, Variant::N32).unwrap();
        let llrs: Vec<Llr> = wire_bits.iter().map(|&b| strong(b)).collect();

        let mut framer = Framer::new(60, 256, 20);
        let frames = framer.process(&llrs);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, payload);
        assert_eq!(frames[0].sequence_no, 3);
        assert_eq!(framer.stats.frames_decoded, 1);
    }

    #[test]
    fn process_handles_chunked_delivery() {
        let payload = vec![0x7Fu8];
        let wire_bits = build(&payload, 9, 0, Variant::N16).unwrap();
        let llrs: Vec<Llr> = wire_bits.iter().map(|&b| strong(b)).collect();

        let mut framer = Framer::new(60, 256, 20);
        let mut frames = Vec::new();
        for chunk in llrs.chunks(3) {
            frames.extend(framer.process(chunk));
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, payload);
    }

    #[test]
    fn leading_noise_does_not_prevent_sync() {
        let payload = vec![0x01u8];
        let wire_bits = build(&payload, 0, 0, Variant::N16).unwrap();
        let mut llrs: Vec<Llr> = vec![-20, 15, -5, 30, 20, -10];
        llrs.extend(wire_bits.iter().map(|&b| strong(b)));

        let mut framer = Framer::new(60, 256, 20);
        let frames = framer.process(&llrs);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, payload);
    }

    #[test]
    fn bytes_bits_round_trip() {
        let bytes = vec![0x00u8, 0xFF, 0x3C];
        assert_eq!(bits_to_bytes(&bytes_to_bits(&bytes)), bytes);
    }
}
