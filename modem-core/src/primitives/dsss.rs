//! Direct-sequence spread spectrum: spreading a hard bit into a chip-rate
//! sequence, and despreading a noisy chip-rate stream back into soft bits
//! by correlating against the M-sequence reference.

use crate::errors::ConfigError;
use crate::primitives::mseq;
use crate::types::{Chip, HardBit, SoftChip};

/// Spread hard bits into chips: bit `0` maps to `+m[i]`, bit `1` to
/// `-m[i]`, where `m` is the M-sequence of the given length/seed. Output
/// length is `bits.len() * length`.
pub fn spread(bits: &[HardBit], length: usize, seed: u32) -> Result<Vec<Chip>, ConfigError> {
    let m = mseq::generate(length, seed)?;
    let mut chips = Vec::with_capacity(bits.len() * length);
    for &bit in bits {
        let sign: Chip = if bit == 0 { 1 } else { -1 };
        chips.extend(m.iter().map(|&c| c * sign));
    }
    Ok(chips)
}

/// Despread a soft-chip stream into soft bits. Each full window of
/// `length` soft chips is correlated against the M-sequence and quantised
/// to a signed byte; a partial trailing window (fewer than `length` chips)
/// is left unconsumed in the returned `remainder` count so the caller can
/// retain it across calls.
///
/// Returns `(soft_bits, chips_consumed)`.
pub fn despread(
    soft_chips: &[SoftChip],
    length: usize,
    seed: u32,
) -> Result<(Vec<i8>, usize), ConfigError> {
    let m = mseq::generate(length, seed)?;
    let windows = soft_chips.len() / length;
    let consumed = windows * length;

    let mut bits = Vec::with_capacity(windows);
    for w in 0..windows {
        let window = &soft_chips[w * length..(w + 1) * length];
        let correlation: f64 = window
            .iter()
            .zip(m.iter())
            .map(|(&s, &c)| s * c as f64)
            .sum::<f64>()
            / length as f64;
        bits.push(crate::types::quantize_llr(correlation));
    }
    Ok((bits, consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spread_length_matches_bits_times_sequence() {
        let bits = vec![0u8, 1, 1, 0];
        let chips = spread(&bits, 31, 0b10101).unwrap();
        assert_eq!(chips.len(), bits.len() * 31);
    }

    #[test]
    fn noiseless_round_trip_recovers_bits() {
        let bits = vec![0u8, 1, 1, 0, 0, 0, 1];
        let chips = spread(&bits, 31, 0b10101).unwrap();
        let soft_chips: Vec<SoftChip> = chips.iter().map(|&c| c as f64).collect();
        let (soft_bits, consumed) = despread(&soft_chips, 31, 0b10101).unwrap();
        assert_eq!(consumed, soft_chips.len());
        assert_eq!(soft_bits.len(), bits.len());
        for (bit, llr) in bits.iter().zip(soft_bits.iter()) {
            let recovered = crate::types::llr_to_bit(*llr);
            assert_eq!(recovered, *bit);
        }
    }

    #[test]
    fn partial_trailing_window_is_not_consumed() {
        let bits = vec![1u8, 0];
        let chips = spread(&bits, 31, 0b10101).unwrap();
        let mut soft_chips: Vec<SoftChip> = chips.iter().map(|&c| c as f64).collect();
        soft_chips.truncate(31 + 10); // one full bit plus a partial one
        let (soft_bits, consumed) = despread(&soft_chips, 31, 0b10101).unwrap();
        assert_eq!(soft_bits.len(), 1);
        assert_eq!(consumed, 31);
    }

    #[test]
    fn unsupported_length_errors() {
        assert_eq!(spread(&[0], 9, 1), Err(ConfigError::UnsupportedLength(9)));
        assert_eq!(
            despread(&[0.0; 9], 9, 1),
            Err(ConfigError::UnsupportedLength(9))
        );
    }
}
