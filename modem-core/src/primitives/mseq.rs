//! Maximal-length sequence (M-sequence) generation.
//!
//! Each supported length corresponds to a specific LFSR tap configuration;
//! together with a seed this is fully deterministic, which is what lets the
//! same reference sequence be reconstructed independently by encoder and
//! decoder from nothing but `(length, seed)`.

use crate::errors::ConfigError;
use crate::types::Chip;

/// Feedback taps (as a bitmask over register positions, MSB = highest tap)
/// for each supported LFSR length, chosen for maximal-length output.
fn taps(length: usize) -> Option<u32> {
    match length {
        15 => Some(0b1_0011),  // x^4 + x^3 + 1 over a 4-bit register
        31 => Some(0b1_0100_1), // x^5 + x^3 + 1 over a 5-bit register
        63 => Some(0b10_0000_1), // x^6 + x^5 + 1 over a 6-bit register
        127 => Some(0b100_0000_1), // x^7 + x^6 + 1
        255 => Some(0b1000_1110), // x^8 + x^6 + x^5 + x^4 + 1
        _ => None,
    }
}

fn register_bits(length: usize) -> u32 {
    // length = 2^bits - 1
    (length + 1).trailing_zeros()
}

/// Generate an M-sequence of the given `length` as `+1`/`-1` chips, using
/// the canonical LFSR for that length seeded with `seed`.
///
/// Fails with `UnsupportedLength` for any length other than
/// `{15, 31, 63, 127, 255}`.
pub fn generate(length: usize, seed: u32) -> Result<Vec<Chip>, ConfigError> {
    let tap_mask = taps(length).ok_or(ConfigError::UnsupportedLength(length))?;
    let bits = register_bits(length);
    let mut state = seed & ((1u32 << bits) - 1);
    if state == 0 {
        state = 1; // an all-zero LFSR state never leaves zero
    }

    let mut chips = Vec::with_capacity(length);
    for _ in 0..length {
        let output_bit = state & 1;
        chips.push(if output_bit == 1 { -1i8 } else { 1i8 });

        // Fibonacci LFSR: feedback is the XOR of tapped bits.
        let tapped = state & tap_mask;
        let feedback = tapped.count_ones() & 1;
        state = (state >> 1) | (feedback << (bits - 1));
    }
    Ok(chips)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_length() {
        assert_eq!(generate(7, 1), Err(ConfigError::UnsupportedLength(7)));
    }

    #[test]
    fn supported_lengths_produce_correct_len_and_alphabet() {
        for &len in &crate::config::VALID_SEQUENCE_LENGTHS {
            let seed = crate::config::default_seed(len).unwrap();
            let seq = generate(len, seed).unwrap();
            assert_eq!(seq.len(), len);
            assert!(seq.iter().all(|&c| c == 1 || c == -1));
        }
    }

    #[test]
    fn sequence_is_deterministic() {
        let a = generate(31, 0b10101).unwrap();
        let b = generate(31, 0b10101).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_generally_produce_different_phases() {
        let a = generate(31, 0b10101).unwrap();
        let b = generate(31, 0b11001).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn autocorrelation_peak_is_sharp() {
        // M-sequences have a two-valued autocorrelation: L at zero shift,
        // -1 at every nonzero shift (mod L). This is the property the
        // synchroniser's matched filter relies on.
        let len = 31;
        let seq = generate(len, crate::config::default_seed(len).unwrap()).unwrap();
        let autocorr = |shift: usize| -> i32 {
            (0..len)
                .map(|i| seq[i] as i32 * seq[(i + shift) % len] as i32)
                .sum()
        };
        assert_eq!(autocorr(0), len as i32);
        for shift in 1..len {
            assert_eq!(autocorr(shift), -1, "shift {shift}");
        }
    }
}
