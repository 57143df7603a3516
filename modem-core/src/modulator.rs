//! Wires the primitives together in the transmit direction: hard bits →
//! DSSS spread → per-bit DPSK modulate → carrier modulate → samples.
//!
//! Each bit's `L` chips are DPSK-modulated independently, matching the
//! receive side's per-bit demodulation windows: the differential
//! reference chip at the start of every bit group carries no information
//! and is never recovered.

use crate::config::Config;
use crate::errors::ConfigError;
use crate::primitives::{carrier, dpsk, dsss};
use crate::types::{HardBit, Sample};

/// Modulate a hard-bit array into an audio-rate sample stream.
pub fn modulate(bits: &[HardBit], cfg: &Config) -> Result<Vec<Sample>, ConfigError> {
    let chips = dsss::spread(bits, cfg.sequence_length, cfg.seed)?;
    let l = cfg.sequence_length;
    let samples_per_bit = cfg.samples_per_bit();

    let mut out = Vec::with_capacity(bits.len() * samples_per_bit);
    for (bit_idx, chip_group) in chips.chunks(l).enumerate() {
        let phases = dpsk::modulate(chip_group, 0.0);
        let start_sample = (bit_idx * samples_per_bit) as u64;
        out.extend(carrier::modulate(
            &phases,
            cfg.samples_per_phase,
            cfg.sample_rate,
            cfg.carrier_freq,
            start_sample,
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modulated_length_matches_samples_per_bit() {
        let cfg = Config::default();
        let bits = vec![0u8, 1, 0, 1, 1];
        let samples = modulate(&bits, &cfg).unwrap();
        assert_eq!(samples.len(), bits.len() * cfg.samples_per_bit());
    }

    #[test]
    fn rejects_unsupported_sequence_length() {
        let cfg = Config { sequence_length: 9, ..Config::default() };
        assert_eq!(modulate(&[0], &cfg), Err(ConfigError::UnsupportedLength(9)));
    }
}
