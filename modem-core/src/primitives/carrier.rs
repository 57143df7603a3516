//! Carrier modulation/demodulation: converting a phase-per-chip stream
//! into an audio-rate sample stream and back, via a sinusoidal carrier.

use std::f64::consts::TAU;

use crate::types::{Phase, Sample};

/// Modulate an absolute-phase array onto a sinusoidal carrier. Emits
/// `phases.len() * samples_per_phase` samples; sample `i` equals
/// `sin(2*pi*carrier_freq*(start_sample + i)/sample_rate + phases[i / samples_per_phase])`.
///
/// `start_sample` lets callers modulate a signal in contiguous blocks while
/// keeping the carrier phase-continuous across block boundaries.
pub fn modulate(
    phases: &[Phase],
    samples_per_phase: usize,
    sample_rate: f64,
    carrier_freq: f64,
    start_sample: u64,
) -> Vec<Sample> {
    let total = phases.len() * samples_per_phase;
    let mut out = Vec::with_capacity(total);
    for i in 0..total {
        let phase_idx = i / samples_per_phase;
        let n = start_sample + i as u64;
        let angle = TAU * carrier_freq * (n as f64) / sample_rate + phases[phase_idx];
        out.push(angle.sin() as Sample);
    }
    out
}

/// Demodulate a sample stream back into one phase per `samples_per_phase`
/// window via coherent I/Q accumulation. Trailing samples that don't fill
/// a complete window are dropped (the caller is expected to only pass
/// complete windows; the streaming demodulator enforces this upstream).
pub fn demodulate(
    samples: &[Sample],
    samples_per_phase: usize,
    sample_rate: f64,
    carrier_freq: f64,
    start_sample: u64,
) -> Vec<Phase> {
    if samples_per_phase == 0 {
        return Vec::new();
    }
    let windows = samples.len() / samples_per_phase;
    let mut out = Vec::with_capacity(windows);
    for w in 0..windows {
        let mut i_acc = 0.0f64;
        let mut q_acc = 0.0f64;
        for k in 0..samples_per_phase {
            let idx = w * samples_per_phase + k;
            let n = start_sample + idx as u64;
            let angle = TAU * carrier_freq * (n as f64) / sample_rate;
            let s = samples[idx] as f64;
            i_acc += s * angle.sin();
            q_acc += s * angle.cos();
        }
        let count = samples_per_phase as f64;
        out.push((q_acc / count).atan2(i_acc / count));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn round_trip_recovers_phase_within_tolerance() {
        let phases = vec![0.0, PI / 2.0, PI, -PI / 2.0, 0.3];
        let samples = modulate(&phases, 23, 44_100.0, 10_000.0, 0);
        let recovered = demodulate(&samples, 23, 44_100.0, 10_000.0, 0);
        assert_eq!(recovered.len(), phases.len());
        for (expected, actual) in phases.iter().zip(recovered.iter()) {
            let diff = crate::primitives::phase::wrap(actual - expected).abs();
            assert!(diff < 0.05, "expected {expected}, got {actual}");
        }
    }

    #[test]
    fn block_continuity_matches_single_pass() {
        let phases = vec![0.0, PI, 0.3, -1.0];
        let whole = modulate(&phases, 23, 44_100.0, 10_000.0, 0);

        let mut chunked = Vec::new();
        chunked.extend(modulate(&phases[..2], 23, 44_100.0, 10_000.0, 0));
        let mid_sample = (2 * 23) as u64;
        chunked.extend(modulate(&phases[2..], 23, 44_100.0, 10_000.0, mid_sample));

        for (a, b) in whole.iter().zip(chunked.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn empty_phases_yield_empty_samples() {
        assert!(modulate(&[], 23, 44_100.0, 10_000.0, 0).is_empty());
    }
}
