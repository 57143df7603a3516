//! Differential phase-shift keying: a chip of `+1` advances phase by `0`,
//! a chip of `-1` advances it by `pi`. Information lives in the phase
//! *difference* between consecutive symbols, so the scheme is insensitive
//! to an arbitrary constant phase offset from the channel.

use std::f64::consts::PI;

use crate::primitives::phase::wrap;
use crate::types::{Chip, Phase, SoftChip};

/// Modulate a chip sequence into an absolute-phase array. `initial_phase`
/// is the emitted phase for chip 0; every following chip advances the
/// running phase by `0` (for `+1`) or `pi` (for `-1`).
pub fn modulate(chips: &[Chip], initial_phase: Phase) -> Vec<Phase> {
    let mut phase = initial_phase;
    let mut out = Vec::with_capacity(chips.len());
    for (i, &chip) in chips.iter().enumerate() {
        if i > 0 {
            phase += if chip == -1 { PI } else { 0.0 };
        }
        out.push(phase);
    }
    out
}

/// Demodulate an absolute-phase array of length `M` into `M - 1` soft
/// chips, where `soft[i] = cos(wrap(phase[i+1] - phase[i]))`. A phase
/// difference near `0` demodulates near `+1` (chip `+1`); near `pi`
/// demodulates near `-1` (chip `-1`). Empty input yields empty output.
pub fn demodulate(phases: &[Phase]) -> Vec<SoftChip> {
    if phases.len() < 2 {
        return Vec::new();
    }
    phases
        .windows(2)
        .map(|w| wrap(w[1] - w[0]).cos())
        .collect()
}
