//! Matched-filter synchroniser: locates the time offset at which
//! the modulated M-sequence reference correlates best with a window of
//! received samples, and reports confidence via the peak/side-lobe ratio.

use rayon::prelude::*;

use crate::config::Config;
use crate::errors::ConfigError;
use crate::primitives::{carrier, dpsk, mseq};
use crate::types::Sample;

/// A fully-modulated reference waveform for one `(sequence, samples_per_phase,
/// sample_rate, carrier_freq)` tuple, built once and reused across
/// acquisition attempts.
#[derive(Debug, Clone)]
pub struct Reference {
    pub samples: Vec<Sample>,
}

impl Reference {
    pub fn build(cfg: &Config) -> Result<Self, ConfigError> {
        let chips = mseq::generate(cfg.sequence_length, cfg.seed)?;
        let phases = dpsk::modulate(&chips, 0.0);
        let samples = carrier::modulate(
            &phases,
            cfg.samples_per_phase,
            cfg.sample_rate,
            cfg.carrier_freq,
            0,
        );
        Ok(Self { samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Result of a successful acquisition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acquisition {
    /// Offset into the searched window, at the original (undecimated) rate.
    pub sample_offset: usize,
    /// Signed peak correlation; a negative sign indicates carrier
    /// inversion and must flip downstream LLR sign.
    pub peak_correlation: f64,
    pub peak_ratio: f64,
}

/// Decimate a sample array by keeping every `factor`-th sample.
fn decimate(samples: &[Sample], factor: usize) -> Vec<f64> {
    samples.iter().step_by(factor.max(1)).map(|&s| s as f64).collect()
}

/// Normalised cross-correlation of `signal[offset..offset+ref.len()]`
/// against `reference`.
fn correlate_at(signal: &[f64], reference: &[f64], offset: usize) -> f64 {
    const EPS: f64 = 1e-12;
    let window = &signal[offset..offset + reference.len()];
    let dot: f64 = window.iter().zip(reference.iter()).map(|(a, b)| a * b).sum();
    let sig_energy: f64 = window.iter().map(|v| v * v).sum();
    let ref_energy: f64 = reference.iter().map(|v| v * v).sum();
    dot / (sig_energy.sqrt() * ref_energy.sqrt() + EPS)
}

/// Search `window` for the reference signal. Returns `None` if
/// none of the four acquisition conditions hold.
pub fn acquire(
    window: &[Sample],
    reference: &Reference,
    decimation: usize,
    correlation_threshold: f64,
    peak_to_noise_ratio: f64,
    max_offset: Option<usize>,
) -> Option<Acquisition> {
    if window.len() < reference.len() {
        return None;
    }

    let decimation = decimation.max(1);
    let decimated_signal = decimate(window, decimation);
    let decimated_ref = decimate(&reference.samples, decimation);
    if decimated_ref.is_empty() || decimated_signal.len() < decimated_ref.len() {
        return None;
    }

    let max_k = {
        let by_span = decimated_signal.len() - decimated_ref.len();
        match max_offset {
            Some(m) => (m / decimation).min(by_span),
            None => by_span,
        }
    };

    let correlations: Vec<f64> = (0..=max_k)
        .into_par_iter()
        .map(|k| correlate_at(&decimated_signal, &decimated_ref, k))
        .collect();

    if correlations.len() < 5 {
        return None; // false-positive guard: too few correlation samples
    }

    let mut best_idx = 0usize;
    let mut best_abs = f64::MIN;
    let mut second_abs = 0.0f64;
    for (i, &c) in correlations.iter().enumerate() {
        let a = c.abs();
        if a > best_abs {
            second_abs = best_abs;
            best_abs = a;
            best_idx = i;
        } else if a > second_abs {
            second_abs = a;
        }
    }

    let peak_ratio = if second_abs < 1e-9 {
        f64::INFINITY
    } else {
        best_abs / second_abs
    };
    let peak_correlation = correlations[best_idx];

    let acquired = window.len() >= reference.len()
        && best_abs >= correlation_threshold
        && peak_ratio >= peak_to_noise_ratio;

    if !acquired {
        return None;
    }

    Some(Acquisition {
        sample_offset: best_idx * decimation,
        peak_correlation,
        peak_ratio,
    })
}

/// Adaptive threshold: `median(|c|) + 2.5 * sigma`, sigma estimated via MAD
/// (divided by 0.674 for the Gaussian-equivalent scale). The fixed
/// `floor` is never undercut.
pub fn adaptive_threshold(correlations: &[f64], floor: f64) -> f64 {
    if correlations.is_empty() {
        return floor;
    }
    let mut abs_vals: Vec<f64> = correlations.iter().map(|c| c.abs()).collect();
    abs_vals.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = percentile_sorted(&abs_vals, 0.5);
    let deviations: Vec<f64> = abs_vals.iter().map(|v| (v - median).abs()).collect();
    let mut sorted_dev = deviations;
    sorted_dev.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mad = percentile_sorted(&sorted_dev, 0.5);
    let sigma = mad / 0.674;
    (median + 2.5 * sigma).max(floor)
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx]
}
