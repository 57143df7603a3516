//! Configuration for the DSSS-DPSK physical layer.
//!
//! Every field here can be set through a `configure` control message and
//! is validated before being applied.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Supported M-sequence lengths.
pub const VALID_SEQUENCE_LENGTHS: [usize; 5] = [15, 31, 63, 127, 255];

/// Default LFSR seed per M-sequence length.
pub fn default_seed(length: usize) -> Option<u32> {
    match length {
        15 => Some(0b1000),
        31 => Some(0b10101),
        63 => Some(0b100001),
        127 => Some(0b1000001),
        255 => Some(0b10000001),
        _ => None,
    }
}

/// Full configuration for a `Demodulator`/`Modulator` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub sample_rate: f64,
    pub carrier_freq: f64,
    pub sequence_length: usize,
    pub seed: u32,
    pub samples_per_phase: usize,

    /// Acquisition correlation floor.
    pub correlation_threshold: f64,
    /// Acquisition peak/side-lobe ratio floor.
    pub peak_to_noise_ratio: f64,
    /// Decimation factor for the matched filter search.
    ///
    /// The matched filter correlates against the reference at multiples of
    /// this stride, so any value that does not evenly divide
    /// `samples_per_phase` searches off the chip boundary: the true peak
    /// is never sampled and `peak_ratio` collapses to noise-floor levels
    /// regardless of `correlation_threshold`/`peak_to_noise_ratio`. With
    /// the default `samples_per_phase` this rules out the low single-digit
    /// strides a coarser chip rate would allow; `Config::default()` keeps
    /// decimation equal to `samples_per_phase` for that reason.
    pub decimation: usize,

    /// Tracker weak-bit boundary.
    pub weak_llr_threshold: i8,
    /// Tracker patience before dropping to SEARCH.
    pub max_consecutive_weak: u32,
    /// VERIFY cadence, in tracked bits.
    pub verify_interval_frames: u32,

    /// Minimum strong-0-bit LLR for preamble detection.
    pub preamble_llr_min: i8,
    /// Bits to search for the sync word before restarting.
    pub sync_search_timeout: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            carrier_freq: 10_000.0,
            sequence_length: 31,
            seed: 0b10101,
            samples_per_phase: 23,
            correlation_threshold: 0.5,
            peak_to_noise_ratio: 4.0,
            decimation: 23,
            weak_llr_threshold: 50,
            max_consecutive_weak: 5,
            verify_interval_frames: 100,
            preamble_llr_min: 60,
            sync_search_timeout: 256,
        }
    }
}

impl Config {
    /// Validate the configuration. `configure()` runs this before accepting
    /// a new config; on failure the prior configuration is retained.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_SEQUENCE_LENGTHS.contains(&self.sequence_length) {
            return Err(ConfigError::UnsupportedLength(self.sequence_length));
        }
        if self.samples_per_phase < 4 {
            return Err(ConfigError::InvalidSamplesPerPhase(self.samples_per_phase));
        }
        if self.sample_rate <= 0.0 {
            return Err(ConfigError::InvalidSampleRate);
        }
        if self.carrier_freq * 2.0 >= self.sample_rate {
            return Err(ConfigError::NyquistViolation {
                carrier_hz: self.carrier_freq,
                sample_rate_hz: self.sample_rate,
            });
        }
        if !(0.0..=1.0).contains(&self.correlation_threshold) {
            return Err(ConfigError::InvalidCorrelationThreshold(self.correlation_threshold));
        }
        if self.peak_to_noise_ratio < 1.0 {
            return Err(ConfigError::InvalidPeakToNoiseRatio(self.peak_to_noise_ratio));
        }
        Ok(())
    }

    /// Samples making up one spread-spectrum bit: `L * samples_per_phase`.
    pub fn samples_per_bit(&self) -> usize {
        self.sequence_length * self.samples_per_phase
    }

    /// Relaxed acquisition parameters used for a fine re-sync.
    pub fn fine_resync_thresholds(&self) -> (f64, f64) {
        (0.3, 2.0)
    }
}
