//! Modem error types, grouped by the categories in the error-handling design:
//! configuration, oversize payload, and cancellation. Channel-quality
//! conditions (header CRC failures, LDPC non-convergence, weak sync) are
//! intentionally *not* represented here — the propagation policy is that
//! those are absorbed into `Stats` and recovered locally by state-machine
//! transitions, never raised as errors.

use thiserror::Error;

/// Top-level error type for all modem operations.
#[derive(Debug, Error)]
pub enum ModemError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Configuration errors. Reported synchronously from `configure()`; the
/// demodulator retains its prior configuration when one of these fires.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unsupported M-sequence length {0} (must be one of 15, 31, 63, 127, 255)")]
    UnsupportedLength(usize),

    #[error("samples_per_phase must be >= 4, got {0}")]
    InvalidSamplesPerPhase(usize),

    #[error("carrier frequency {carrier_hz} Hz violates Nyquist for sample rate {sample_rate_hz} Hz")]
    NyquistViolation { carrier_hz: f64, sample_rate_hz: f64 },

    #[error("correlation_threshold must be in [0, 1], got {0}")]
    InvalidCorrelationThreshold(f64),

    #[error("peak_to_noise_ratio must be >= 1, got {0}")]
    InvalidPeakToNoiseRatio(f64),

    #[error("sample rate must be > 0")]
    InvalidSampleRate,
}

/// Raised by `Framer::build` when the payload exceeds the selected LDPC
/// variant's message capacity.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FramingError {
    #[error("payload of {payload_bytes} bytes exceeds the {capacity_bytes}-byte capacity of ldpc_n_type {ldpc_n_type}")]
    PayloadTooLarge {
        payload_bytes: usize,
        capacity_bytes: usize,
        ldpc_n_type: u8,
    },
}

/// Returned from any suspending operation cancelled before completion.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Result type alias for modem operations.
pub type Result<T> = std::result::Result<T, ModemError>;
