//! The streaming demodulator: owns the sample ring buffer, sync
//! state, and a cohesive `Framer` instance, converting a continuous sample
//! stream into a lazy soft-bit stream and, via `poll_frames`, into frames.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::Config;
use crate::errors::ConfigError;
use crate::framer::{Frame, Framer};
use crate::observer::{NullObserver, Observer};
use crate::primitives::{carrier, dpsk, dsss};
use crate::sync::{self, Reference};
use crate::types::{Llr, Sample};

/// Soft cap on state-machine iterations per `get_available_bits` call, so a
/// real-time caller's per-period budget is bounded.
const MAX_ITERATIONS: usize = 20;

/// Consecutive strong "0" bits before a preemptive fine re-sync.
const PREEMPTIVE_RESYNC_STRONG_ZEROS: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Search,
    Track,
    Verify,
}

/// Snapshot of synchroniser state, as returned by `sync_state()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncState {
    pub locked: bool,
    pub mode: Mode,
    pub correlation: f64,
    pub sample_offset: u64,
    pub snr_db: f64,
}

/// Correlation magnitude range the SNR estimate is linearly mapped from.
const SNR_CORRELATION_RANGE: (f64, f64) = (0.3, 1.0);
/// Output range of the SNR estimate, in dB.
const SNR_DB_RANGE: (f64, f64) = (0.0, 20.0);

/// Map a peak correlation magnitude to an SNR estimate in dB, linearly over
/// `SNR_CORRELATION_RANGE` and clamped to `SNR_DB_RANGE` outside it.
fn estimate_snr_db(peak_corr_abs: f64) -> f64 {
    let (lo, hi) = SNR_CORRELATION_RANGE;
    let (db_lo, db_hi) = SNR_DB_RANGE;
    let t = (peak_corr_abs - lo) / (hi - lo);
    db_lo + t.clamp(0.0, 1.0) * (db_hi - db_lo)
}

pub struct Demodulator {
    cfg: Config,
    reference: Reference,
    observer: Arc<dyn Observer + Send + Sync>,
    framer: Framer,

    buffer: VecDeque<Sample>,
    /// Offset of the next bit boundary, relative to `buffer`'s front.
    sample_offset: usize,
    /// Absolute sample index corresponding to `buffer`'s front.
    absolute_base: u64,
    total_samples_in: u64,
    last_search_attempt_sample: Option<u64>,

    mode: Mode,
    peak_negative: bool,
    correlation: f64,
    snr_db: f64,
    llr_history: VecDeque<u32>,
    consecutive_weak: u32,
    consecutive_failures: u32,
    resync_strong_zero_count: u32,
    frames_since_check: u32,
}

impl Demodulator {
    pub fn new(cfg: Config) -> Result<Self, ConfigError> {
        Self::with_observer(cfg, Arc::new(NullObserver))
    }

    pub fn with_observer(cfg: Config, observer: Arc<dyn Observer + Send + Sync>) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let reference = Reference::build(&cfg)?;
        let framer = Framer::new(cfg.preamble_llr_min, cfg.sync_search_timeout, 20);
        Ok(Self {
            cfg,
            reference,
            observer,
            framer,
            buffer: VecDeque::new(),
            sample_offset: 0,
            absolute_base: 0,
            total_samples_in: 0,
            last_search_attempt_sample: None,
            mode: Mode::Search,
            peak_negative: false,
            correlation: 0.0,
            snr_db: 0.0,
            llr_history: VecDeque::with_capacity(10),
            consecutive_weak: 0,
            consecutive_failures: 0,
            resync_strong_zero_count: 0,
            frames_since_check: 0,
        })
    }

    /// Apply a new configuration; rebuilds the reference cache and resets
    /// all state. On validation failure, the prior configuration and state
    /// are retained untouched.
    pub fn configure(&mut self, cfg: Config) -> Result<(), ConfigError> {
        cfg.validate()?;
        let reference = Reference::build(&cfg)?;
        self.cfg = cfg;
        self.reference = reference;
        self.framer = Framer::new(self.cfg.preamble_llr_min, self.cfg.sync_search_timeout, 20);
        self.reset();
        Ok(())
    }

    /// Append a finite sample block. Pure memory move; never fails, never
    /// performs DSP.
    pub fn add_samples(&mut self, block: &[Sample]) {
        self.buffer.extend(block.iter().copied());
        self.total_samples_in += block.len() as u64;
    }

    pub fn sync_state(&self) -> SyncState {
        SyncState {
            locked: self.mode != Mode::Search,
            mode: self.mode,
            correlation: self.correlation,
            sample_offset: self.absolute_base + self.sample_offset as u64,
            snr_db: self.snr_db,
        }
    }

    /// Clear everything, including sync state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.sample_offset = 0;
        self.absolute_base = 0;
        self.total_samples_in = 0;
        self.last_search_attempt_sample = None;
        self.mode = Mode::Search;
        self.peak_negative = false;
        self.correlation = 0.0;
        self.snr_db = 0.0;
        self.llr_history.clear();
        self.consecutive_weak = 0;
        self.consecutive_failures = 0;
        self.resync_strong_zero_count = 0;
        self.frames_since_check = 0;
        self.framer.reset();
    }

    /// Clear sample/bit buffers only; sync state is preserved so tracking
    /// resumes immediately once real samples follow a self-transmission
    /// suppression window. The relative bit-boundary offset is reset
    /// to zero, under the assumption that the next appended block begins
    /// exactly at a bit boundary — the host is responsible for that timing.
    pub fn clear_buffers(&mut self) {
        self.buffer.clear();
        self.sample_offset = 0;
        self.absolute_base = self.total_samples_in;
        self.framer.reset();
    }

    /// Drive the sync/tracking state machine until `target` soft bits have
    /// been emitted, no further progress is possible with buffered
    /// samples, or `MAX_ITERATIONS` is reached.
    pub fn get_available_bits(&mut self, target: Option<u32>) -> Vec<Llr> {
        let mut emitted = Vec::new();
        for _ in 0..MAX_ITERATIONS {
            if let Some(t) = target {
                if emitted.len() as u32 >= t {
                    break;
                }
            }
            let commitment_active = target.map(|t| (emitted.len() as u32) < t).unwrap_or(false);
            let progressed = match self.mode {
                Mode::Search => self.try_acquire(),
                Mode::Track => self.track_one_bit(&mut emitted, commitment_active),
                Mode::Verify => {
                    self.do_verify();
                    true
                }
            };
            if !progressed {
                break;
            }
        }
        emitted
    }

    /// Convenience wrapper used by the control surface's `demodulate`:
    /// drains available soft bits and runs them through the framer,
    /// firing `frame_received` for each completed frame.
    pub fn poll_frames(&mut self) -> Vec<Frame> {
        let bits = self.get_available_bits(None);
        let frames = self.framer.process(&bits);
        for frame in &frames {
            self.observer.frame_received(frame);
        }
        self.observer.stats_updated(&self.framer.stats, &self.sync_state());
        frames
    }

    pub fn stats(&self) -> crate::framer::FramerStats {
        self.framer.stats
    }

    fn try_acquire(&mut self) -> bool {
        let needed = 2 * self.reference.len();
        if self.buffer.len() < needed {
            return false;
        }
        if let Some(last) = self.last_search_attempt_sample {
            if self.total_samples_in.saturating_sub(last) < self.cfg.sample_rate as u64 {
                return false;
            }
        }
        self.last_search_attempt_sample = Some(self.total_samples_in);

        // The preamble repeats the same bit four times, so the reference
        // waveform reappears identically one bit period later. Capping the
        // search lag below one bit period keeps that periodic repeat out of
        // range; within a single period the sequence's own autocorrelation
        // keeps off-lag matches low. On a miss we drop the stale prefix so
        // the next attempt slides forward instead of re-scanning dead air.
        let window: Vec<Sample> = self.buffer.iter().take(needed).copied().collect();
        match sync::acquire(
            &window,
            &self.reference,
            self.cfg.decimation,
            self.cfg.correlation_threshold,
            self.cfg.peak_to_noise_ratio,
            Some(self.reference.len().saturating_sub(1)),
        ) {
            Some(acq) => {
                self.sample_offset = acq.sample_offset;
                self.peak_negative = acq.peak_correlation < 0.0;
                self.correlation = acq.peak_correlation.abs();
                self.consecutive_weak = 0;
                self.consecutive_failures = 0;
                self.resync_strong_zero_count = 0;
                self.llr_history.clear();
                self.frames_since_check = 0;
                self.framer.reset();
                self.mode = Mode::Track;
                self.observer.sync_acquired(
                    (self.absolute_base + self.sample_offset as u64) as usize,
                    self.correlation,
                );
                true
            }
            None => {
                let drop_n = needed.saturating_sub(self.reference.len()).min(self.buffer.len());
                for _ in 0..drop_n {
                    self.buffer.pop_front();
                }
                self.absolute_base += drop_n as u64;
                false
            }
        }
    }

    fn track_one_bit(&mut self, emitted: &mut Vec<Llr>, commitment_active: bool) -> bool {
        let spb = self.cfg.samples_per_bit();
        if self.buffer.len() < self.sample_offset + spb {
            return false;
        }

        let window: Vec<Sample> = self.buffer.iter().skip(self.sample_offset).take(spb).copied().collect();
        let start_sample = self.absolute_base + self.sample_offset as u64;
        let phases = carrier::demodulate(
            &window,
            self.cfg.samples_per_phase,
            self.cfg.sample_rate,
            self.cfg.carrier_freq,
            start_sample,
        );

        let l = self.cfg.sequence_length;
        let demod_error = phases.len() != l || phases.iter().any(|p| p.is_nan());
        if demod_error {
            self.consecutive_failures += 1;
            if self.consecutive_failures >= 10 {
                self.drop_to_search();
            } else {
                self.sample_offset += spb / 4;
            }
            return true;
        }
        self.consecutive_failures = 0;

        // `dpsk::demodulate` returns one soft chip per transition, so
        // index 0 of its output estimates chip 1, not chip 0. Pad the
        // missing leading estimate at the front to keep indices aligned
        // with the M-sequence in `despread`.
        let mut soft_chips = dpsk::demodulate(&phases);
        soft_chips.insert(0, soft_chips.first().copied().unwrap_or(0.0));

        let (soft_bits, _) = match dsss::despread(&soft_chips, l, self.cfg.seed) {
            Ok(v) => v,
            Err(_) => {
                self.drop_to_search();
                return true;
            }
        };
        let mut llr = soft_bits.first().copied().unwrap_or(0);
        if self.peak_negative {
            llr = llr.checked_neg().unwrap_or(i8::MAX);
        }

        if self.llr_history.len() >= 10 {
            self.llr_history.pop_front();
        }
        self.llr_history.push_back(llr.unsigned_abs() as u32);
        self.snr_db = estimate_snr_db(self.correlation);

        if (llr.unsigned_abs() as i32) < self.cfg.weak_llr_threshold as i32 {
            self.consecutive_weak += 1;
        } else {
            self.consecutive_weak = 0;
        }

        if llr > self.cfg.preamble_llr_min {
            self.resync_strong_zero_count += 1;
        } else {
            self.resync_strong_zero_count = 0;
        }

        self.sample_offset += spb;
        emitted.push(llr);
        self.frames_since_check += 1;

        if self.consecutive_weak >= self.cfg.max_consecutive_weak && !commitment_active {
            self.drop_to_search();
            self.compact();
            return true;
        }

        let avg = self.average_abs_llr();
        if avg > 80.0 && (llr.unsigned_abs() as f64) < 30.0 {
            self.fine_resync();
        } else if self.resync_strong_zero_count >= PREEMPTIVE_RESYNC_STRONG_ZEROS {
            self.resync_strong_zero_count = 0;
            self.fine_resync();
        }

        if self.frames_since_check >= self.cfg.verify_interval_frames {
            self.frames_since_check = 0;
            self.mode = Mode::Verify;
        }

        self.compact();
        true
    }

    fn do_verify(&mut self) {
        let avg = self.average_abs_llr();
        if avg < self.cfg.weak_llr_threshold as f64 {
            self.drop_to_search();
        } else {
            self.mode = Mode::Track;
        }
    }

    fn average_abs_llr(&self) -> f64 {
        if self.llr_history.is_empty() {
            0.0
        } else {
            self.llr_history.iter().sum::<u32>() as f64 / self.llr_history.len() as f64
        }
    }

    /// Search within `±samples_per_bit` of the current offset with relaxed
    /// thresholds ("fine re-sync"). One full bit period comfortably
    /// covers realistic clock drift.
    fn fine_resync(&mut self) {
        let search_range = self.cfg.samples_per_bit();
        let start = self.sample_offset.saturating_sub(search_range);
        let end = (self.sample_offset + search_range + self.reference.len()).min(self.buffer.len());
        if end <= start || end - start < self.reference.len() {
            self.drop_to_search();
            return;
        }
        let window: Vec<Sample> = self.buffer.iter().skip(start).take(end - start).copied().collect();
        let (threshold, pnr) = self.cfg.fine_resync_thresholds();
        match sync::acquire(&window, &self.reference, self.cfg.decimation, threshold, pnr, None) {
            Some(acq) => {
                self.sample_offset = start + acq.sample_offset;
                self.peak_negative = acq.peak_correlation < 0.0;
                self.correlation = acq.peak_correlation.abs();
                self.consecutive_weak = 0;
                self.llr_history.clear();
            }
            None => self.drop_to_search(),
        }
    }

    fn drop_to_search(&mut self) {
        self.mode = Mode::Search;
        self.consecutive_weak = 0;
        self.consecutive_failures = 0;
        self.llr_history.clear();
        self.correlation = 0.0;
        self.observer.sync_lost();
    }

    /// Drop samples that can no longer be needed, keeping a guard window
    /// wide enough for a fine re-sync to look backward.
    fn compact(&mut self) {
        let guard = self.reference.len().max(self.cfg.samples_per_bit());
        if self.sample_offset > guard {
            let drain = self.sample_offset - guard;
            for _ in 0..drain {
                self.buffer.pop_front();
            }
            self.absolute_base += drain as u64;
            self.sample_offset = guard;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framer;
    use crate::ldpc::Variant;
    use crate::modulator;

    fn small_config() -> Config {
        Config {
            sequence_length: 31,
            seed: 0b10101,
            samples_per_phase: 4,
            sample_rate: 44_100.0,
            carrier_freq: 11_200.0,
            decimation: 4,
            ..Config::default()
        }
    }

    #[test]
    fn starts_in_search_and_unlocked() {
        let demod = Demodulator::new(small_config()).unwrap();
        let state = demod.sync_state();
        assert_eq!(state.mode, Mode::Search);
        assert!(!state.locked);
        assert_eq!(state.snr_db, 0.0);
    }

    #[test]
    fn snr_mapping_spans_its_declared_range() {
        assert_eq!(estimate_snr_db(0.3), 0.0);
        assert_eq!(estimate_snr_db(1.0), 20.0);
        assert!((estimate_snr_db(0.65) - 10.0).abs() < 1e-9);
        // Clamped outside [0.3, 1.0].
        assert_eq!(estimate_snr_db(0.0), 0.0);
        assert_eq!(estimate_snr_db(1.5), 20.0);
    }

    #[test]
    fn tracking_updates_snr_from_the_acquisition_peak() {
        let cfg = small_config();
        let payload = vec![0x5Au8];
        let wire_bits = framer::build(&payload, 1, 0, Variant::N16).unwrap();
        let samples = modulator::modulate(&wire_bits, &cfg).unwrap();

        let mut demod = Demodulator::new(cfg).unwrap();
        demod.add_samples(&samples);
        demod.add_samples(&[0.0; 50]);
        let _ = demod.poll_frames();

        let state = demod.sync_state();
        assert!(state.locked);
        assert_eq!(state.snr_db, estimate_snr_db(state.correlation));
        assert!(state.snr_db > 0.0);
    }

    #[test]
    fn acquires_and_recovers_a_frame() {
        let cfg = small_config();
        let payload = vec![0x5Au8];
        let wire_bits = framer::build(&payload, 1, 0, Variant::N16).unwrap();
        let samples = modulator::modulate(&wire_bits, &cfg).unwrap();

        let mut demod = Demodulator::new(cfg).unwrap();
        demod.add_samples(&samples);
        demod.add_samples(&[0.0; 50]); // shy of one bit period: no trailing noise bit gets tracked

        // `poll_frames` only drains up to `MAX_ITERATIONS` state-machine
        // steps per call, so a frame longer than that takes a few calls.
        let mut frames = Vec::new();
        for _ in 0..5 {
            frames.extend(demod.poll_frames());
            if !frames.is_empty() {
                break;
            }
        }
        assert_eq!(frames.len(), 1, "expected one recovered frame");
        assert_eq!(frames[0].payload, payload);
        assert!(demod.sync_state().locked);
    }

    #[test]
    fn chunked_delivery_yields_same_frame() {
        let cfg = small_config();
        let payload = vec![0x11u8, 0x22];
        let wire_bits = framer::build(&payload, 4, 0, Variant::N32).unwrap();
        let samples = modulator::modulate(&wire_bits, &cfg).unwrap();

        let mut demod = Demodulator::new(cfg).unwrap();
        let mut frames = Vec::new();
        for chunk in samples.chunks(128) {
            demod.add_samples(chunk);
            frames.extend(demod.poll_frames());
        }
        demod.add_samples(&vec![0.0; 200]);
        frames.extend(demod.poll_frames());

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, payload);
    }

    #[test]
    fn reset_clears_lock_state() {
        let cfg = small_config();
        let payload = vec![0x01u8];
        let wire_bits = framer::build(&payload, 0, 0, Variant::N16).unwrap();
        let samples = modulator::modulate(&wire_bits, &cfg).unwrap();

        let mut demod = Demodulator::new(cfg).unwrap();
        demod.add_samples(&samples);
        let _ = demod.poll_frames();
        assert!(demod.sync_state().locked);

        demod.reset();
        let state = demod.sync_state();
        assert_eq!(state.mode, Mode::Search);
        assert!(!state.locked);
    }

    #[test]
    fn clear_buffers_preserves_mode_but_drops_samples() {
        let cfg = small_config();
        let payload = vec![0x01u8];
        let wire_bits = framer::build(&payload, 0, 0, Variant::N16).unwrap();
        let samples = modulator::modulate(&wire_bits, &cfg).unwrap();

        let mut demod = Demodulator::new(cfg).unwrap();
        demod.add_samples(&samples);
        let _ = demod.poll_frames();
        let mode_before = demod.sync_state().mode;

        demod.clear_buffers();
        assert_eq!(demod.sync_state().mode, mode_before);
        assert!(demod.buffer.is_empty());
    }
}

