//! The control surface: a message-passing API between the control
//! context and the demodulator/modulator pair.
//!
//! `add_samples` is the audio-callback-context operation: it talks to the
//! shared, mutex-guarded `Demodulator` directly, never touching the
//! request queue, so a slow control-context request never blocks audio
//! ingestion. `configure`/`modulate`/`demodulate`/`reset` are delivered
//! through a single `crossbeam` channel request queue processed by one
//! worker thread, so only one of them runs at a time. `abort` is a
//! lock-free `Arc<AtomicBool>` flag so it can interrupt a blocking
//! `demodulate` without waiting behind it in the queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, Sender};

use crate::config::Config;
use crate::errors::{Cancelled, ConfigError, ModemError};
use crate::framer;
use crate::ldpc::Variant;
use crate::modulator;
use crate::streaming::{Demodulator, SyncState};
use crate::types::Sample;

#[derive(Debug, Clone)]
enum ControlMessage {
    Configure(Config),
    Modulate(Vec<u8>),
    Demodulate,
    Reset,
}

enum Reply {
    Ok,
    Bytes(Vec<u8>),
    Samples(Vec<Sample>),
    Err(ModemError),
}

struct Request {
    message: ControlMessage,
    reply: Sender<Reply>,
}

/// Poll interval while a `demodulate` request waits for a frame.
const DEMODULATE_POLL: Duration = Duration::from_millis(2);

/// A running transceiver: owns the worker thread and the shared, locked
/// demodulator.
pub struct Transceiver {
    sender: Sender<Request>,
    demod: Arc<Mutex<Demodulator>>,
    cancel: Arc<AtomicBool>,
    _worker: JoinHandle<()>,
}

impl Transceiver {
    pub fn new(cfg: Config) -> Result<Self, ConfigError> {
        let demod = Arc::new(Mutex::new(Demodulator::new(cfg.clone())?));
        let cancel = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = bounded::<Request>(64);

        let worker_demod = Arc::clone(&demod);
        let worker_cancel = Arc::clone(&cancel);
        let worker = thread::spawn(move || {
            let mut modulator_cfg = cfg;
            while let Ok(req) = receiver.recv() {
                let reply = match req.message {
                    ControlMessage::Configure(new_cfg) => {
                        let mut d = worker_demod.lock().expect("demodulator mutex poisoned");
                        match d.configure(new_cfg.clone()) {
                            Ok(()) => {
                                modulator_cfg = new_cfg;
                                Reply::Ok
                            }
                            Err(e) => Reply::Err(ModemError::Config(e)),
                        }
                    }
                    ControlMessage::Modulate(bytes) => {
                        worker_cancel.store(false, Ordering::SeqCst);
                        match modulate_all(&bytes, &modulator_cfg, &worker_cancel) {
                            Some(samples) => Reply::Samples(samples),
                            None => Reply::Err(ModemError::Cancelled(Cancelled)),
                        }
                    }
                    ControlMessage::Demodulate => {
                        worker_cancel.store(false, Ordering::SeqCst);
                        loop {
                            if worker_cancel.load(Ordering::SeqCst) {
                                break Reply::Err(ModemError::Cancelled(Cancelled));
                            }
                            let frame = {
                                let mut d = worker_demod.lock().expect("demodulator mutex poisoned");
                                d.poll_frames().into_iter().next()
                            };
                            if let Some(frame) = frame {
                                break Reply::Bytes(frame.payload);
                            }
                            thread::sleep(DEMODULATE_POLL);
                        }
                    }
                    ControlMessage::Reset => {
                        worker_demod.lock().expect("demodulator mutex poisoned").reset();
                        Reply::Ok
                    }
                };
                let _ = req.reply.send(reply);
            }
        });

        Ok(Self { sender, demod, cancel, _worker: worker })
    }

    fn call(&self, message: ControlMessage) -> Reply {
        let (reply_tx, reply_rx) = bounded(1);
        if self.sender.send(Request { message, reply: reply_tx }).is_err() {
            return Reply::Err(ModemError::Cancelled(Cancelled));
        }
        reply_rx.recv().unwrap_or(Reply::Err(ModemError::Cancelled(Cancelled)))
    }

    pub fn configure(&self, cfg: Config) -> Result<(), ModemError> {
        match self.call(ControlMessage::Configure(cfg)) {
            Reply::Ok => Ok(()),
            Reply::Err(e) => Err(e),
            _ => unreachable!("configure always replies Ok or Err"),
        }
    }

    /// Audio-callback-context operation: append samples directly, bypassing
    /// the control queue entirely.
    pub fn add_samples(&self, block: &[Sample]) {
        self.demod.lock().expect("demodulator mutex poisoned").add_samples(block);
    }

    pub fn sync_state(&self) -> SyncState {
        self.demod.lock().expect("demodulator mutex poisoned").sync_state()
    }

    pub fn stats(&self) -> crate::framer::FramerStats {
        self.demod.lock().expect("demodulator mutex poisoned").stats()
    }

    /// Modulate `bytes` into a sample stream, splitting across as many
    /// frames as needed and framing each chunk with the smallest variant
    /// that holds it exactly. Suspends until generation completes or is
    /// cancelled by `abort()`.
    pub fn modulate(&self, bytes: &[u8]) -> Result<Vec<Sample>, ModemError> {
        match self.call(ControlMessage::Modulate(bytes.to_vec())) {
            Reply::Samples(s) => Ok(s),
            Reply::Err(e) => Err(e),
            _ => unreachable!("modulate always replies Samples or Err"),
        }
    }

    /// Suspends until at least one frame has been decoded, or cancelled.
    pub fn demodulate(&self) -> Result<Vec<u8>, ModemError> {
        match self.call(ControlMessage::Demodulate) {
            Reply::Bytes(b) => Ok(b),
            Reply::Err(e) => Err(e),
            _ => unreachable!("demodulate always replies Bytes or Err"),
        }
    }

    pub fn reset(&self) -> Result<(), ModemError> {
        self.cancel.store(true, Ordering::SeqCst);
        match self.call(ControlMessage::Reset) {
            Reply::Ok => Ok(()),
            Reply::Err(e) => Err(e),
            _ => unreachable!("reset always replies Ok or Err"),
        }
    }

    /// Cancel the in-flight `modulate`/`demodulate`, if any. Lock-free:
    /// never waits behind a blocking request.
    pub fn abort(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

/// Smallest LDPC variant whose payload capacity holds `len` bytes, so a
/// short chunk doesn't get padded out to a larger frame than it needs.
fn smallest_variant_for(len: usize) -> Variant {
    [Variant::N16, Variant::N32, Variant::N64, Variant::N128]
        .into_iter()
        .find(|v| v.k() / 8 >= len)
        .unwrap_or(Variant::N128)
}

/// Split `bytes` across consecutive frames (chunked at `N128`'s capacity,
/// each chunk framed with the smallest variant that fits it), checking
/// `cancel` between frames so an abort drops the remainder without
/// emitting it.
fn modulate_all(bytes: &[u8], cfg: &Config, cancel: &AtomicBool) -> Option<Vec<Sample>> {
    let chunk_bytes = Variant::N128.k() / 8;
    let mut samples = Vec::new();
    for (seq, chunk) in bytes.chunks(chunk_bytes.max(1)).enumerate() {
        if cancel.load(Ordering::SeqCst) {
            return None;
        }
        let variant = smallest_variant_for(chunk.len());
        let bits = framer::build(chunk, (seq % 256) as u8, 0, variant).ok()?;
        samples.extend(modulator::modulate(&bits, cfg).ok()?);
    }
    Some(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn modulate_then_demodulate_round_trips() {
        let cfg = small_config();
        let tx = Transceiver::new(cfg.clone()).unwrap();
        let rx = Transceiver::new(cfg).unwrap();

        let samples = tx.modulate(b"hi").unwrap();
        rx.add_samples(&samples);
        rx.add_samples(&vec![0.0; 500]);

        let recovered = rx.demodulate().unwrap();
        assert_eq!(recovered, b"hi");
    }

    #[test]
    fn abort_cancels_pending_demodulate() {
        let cfg = small_config();
        let rx = Transceiver::new(cfg).unwrap();
        // Never feed samples in; demodulate would block forever without abort.
        let handle = {
            let rx = &rx;
            std::thread::scope(|s| {
                let t = s.spawn(move || rx.demodulate());
                std::thread::sleep(Duration::from_millis(20));
                rx.abort();
                t.join().unwrap()
            })
        };
        assert!(matches!(handle, Err(ModemError::Cancelled(_))));
    }

    #[test]
    fn configure_rejects_invalid_and_retains_prior() {
        let cfg = small_config();
        let tx = Transceiver::new(cfg).unwrap();
        let bad = Config { sequence_length: 9, ..small_config() };
        assert!(tx.configure(bad).is_err());
        // Still usable with the original configuration.
        assert!(tx.modulate(b"x").is_ok());
    }
}
