//! Pure, allocation-light building blocks: M-sequence generation, DSSS
//! spreading/despreading, DPSK modulation, carrier up/down-conversion,
//! and phase unwrapping. Each submodule is independently testable and has
//! no knowledge of frames, sync state, or I/O.

pub mod carrier;
pub mod dpsk;
pub mod dsss;
pub mod mseq;
pub mod phase;
