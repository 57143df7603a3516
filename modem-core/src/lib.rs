//! DSSS-DPSK acoustic data modem physical layer: a chip-rate matched
//! filter synchroniser, a streaming demodulator with acquisition/tracking,
//! an LDPC-coded framer, and the control surface tying them together.
//!
//! The audio host, message transport, and any sibling radios (FSK,
//! XModem) are external collaborators and out of scope for this crate.

pub mod config;
pub mod control;
pub mod errors;
pub mod framer;
pub mod ldpc;
pub mod logging;
pub mod modulator;
pub mod observer;
pub mod primitives;
pub mod streaming;
pub mod sync;
pub mod types;

pub mod channel;

pub use config::Config;
pub use control::Transceiver;
pub use errors::{Cancelled, ConfigError, FramingError, ModemError, Result};
pub use framer::{Frame, FramerStats};
pub use ldpc::Variant as LdpcVariant;
pub use observer::{NullObserver, Observer};
pub use streaming::{Demodulator, Mode, SyncState};
