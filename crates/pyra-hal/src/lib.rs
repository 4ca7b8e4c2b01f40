//! pyra-hal: Hardware abstraction seams for the Pyra engine
//!
//! The core interacts with the outside world only through these traits:
//! - `SystemTime` - monotonic clock and interrupt gating
//! - `PdmMic` - asynchronous PDM microphone driver
//! - `LedStrip` - buffered LED strip driver
//!
//! Hardware implementations live with the host firmware; this crate ships
//! mock implementations for host-side testing.

mod mic;
mod mock;
mod strip;
mod time;

pub use mic::*;
pub use mock::*;
pub use strip::*;
pub use time::*;
