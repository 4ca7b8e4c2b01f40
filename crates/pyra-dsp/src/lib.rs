//! pyra-dsp: Audio analysis for the Pyra LED engine
//!
//! Real-time, allocation-free feature extraction from a mono PCM stream:
//! - `SampleAccumulator` - interrupt-side per-frame sample statistics
//! - `AdaptiveMic` - auto-ranging normalization, hardware AGC, and
//!   amplitude-domain transient detection
//! - `AudioController` - autocorrelation tempo tracking plus a
//!   phase-locked beat oscillator, fused into an `AudioControl`
//!
//! Everything here runs on the main loop except `SampleAccumulator::ingest`,
//! which is invoked from the microphone driver callback.

mod accumulator;
mod controller;
mod filters;
mod mic;

pub use accumulator::*;
pub use controller::*;
pub use filters::*;
pub use mic::*;
