//! pyra-core: Shared types for the Pyra LED visualization engine
//!
//! This crate provides the foundational types used across all Pyra crates:
//! - `Rgb` / `PixelMatrix` - the frame format flowing through the pipeline
//! - `AudioControl` - the fused audio signal consumed by generators
//! - `DeviceConfig` - device geometry and wiring, loaded once at startup
//! - `LedMapper` - precomputed logical-to-physical LED index mapping
//! - `PyraError` - shared error type

mod color;
mod config;
mod control;
mod error;
mod mapper;
mod matrix;

pub use color::*;
pub use config::*;
pub use control::*;
pub use error::*;
pub use mapper::*;
pub use matrix::*;
