//! Device configuration
//!
//! Loaded once at startup from whatever persistent store the host provides;
//! the core never reads it again. Out-of-range fields are clamped at load
//! time and each clamp is logged once.

use serde::{Deserialize, Serialize};

use crate::{PyraError, PyraResult};

/// Physical orientation of the LED surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Row-major wiring (e.g. bucket totem)
    #[default]
    Horizontal,
    /// Column-serpentine wiring (e.g. tube light)
    Vertical,
}

/// Arrangement of the LEDs in space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// 2-D grid
    #[default]
    Matrix,
    /// Single strand
    Linear,
    /// Scattered placement
    Random,
}

/// Microphone hardware settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicConfig {
    pub sample_rate: u32,
    pub gain: i32,
}

impl Default for MicConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            gain: 20,
        }
    }
}

/// Device geometry and wiring, immutable after load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub name: String,
    pub width: u16,
    pub height: u16,
    pub orientation: Orientation,
    pub layout: Layout,
    /// Global brightness cap handed to the strip driver
    pub brightness: u8,
    pub mic: MicConfig,
    /// Seed for the generators' deterministic RNGs
    pub seed: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "tube".to_string(),
            width: 4,
            height: 15,
            orientation: Orientation::Vertical,
            layout: Layout::Matrix,
            brightness: 128,
            mic: MicConfig::default(),
            seed: 0x50_59_52_41,
        }
    }
}

impl DeviceConfig {
    pub fn from_json_str(json: &str) -> PyraResult<Self> {
        let mut config: DeviceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    #[inline]
    pub fn num_pixels(&self) -> u16 {
        self.width * self.height
    }

    /// Clamp every field to its legal range. Zero-area surfaces are the only
    /// unrecoverable input.
    pub fn validate(&mut self) -> PyraResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PyraError::InvalidConfig(format!(
                "zero-area surface {}x{}",
                self.width, self.height
            )));
        }

        if self.width > 255 {
            log::warn!("config: width {} clamped to 255", self.width);
            self.width = 255;
        }
        if self.height > 255 {
            log::warn!("config: height {} clamped to 255", self.height);
            self.height = 255;
        }
        if self.layout == Layout::Linear && self.height != 1 {
            log::warn!(
                "config: linear layout forces height 1 (was {})",
                self.height
            );
            self.height = 1;
        }
        if !(8_000..=48_000).contains(&self.mic.sample_rate) {
            log::warn!(
                "config: sample rate {} clamped to 8000..48000",
                self.mic.sample_rate
            );
            self.mic.sample_rate = self.mic.sample_rate.clamp(8_000, 48_000);
        }
        if !(0..=80).contains(&self.mic.gain) {
            log::warn!("config: mic gain {} clamped to 0..80", self.mic.gain);
            self.mic.gain = self.mic.gain.clamp(0, 80);
        }
        Ok(())
    }
}
