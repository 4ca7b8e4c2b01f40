//! Unified audio control signal
//!
//! Synthesizes the whole audio analysis chain into a handful of parameters.
//! Generators receive this struct and don't need to know about microphone
//! processing, tempo estimation, or beat tracking internals.

use serde::{Deserialize, Serialize};

/// Fused audio control vector, rebuilt every frame by the audio controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioControl {
    /// Overall audio energy, smoothed and normalized (0.0 - 1.0).
    /// Use for baseline intensity, brightness, activity level.
    pub energy: f32,

    /// Transient/hit intensity with rhythmic context (0.0 - 1.0).
    /// One-shot: nonzero only on the frame a transient fires.
    /// Use for sparks, flashes, bursts, event triggers.
    pub pulse: f32,

    /// Beat phase position (0.0 - 1.0). 0.0 = on-beat, 0.5 = off-beat,
    /// wraps back to 0 on the next beat. Only meaningful when
    /// `rhythm_strength` is high.
    pub phase: f32,

    /// Confidence in the detected rhythm pattern (0.0 - 1.0).
    /// 0.0 = no rhythm (use organic behavior), 1.0 = strong lock
    /// (use beat-synced behavior).
    pub rhythm_strength: f32,

    /// Smoothed onsets per second (EMA, typically 0-10).
    pub onset_density: f32,

    /// True when hardware gain is at minimum and the signal is still
    /// saturating the input stage.
    pub loud_mode: bool,
}

impl AudioControl {
    /// Convert phase to pulse intensity: 1.0 on-beat, 0.0 off-beat.
    /// Useful for breathing/pulsing effects synchronized to the beat.
    #[inline]
    pub fn phase_to_pulse(&self) -> f32 {
        0.5 + 0.5 * (self.phase * std::f32::consts::TAU).cos()
    }

    /// Phase distance from the nearest beat: 0.0 on-beat, 0.5 off-beat.
    #[inline]
    pub fn distance_from_beat(&self) -> f32 {
        if self.phase < 0.5 {
            self.phase
        } else {
            1.0 - self.phase
        }
    }

    /// Whether generators should use beat-locked behavior.
    #[inline]
    pub fn has_rhythm(&self) -> bool {
        self.rhythm_strength > 0.5
    }
}
