//! Post-processing effects
//!
//! An effect reads and writes the intermediate frame in place, between the
//! generator and the renderer. `NoOp` exists so that "no effect" needs no
//! conditional in the pipeline.

use serde::{Deserialize, Serialize};

use pyra_core::{hsv_to_rgb, rgb_to_hsv, PixelMatrix};

/// Effect selector for the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    #[default]
    None,
    HueRotation,
}

/// Identity pass-through.
#[derive(Debug, Default)]
pub struct NoOpEffect;

impl NoOpEffect {
    pub fn apply(&mut self, _matrix: &mut PixelMatrix, _dt: f32) {}

    pub fn reset(&mut self) {}
}

/// Rotates the hue of every pixel, optionally advancing automatically each
/// frame. Achromatic pixels pass through unchanged.
#[derive(Debug, Default)]
pub struct HueRotationEffect {
    hue_shift: f32,
    rotation_speed: f32,
}

impl HueRotationEffect {
    pub fn new(hue_shift: f32, rotation_speed: f32) -> Self {
        Self {
            hue_shift: hue_shift.rem_euclid(1.0),
            rotation_speed,
        }
    }

    pub fn apply(&mut self, matrix: &mut PixelMatrix, dt: f32) {
        if self.rotation_speed != 0.0 {
            self.hue_shift = (self.hue_shift + self.rotation_speed * dt).rem_euclid(1.0);
        }
        if self.hue_shift == 0.0 {
            return;
        }

        for pixel in matrix.pixels_mut() {
            let (h, s, v) = rgb_to_hsv(*pixel);
            if s == 0.0 {
                continue;
            }
            *pixel = hsv_to_rgb(h + self.hue_shift, s, v);
        }
    }

    pub fn reset(&mut self) {
        self.hue_shift = 0.0;
    }

    pub fn set_hue_shift(&mut self, hue_shift: f32) {
        self.hue_shift = hue_shift.rem_euclid(1.0);
    }

    pub fn set_rotation_speed(&mut self, speed: f32) {
        self.rotation_speed = speed;
    }

    pub fn hue_shift(&self) -> f32 {
        self.hue_shift
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyra_core::Rgb;

    #[test]
    fn noop_leaves_frame_untouched() {
        let mut matrix = PixelMatrix::new(3, 3);
        matrix.set(1, 1, Rgb::new(10, 20, 30));
        let before: Vec<_> = matrix.pixels().to_vec();
        NoOpEffect.apply(&mut matrix, 1.0 / 60.0);
        assert_eq!(matrix.pixels(), &before[..]);
    }

    #[test]
    fn half_turn_swaps_red_and_cyan() {
        let mut matrix = PixelMatrix::new(1, 1);
        matrix.set(0, 0, Rgb::new(255, 0, 0));
        let mut effect = HueRotationEffect::new(0.5, 0.0);
        effect.apply(&mut matrix, 1.0 / 60.0);
        assert_eq!(matrix.get(0, 0), Rgb::new(0, 255, 255));
    }

    #[test]
    fn achromatic_pixels_unchanged() {
        let mut matrix = PixelMatrix::new(2, 1);
        matrix.set(0, 0, Rgb::new(128, 128, 128));
        matrix.set(1, 0, Rgb::BLACK);
        let mut effect = HueRotationEffect::new(0.33, 0.0);
        effect.apply(&mut matrix, 1.0 / 60.0);
        assert_eq!(matrix.get(0, 0), Rgb::new(128, 128, 128));
        assert_eq!(matrix.get(1, 0), Rgb::BLACK);
    }

    #[test]
    fn auto_rotation_advances_with_dt() {
        let mut matrix = PixelMatrix::new(1, 1);
        let mut effect = HueRotationEffect::new(0.0, 0.5);
        effect.apply(&mut matrix, 0.1);
        assert!((effect.hue_shift() - 0.05).abs() < 1e-6);
        // Wraps modulo 1
        effect.set_hue_shift(0.99);
        effect.apply(&mut matrix, 0.1);
        assert!(effect.hue_shift() < 0.99);
    }
}
