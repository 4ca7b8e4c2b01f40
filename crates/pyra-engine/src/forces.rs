//! Shared force integration
//!
//! Every generator integrates its particles under the same forces:
//! `v <- v*drag + (gravity + wind)*dt`, `p <- p + v*dt`, with per-particle
//! flags selecting which accelerations apply. Wind carries a simplex-noise
//! variation so it drifts organically instead of blowing constantly.

use noise::{NoiseFn, Simplex};

use crate::{Particle, ParticleFlags};

/// 3-D simplex noise remapped from [-1, 1] to [0, 1]. All backdrop
/// rendering goes through this.
#[inline]
pub fn noise01(noise: &Simplex, x: f32, y: f32, z: f32) -> f32 {
    (noise.get([x as f64, y as f64, z as f64]) as f32 + 1.0) * 0.5
}

pub struct Forces {
    pub gravity: f32,
    pub wind_base: f32,
    pub wind_variation: f32,
    pub drag: f32,
    wind_noise: Simplex,
}

impl Forces {
    pub fn new(gravity: f32, wind_base: f32, wind_variation: f32, drag: f32, seed: u32) -> Self {
        Self {
            gravity,
            wind_base,
            wind_variation,
            drag,
            wind_noise: Simplex::new(seed),
        }
    }

    /// Current wind acceleration. `t` is the generator's animation clock.
    pub fn wind_at(&self, t: f32) -> f32 {
        let variation = self.wind_noise.get([t as f64, 0.0, 0.0]) as f32;
        self.wind_base + variation * self.wind_variation
    }

    /// One integration step. The wind sample is hoisted by the caller so
    /// all particles in a frame see the same wind.
    #[inline]
    pub fn apply(&self, p: &mut Particle, dt: f32, wind: f32) {
        let mut ax = 0.0;
        let mut ay = 0.0;
        if p.has_flag(ParticleFlags::GRAVITY) {
            ay += self.gravity;
        }
        if p.has_flag(ParticleFlags::WIND) {
            ax += wind;
        }
        p.vx = p.vx * self.drag + ax * dt;
        p.vy = p.vy * self.drag + ay * dt;
        p.x += p.vx * dt;
        p.y += p.vy * dt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forces() -> Forces {
        Forces::new(10.0, 0.0, 0.0, 1.0, 7)
    }

    #[test]
    fn gravity_only_applies_when_flagged() {
        let f = forces();
        let mut with = Particle {
            flags: ParticleFlags::GRAVITY,
            intensity: 10,
            lifespan: 10,
            ..Default::default()
        };
        let mut without = Particle {
            flags: ParticleFlags::empty(),
            ..with
        };
        f.apply(&mut with, 0.1, 0.0);
        f.apply(&mut without, 0.1, 0.0);
        assert!(with.vy > 0.0);
        assert_eq!(without.vy, 0.0);
    }

    #[test]
    fn drag_decays_velocity() {
        let f = Forces::new(0.0, 0.0, 0.0, 0.9, 7);
        let mut p = Particle {
            vx: 10.0,
            intensity: 10,
            lifespan: 10,
            flags: ParticleFlags::empty(),
            ..Default::default()
        };
        f.apply(&mut p, 0.016, 0.0);
        assert!((p.vx - 9.0).abs() < 1e-5);
    }

    #[test]
    fn wind_varies_over_time_within_bounds() {
        let f = Forces::new(0.0, 0.5, 0.25, 1.0, 7);
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for i in 0..200 {
            let w = f.wind_at(i as f32 * 0.1);
            min = min.min(w);
            max = max.max(w);
        }
        assert!(min >= 0.25 - 1e-3 && max <= 0.75 + 1e-3);
        assert!(max - min > 0.01, "wind should actually vary");
    }
}
