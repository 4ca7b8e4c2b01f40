//! Lightning generator
//!
//! Bolts are Bresenham-sampled lines of stationary particles that share an
//! intensity and fade out fast; young samples may throw short branches at
//! random angles. Everything max-blends so the brightest bolt wins on
//! overlap. The storm-sky backdrop dips between beats and lifts on them
//! (tension and release, the inverse of fire's pump).

use noise::Simplex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use pyra_core::{AudioControl, DeviceConfig, PixelMatrix, Rgb};

use crate::fire::clamp_unit;
use crate::{noise01, Particle, ParticleFlags, ParticlePool};

const LIGHTNING_POOL_SIZE: usize = 32;

/// Hard cap on samples per bolt so one strike can't drain the pool.
const MAX_BOLT_SAMPLES: usize = 12;

/// Branching window: a sample may branch only while this young.
const BRANCH_AGE_MIN: u16 = 2;
const BRANCH_AGE_MAX: u16 = 8;

const MAX_BRANCHES_PER_FRAME: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightningParams {
    pub base_spawn_chance: f32,
    pub audio_spawn_boost: f32,
    pub intensity_min: u8,
    pub intensity_max: u8,
    pub lifespan: u16,
    /// Intensity lost per frame; bolts are short and bright
    pub fade_rate: u8,
    /// Percent chance per frame that a young flagged sample branches
    pub branch_chance: u8,
    /// Branches thrown per branching event
    pub branch_count: u8,
    /// Percent of parent intensity lost by branch particles
    pub branch_intensity_loss: u8,
    pub organic_transient_min: f32,
    pub max_particles: usize,
    pub background_level: f32,
}

impl Default for LightningParams {
    fn default() -> Self {
        Self {
            base_spawn_chance: 0.15,
            audio_spawn_boost: 0.3,
            intensity_min: 180,
            intensity_max: 255,
            lifespan: 12,
            fade_rate: 40,
            branch_chance: 25,
            branch_count: 1,
            branch_intensity_loss: 30,
            organic_transient_min: 0.5,
            max_particles: LIGHTNING_POOL_SIZE,
            background_level: 0.12,
        }
    }
}

impl LightningParams {
    pub fn validate(&mut self) {
        clamp_unit(&mut self.base_spawn_chance, "lightning.base_spawn_chance");
        clamp_unit(&mut self.audio_spawn_boost, "lightning.audio_spawn_boost");
        clamp_unit(
            &mut self.organic_transient_min,
            "lightning.organic_transient_min",
        );
        clamp_unit(&mut self.background_level, "lightning.background_level");
        if self.intensity_min > self.intensity_max {
            log::warn!("lightning: intensity range inverted, swapping");
            std::mem::swap(&mut self.intensity_min, &mut self.intensity_max);
        }
        if self.branch_chance > 100 {
            log::warn!("lightning: branch_chance clamped to 100");
            self.branch_chance = 100;
        }
        if self.branch_intensity_loss > 100 {
            log::warn!("lightning: branch_intensity_loss clamped to 100");
            self.branch_intensity_loss = 100;
        }
        if self.lifespan == 0 {
            log::warn!("lightning: lifespan clamped to 1");
            self.lifespan = 1;
        }
        if self.max_particles > LIGHTNING_POOL_SIZE {
            log::warn!("lightning: max_particles clamped to {LIGHTNING_POOL_SIZE}");
            self.max_particles = LIGHTNING_POOL_SIZE;
        }
    }
}

/// White-blue bolt core with violet falloff.
fn bolt_color(intensity: u8) -> Rgb {
    let i = intensity as u16;
    Rgb::new(
        ((i * 9 / 10) + 20).min(255) as u8,
        (i * 3 / 4) as u8,
        i.min(255) as u8,
    )
}

pub struct Lightning {
    width: i32,
    height: i32,
    params: LightningParams,
    pool: ParticlePool,
    backdrop_noise: Simplex,
    rng: SmallRng,
    seed: u64,
    noise_time: f32,
    prev_phase: f32,
}

impl Lightning {
    pub fn new(config: &DeviceConfig, mut params: LightningParams) -> Self {
        params.validate();
        Self {
            width: config.width as i32,
            height: config.height as i32,
            params,
            pool: ParticlePool::new(LIGHTNING_POOL_SIZE),
            backdrop_noise: Simplex::new(config.seed as u32),
            rng: SmallRng::seed_from_u64(config.seed ^ 0x424F4C54),
            seed: config.seed ^ 0x424F4C54,
            noise_time: 0.0,
            prev_phase: 0.0,
        }
    }

    pub fn generate(&mut self, matrix: &mut PixelMatrix, audio: &AudioControl, _dt: f32) {
        let time_speed = if audio.has_rhythm() {
            0.025 + 0.02 * audio.energy
        } else {
            0.01 + 0.005 * audio.energy
        };
        self.noise_time += time_speed;

        self.render_backdrop(matrix, audio);
        self.spawn_strikes(audio);
        self.update_bolts();
        self.composite(matrix);

        self.prev_phase = audio.phase;
    }

    pub fn reset(&mut self) {
        self.pool.reset();
        self.rng = SmallRng::seed_from_u64(self.seed);
        self.noise_time = 0.0;
        self.prev_phase = 0.0;
    }

    pub fn active_count(&self) -> usize {
        self.pool.active_count()
    }

    pub fn params(&self) -> &LightningParams {
        &self.params
    }

    pub fn set_params(&mut self, mut params: LightningParams) {
        params.validate();
        self.params = params;
    }

    pub fn particles(&self) -> impl Iterator<Item = &Particle> {
        self.pool.iter_alive()
    }

    /// Storm sky: sunset glow at the horizon, purple storm clouds in the
    /// middle band, dark night blue at the top.
    fn render_backdrop(&mut self, matrix: &mut PixelMatrix, audio: &AudioControl) {
        // Darken between beats, lift slightly on them
        let storm_intensity = if audio.has_rhythm() {
            0.5 + 0.5 * audio.phase_to_pulse()
        } else {
            1.0
        };

        for y in 0..self.height {
            let normalized_y = y as f32 / (self.height - 1).max(1) as f32;
            for x in 0..self.width {
                let nx = x as f32 * 0.1;
                let ny = y as f32 * 0.1;

                let cloud1 = noise01(&self.backdrop_noise, nx, ny, self.noise_time);
                let cloud2 = noise01(
                    &self.backdrop_noise,
                    nx * 2.0,
                    ny * 2.0,
                    self.noise_time * 1.2,
                );
                let combined = cloud1 * 0.7 + cloud2 * 0.3;

                let intensity =
                    (combined * storm_intensity * self.params.background_level).clamp(0.0, 1.0);
                let level = (intensity * 255.0) as f32;

                let color = if normalized_y > 0.7 {
                    // Horizon glow
                    let horizon = (normalized_y - 0.7) / 0.3;
                    Rgb::new(
                        (level * (0.6 + 0.4 * horizon)) as u8,
                        (level * (0.2 + 0.2 * horizon)) as u8,
                        (level * 0.3) as u8,
                    )
                } else if normalized_y > 0.3 {
                    // Storm clouds
                    Rgb::new((level * 0.4) as u8, (level * 0.1) as u8, (level * 0.5) as u8)
                } else {
                    // Night sky
                    Rgb::new(
                        (level * 0.15) as u8,
                        (level * 0.1) as u8,
                        (level * 0.4) as u8,
                    )
                };
                matrix.set(x, y, color);
            }
        }
    }

    fn spawn_strikes(&mut self, audio: &AudioControl) {
        let mut spawn_prob = self.params.base_spawn_chance;
        let mut bolt_count: u32 = 0;

        if audio.has_rhythm() {
            let phase_pulse = audio.phase_to_pulse();
            // Tension between beats, release on them
            spawn_prob *= 0.3 + 0.7 * phase_pulse;
            spawn_prob += self.params.audio_spawn_boost * audio.pulse * phase_pulse;

            if audio.phase < self.prev_phase {
                let base = 2.0 + 2.0 * audio.rhythm_strength;
                bolt_count = (base * (0.5 + 0.5 * audio.energy)) as u32;
            }
        } else {
            let smooth_energy = 0.2 + 0.3 * audio.energy;
            spawn_prob *= smooth_energy;

            if audio.pulse > self.params.organic_transient_min {
                let strength = (audio.pulse - self.params.organic_transient_min)
                    / (1.0 - self.params.organic_transient_min);
                if strength > 0.5 {
                    bolt_count = 1;
                }
            }
        }

        if self.rng.random::<f32>() < spawn_prob {
            bolt_count += 1;
        }

        for _ in 0..bolt_count {
            if self.pool.active_count() >= self.params.max_particles {
                break;
            }
            let x0 = self.rng.random_range(0.0..self.width as f32);
            let y0 = self.rng.random_range(0.0..self.height as f32);
            let x1 = self.rng.random_range(0.0..self.width as f32);
            let y1 = self.rng.random_range(0.0..self.height as f32);

            let mut intensity = self
                .rng
                .random_range(self.params.intensity_min..=self.params.intensity_max);
            if audio.has_rhythm() {
                intensity = (intensity as f32 * (0.6 + 0.4 * audio.phase_to_pulse())) as u8;
            }

            self.spawn_bolt(x0, y0, x1, y1, intensity);
        }
    }

    /// Spawn one bolt: a Bresenham-sampled line of stationary particles,
    /// all sharing `intensity`, each jittered slightly off the line.
    pub fn spawn_bolt(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, intensity: u8) {
        let dx = (x1 as i32 - x0 as i32).abs();
        let dy = (y1 as i32 - y0 as i32).abs();
        let steps = (dx.max(dy) as usize).min(MAX_BOLT_SAMPLES - 1);
        if steps == 0 {
            return;
        }

        let x_step = (x1 - x0) / steps as f32;
        let y_step = (y1 - y0) / steps as f32;

        for step in 0..=steps {
            if self.pool.active_count() >= self.params.max_particles {
                break;
            }
            let jitter_x = self.rng.random_range(-0.3..0.3);
            let jitter_y = self.rng.random_range(-0.3..0.3);
            self.pool.spawn(Particle {
                x: x0 + x_step * step as f32 + jitter_x,
                y: y0 + y_step * step as f32 + jitter_y,
                vx: 0.0,
                vy: 0.0,
                intensity,
                age: 0,
                lifespan: self.params.lifespan,
                flags: ParticleFlags::BRANCH,
            });
        }
    }

    /// Age, fade, and branch. Branch events are collected into a fixed
    /// buffer because spawning mid-iteration would alias the pool.
    fn update_bolts(&mut self) {
        let mut branches = [(0.0f32, 0.0f32, 0u8); MAX_BRANCHES_PER_FRAME];
        let mut branch_count = 0;

        let chance = self.params.branch_chance;
        let max_particles = self.params.max_particles;
        let active = self.pool.active_count();

        for p in self.pool.slots_mut() {
            if !p.is_alive() {
                continue;
            }

            if p.has_flag(ParticleFlags::BRANCH)
                && p.age > BRANCH_AGE_MIN
                && p.age < BRANCH_AGE_MAX
                && active < max_particles
                && self.rng.random_range(0..100) < chance as u32
                && branch_count < MAX_BRANCHES_PER_FRAME
            {
                branches[branch_count] = (p.x, p.y, p.intensity);
                branch_count += 1;
                // One branch per sample
                p.clear_flag(ParticleFlags::BRANCH);
            }

            // Fast manual fade on top of aging
            p.intensity = p.intensity.saturating_sub(self.params.fade_rate);
            p.age_step();
        }

        for i in 0..branch_count {
            let (x, y, intensity) = branches[i];
            self.spawn_branch(x, y, intensity);
        }
    }

    /// Short branch lines (3-5 particles) at random angles, at reduced
    /// intensity. Branch particles never branch again.
    fn spawn_branch(&mut self, x0: f32, y0: f32, parent_intensity: u8) {
        let intensity = (parent_intensity as u16 * (100 - self.params.branch_intensity_loss as u16)
            / 100) as u8;

        for _ in 0..self.params.branch_count {
            let length = self.rng.random_range(3..=5u32);
            let needed = length as usize;
            let available = self
                .params
                .max_particles
                .saturating_sub(self.pool.active_count());
            if needed > available {
                return;
            }

            let angle = self.rng.random_range(0.0..std::f32::consts::TAU);
            let x1 = x0 + angle.cos() * length as f32;
            let y1 = y0 + angle.sin() * length as f32;

            for step in 0..length {
                let t = step as f32 / length as f32;
                let jitter_x = self.rng.random_range(-0.2..0.2);
                let jitter_y = self.rng.random_range(-0.2..0.2);
                self.pool.spawn(Particle {
                    x: x0 + (x1 - x0) * t + jitter_x,
                    y: y0 + (y1 - y0) * t + jitter_y,
                    vx: 0.0,
                    vy: 0.0,
                    intensity,
                    age: 0,
                    lifespan: self.params.lifespan / 2,
                    flags: ParticleFlags::empty(),
                });
            }
        }
    }

    fn composite(&mut self, matrix: &mut PixelMatrix) {
        for p in self.pool.iter_alive() {
            matrix.blend_max(p.x as i32, p.y as i32, bolt_color(p.intensity));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DeviceConfig {
        DeviceConfig {
            width: 4,
            height: 15,
            ..Default::default()
        }
    }

    fn no_branching() -> LightningParams {
        LightningParams {
            branch_chance: 0,
            ..Default::default()
        }
    }

    #[test]
    fn bolt_caps_at_twelve_samples() {
        let mut lightning = Lightning::new(&config(), no_branching());
        lightning.spawn_bolt(0.0, 0.0, 3.0, 14.0, 200);
        assert!(lightning.active_count() <= 12);
        assert!(lightning.active_count() >= 2);
    }

    #[test]
    fn bolt_particles_are_stationary() {
        let mut lightning = Lightning::new(&config(), no_branching());
        lightning.spawn_bolt(0.0, 0.0, 3.0, 14.0, 200);
        for p in lightning.particles() {
            assert_eq!(p.vx, 0.0);
            assert_eq!(p.vy, 0.0);
        }
    }

    #[test]
    fn bolts_fade_to_nothing() {
        let mut lightning = Lightning::new(&config(), no_branching());
        let mut matrix = PixelMatrix::new(4, 15);
        lightning.spawn_bolt(0.0, 0.0, 3.0, 14.0, 255);

        // Zero out ambient spawning so only the forced bolt exists
        let mut params = no_branching();
        params.base_spawn_chance = 0.0;
        lightning.set_params(params);

        for _ in 0..12 {
            lightning.generate(&mut matrix, &AudioControl::default(), 1.0 / 60.0);
        }
        assert_eq!(lightning.active_count(), 0);
    }

    #[test]
    fn pool_stays_bounded() {
        let mut lightning = Lightning::new(&config(), LightningParams::default());
        let mut matrix = PixelMatrix::new(4, 15);
        let loud = AudioControl {
            energy: 1.0,
            pulse: 1.0,
            rhythm_strength: 1.0,
            ..Default::default()
        };
        for frame in 0..300 {
            let audio = AudioControl {
                phase: (frame as f32 * 0.11) % 1.0,
                ..loud
            };
            lightning.generate(&mut matrix, &audio, 1.0 / 60.0);
            assert!(lightning.active_count() <= LIGHTNING_POOL_SIZE);
        }
    }

    #[test]
    fn reset_is_idempotent() {
        let mut lightning = Lightning::new(&config(), LightningParams::default());
        let mut matrix = PixelMatrix::new(4, 15);
        for _ in 0..30 {
            lightning.generate(&mut matrix, &AudioControl::default(), 1.0 / 60.0);
        }
        lightning.reset();
        let count_once = lightning.active_count();
        lightning.reset();
        assert_eq!(lightning.active_count(), count_once);
        assert_eq!(count_once, 0);
    }
}
