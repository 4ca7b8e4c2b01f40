//! Fire generator
//!
//! Sparks rise from the bottom row over an animated ember backdrop. Each
//! spark deposits heat into a per-cell heat buffer that cools, diffuses
//! upward, and max-blends over the frame, producing a decaying plume.
//! Particles themselves composite additively so overlapping sparks flare.
//!
//! Two behavior regimes, chosen per-frame from `rhythm_strength`:
//! - Music: spawn probability pumps with beat phase, bursts land on beats
//!   (doubled on backbeats, tripled on downbeats)
//! - Organic: steady gentle spawning scaled by smoothed energy, small
//!   bursts on strong transients

use noise::Simplex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use pyra_core::{AudioControl, DeviceConfig, PixelMatrix, Rgb};

use crate::{noise01, Forces, Particle, ParticleFlags, ParticlePool};

const FIRE_POOL_SIZE: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FireParams {
    /// Baseline per-frame spawn probability
    pub base_spawn_chance: f32,
    /// Extra spawn probability per unit of on-beat pulse
    pub audio_spawn_boost: f32,
    /// Upper bound of the per-cell random cooling subtracted each frame
    pub cooling: u8,
    pub spark_velocity_min: f32,
    pub spark_velocity_max: f32,
    /// Horizontal velocity spread at spawn
    pub spark_spread: f32,
    pub intensity_min: u8,
    pub intensity_max: u8,
    pub lifespan: u16,
    /// Sparks emitted per beat burst before backbeat/downbeat scaling
    pub burst_sparks: u8,
    /// Percent of particle intensity deposited into the heat buffer per step
    pub trail_heat_factor: u8,
    /// Pulse level a transient must exceed to burst in organic mode
    pub organic_transient_min: f32,
    pub max_particles: usize,
    pub gravity: f32,
    pub wind_base: f32,
    pub wind_variation: f32,
    pub drag: f32,
    /// Backdrop brightness scale; keeps embers dim so sparks pop
    pub background_level: f32,
}

impl Default for FireParams {
    fn default() -> Self {
        Self {
            base_spawn_chance: 0.32,
            audio_spawn_boost: 0.3,
            cooling: 85,
            spark_velocity_min: 3.0,
            spark_velocity_max: 8.0,
            spark_spread: 1.5,
            intensity_min: 40,
            intensity_max: 200,
            lifespan: 40,
            burst_sparks: 8,
            trail_heat_factor: 60,
            organic_transient_min: 0.5,
            max_particles: FIRE_POOL_SIZE,
            gravity: 2.0,
            wind_base: 0.0,
            wind_variation: 0.8,
            drag: 0.98,
            background_level: 0.15,
        }
    }
}

impl FireParams {
    pub fn validate(&mut self) {
        clamp_unit(&mut self.base_spawn_chance, "fire.base_spawn_chance");
        clamp_unit(&mut self.audio_spawn_boost, "fire.audio_spawn_boost");
        clamp_unit(&mut self.organic_transient_min, "fire.organic_transient_min");
        clamp_unit(&mut self.background_level, "fire.background_level");
        if self.intensity_min > self.intensity_max {
            log::warn!("fire: intensity_min > intensity_max, swapping");
            std::mem::swap(&mut self.intensity_min, &mut self.intensity_max);
        }
        if self.spark_velocity_min > self.spark_velocity_max {
            log::warn!("fire: spark velocity range inverted, swapping");
            std::mem::swap(&mut self.spark_velocity_min, &mut self.spark_velocity_max);
        }
        if self.trail_heat_factor > 100 {
            log::warn!("fire: trail_heat_factor clamped to 100");
            self.trail_heat_factor = 100;
        }
        if self.lifespan == 0 {
            log::warn!("fire: lifespan clamped to 1");
            self.lifespan = 1;
        }
        if self.max_particles > FIRE_POOL_SIZE {
            log::warn!("fire: max_particles clamped to {FIRE_POOL_SIZE}");
            self.max_particles = FIRE_POOL_SIZE;
        }
    }
}

pub(crate) fn clamp_unit(value: &mut f32, name: &str) {
    if *value < 0.0 || *value > 1.0 {
        log::warn!("{name} {value} clamped to 0..1");
        *value = value.clamp(0.0, 1.0);
    }
}

/// Fire palette: black -> red -> orange -> yellow
pub(crate) fn fire_color(intensity: u8) -> Rgb {
    if intensity < 85 {
        Rgb::new((intensity as u16 * 3).min(255) as u8, 0, 0)
    } else if intensity < 170 {
        Rgb::new(255, ((intensity as u16 - 85) * 3).min(255) as u8, 0)
    } else {
        Rgb::new(255, 255, 0)
    }
}

pub struct Fire {
    width: i32,
    height: i32,
    params: FireParams,
    pool: ParticlePool,
    forces: Forces,
    heat: Vec<u8>,
    backdrop_noise: Simplex,
    rng: SmallRng,
    seed: u64,
    noise_time: f32,
    beat_count: u32,
    prev_phase: f32,
}

impl Fire {
    pub fn new(config: &DeviceConfig, mut params: FireParams) -> Self {
        params.validate();
        let width = config.width as i32;
        let height = config.height as i32;
        Self {
            width,
            height,
            params,
            pool: ParticlePool::new(FIRE_POOL_SIZE),
            forces: Forces::new(
                params.gravity,
                params.wind_base,
                params.wind_variation,
                params.drag,
                config.seed as u32,
            ),
            heat: vec![0; (width * height) as usize],
            backdrop_noise: Simplex::new(config.seed as u32),
            rng: SmallRng::seed_from_u64(config.seed),
            seed: config.seed,
            noise_time: 0.0,
            beat_count: 0,
            prev_phase: 0.0,
        }
    }

    pub fn generate(&mut self, matrix: &mut PixelMatrix, audio: &AudioControl, dt: f32) {
        // Music mode animates faster and pulses with energy
        let time_speed = if audio.has_rhythm() {
            0.04 + 0.03 * audio.energy
        } else {
            0.015 + 0.005 * audio.energy
        };
        self.noise_time += time_speed;

        self.render_backdrop(matrix, audio);
        self.apply_cooling(audio);
        self.spawn_sparks(audio);
        self.integrate(dt);
        self.diffuse_heat();
        self.composite(matrix);

        self.prev_phase = audio.phase;
    }

    pub fn reset(&mut self) {
        self.pool.reset();
        self.heat.fill(0);
        self.rng = SmallRng::seed_from_u64(self.seed);
        self.noise_time = 0.0;
        self.beat_count = 0;
        self.prev_phase = 0.0;
    }

    pub fn active_count(&self) -> usize {
        self.pool.active_count()
    }

    pub fn params(&self) -> &FireParams {
        &self.params
    }

    pub fn set_params(&mut self, mut params: FireParams) {
        params.validate();
        self.forces.gravity = params.gravity;
        self.forces.wind_base = params.wind_base;
        self.forces.wind_variation = params.wind_variation;
        self.forces.drag = params.drag;
        self.params = params;
    }

    /// Ember glow beneath the particles: two octaves of animated simplex
    /// noise with a height falloff, orange toward the flame base.
    fn render_backdrop(&mut self, matrix: &mut PixelMatrix, audio: &AudioControl) {
        let beat_brightness = if audio.has_rhythm() {
            0.6 + 0.4 * audio.phase_to_pulse()
        } else {
            1.0
        };

        for y in 0..self.height {
            let normalized_y = y as f32 / (self.height - 1).max(1) as f32;
            let falloff = 1.0 - 0.7 * normalized_y;
            for x in 0..self.width {
                let nx = x as f32 * 0.15;
                let ny = y as f32 * 0.15;
                let octave1 = noise01(&self.backdrop_noise, nx, ny, self.noise_time);
                let octave2 = noise01(
                    &self.backdrop_noise,
                    nx * 2.0,
                    ny * 2.0,
                    self.noise_time * 1.3,
                );
                let combined = octave1 * 0.7 + octave2 * 0.3;

                let intensity = (combined * falloff * beat_brightness
                    * self.params.background_level)
                    .clamp(0.0, 1.0);
                let level = (intensity * 255.0) as u8;

                let color = if normalized_y < 0.4 {
                    // Orange-red embers near the base
                    Rgb::new(level, (level as f32 * 0.3 * (1.0 - normalized_y)) as u8, 0)
                } else {
                    // Deep red elsewhere
                    Rgb::new(level, (level as f32 * 0.1) as u8, 0)
                };
                matrix.set(x, y, color);
            }
        }
    }

    /// Randomized per-cell cooling. In music mode the cooling budget swings
    /// +/-15 with the beat phase, making flames breathe.
    fn apply_cooling(&mut self, audio: &AudioControl) {
        let mut cooling = self.params.cooling as i32;
        if audio.has_rhythm() {
            let breathe = -(audio.phase * std::f32::consts::TAU).cos();
            cooling = (cooling + (breathe * 15.0) as i32).clamp(0, 255);
        }

        for cell in &mut self.heat {
            let amount = self.rng.random_range(0..=cooling) as u8;
            *cell = cell.saturating_sub(amount);
        }
    }

    fn spawn_sparks(&mut self, audio: &AudioControl) {
        let mut spawn_prob = self.params.base_spawn_chance;
        let mut spark_count: u32 = 0;

        if audio.has_rhythm() {
            let phase_pulse = audio.phase_to_pulse();
            spawn_prob *= 0.5 + 0.5 * phase_pulse;
            spawn_prob += self.params.audio_spawn_boost * audio.pulse * phase_pulse;

            // Phase wrap marks the beat; bursts scale up on backbeats and
            // downbeats
            if audio.phase < self.prev_phase {
                self.beat_count += 1;
                let base = self.params.burst_sparks as u32
                    * if self.beat_count % 4 == 0 {
                        3
                    } else if self.beat_count % 2 == 0 {
                        2
                    } else {
                        1
                    };
                spark_count = (base as f32
                    * (0.4 + 0.6 * audio.rhythm_strength)
                    * (0.5 + 0.5 * audio.energy)) as u32;
            }
        } else {
            let smooth_energy = 0.3 + 0.4 * audio.energy;
            spawn_prob *= smooth_energy;

            if audio.pulse > self.params.organic_transient_min {
                let strength = (audio.pulse - self.params.organic_transient_min)
                    / (1.0 - self.params.organic_transient_min);
                spark_count = (self.params.burst_sparks as f32 * 0.3 * strength) as u32;
            }
        }

        if self.rng.random::<f32>() < spawn_prob {
            spark_count += 1;
        }

        for _ in 0..spark_count {
            if self.pool.active_count() >= self.params.max_particles {
                break;
            }
            let velocity_mult = if audio.has_rhythm() {
                1.0 + 0.3 * audio.pulse
            } else {
                0.8
            };
            let vy = -self
                .rng
                .random_range(self.params.spark_velocity_min..=self.params.spark_velocity_max)
                * velocity_mult;
            let vx = self.rng.random_range(-1.0..1.0) * self.params.spark_spread;

            self.pool.spawn(Particle {
                x: self.rng.random_range(0.0..self.width as f32),
                y: (self.height - 1) as f32,
                vx,
                vy,
                intensity: self
                    .rng
                    .random_range(self.params.intensity_min..=self.params.intensity_max),
                age: 0,
                lifespan: self.params.lifespan,
                flags: ParticleFlags::GRAVITY
                    | ParticleFlags::WIND
                    | ParticleFlags::FADE
                    | ParticleFlags::EMIT_TRAIL,
            });
        }
    }

    fn integrate(&mut self, dt: f32) {
        let wind = self.forces.wind_at(self.noise_time);
        let (width, height) = (self.width, self.height);

        for p in self.pool.slots_mut() {
            if !p.is_alive() {
                continue;
            }
            self.forces.apply(p, dt, wind);

            let (x, y) = (p.x as i32, p.y as i32);
            if x < 0 || x >= width || y < 0 || y >= height {
                p.kill();
                continue;
            }

            if p.has_flag(ParticleFlags::EMIT_TRAIL) {
                let idx = (y * width + x) as usize;
                let deposit = (p.intensity as u16 * self.params.trail_heat_factor as u16 / 100)
                    .min(255) as u8;
                self.heat[idx] = self.heat[idx].saturating_add(deposit);
            }

            p.age_step();
        }
    }

    /// Upward heat propagation: each cell becomes a weighted average of the
    /// row(s) below it, decayed so the plume fades as it rises. Processed
    /// top-down so each pass reads un-diffused values from below.
    fn diffuse_heat(&mut self) {
        let (width, height) = (self.width, self.height);
        for y in 0..height - 2 {
            for x in 0..width {
                let below = self.heat[((y + 1) * width + x) as usize] as u16;
                let below2 = self.heat[((y + 2) * width + x) as usize] as u16;
                let mut total = below + below2 * 2;
                let mut weight = 3u16;

                if x > 0 {
                    total += self.heat[((y + 1) * width + x - 1) as usize] as u16;
                    weight += 1;
                }
                if x < width - 1 {
                    total += self.heat[((y + 1) * width + x + 1) as usize] as u16;
                    weight += 1;
                }

                // 70% retention keeps the plume from becoming a solid glow
                let diffused = (total / weight) * 7 / 10;
                self.heat[(y * width + x) as usize] = diffused.min(255) as u8;
            }
        }
    }

    fn composite(&mut self, matrix: &mut PixelMatrix) {
        // Sparks flare additively...
        for p in self.pool.iter_alive() {
            matrix.blend_add(p.x as i32, p.y as i32, fire_color(p.intensity));
        }
        // ...and the heat field max-blends on top, preserving highlights
        for y in 0..self.height {
            for x in 0..self.width {
                let heat = self.heat[(y * self.width + x) as usize];
                matrix.blend_max(x, y, fire_color(heat));
            }
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

    fn silent_audio() -> AudioControl {
        AudioControl::default()
    }

    #[test]
    fn pool_stays_bounded_under_load() {
        let mut fire = Fire::new(&config(), FireParams::default());
        let mut matrix = PixelMatrix::new(4, 15);
        let loud = AudioControl {
            energy: 1.0,
            pulse: 1.0,
            rhythm_strength: 1.0,
            phase: 0.01,
            ..Default::default()
        };
        for frame in 0..200 {
            let audio = AudioControl {
                phase: (frame as f32 * 0.07) % 1.0,
                ..loud
            };
            fire.generate(&mut matrix, &audio, 1.0 / 60.0);
            assert!(fire.active_count() <= FIRE_POOL_SIZE);
        }
    }

    #[test]
    fn reset_is_idempotent() {
        let mut fire = Fire::new(&config(), FireParams::default());
        let mut matrix = PixelMatrix::new(4, 15);
        for _ in 0..50 {
            fire.generate(&mut matrix, &silent_audio(), 1.0 / 60.0);
        }
        fire.reset();
        let heat_once = fire.heat.clone();
        let count_once = fire.active_count();
        fire.reset();
        assert_eq!(fire.heat, heat_once);
        assert_eq!(fire.active_count(), count_once);
        assert_eq!(count_once, 0);
    }

    #[test]
    fn palette_endpoints() {
        assert_eq!(fire_color(0), Rgb::BLACK);
        assert_eq!(fire_color(84), Rgb::new(252, 0, 0));
        assert_eq!(fire_color(170), Rgb::new(255, 255, 0));
        assert_eq!(fire_color(255), Rgb::new(255, 255, 0));
    }

    #[test]
    fn deterministic_for_same_seed() {
        let mut a = Fire::new(&config(), FireParams::default());
        let mut b = Fire::new(&config(), FireParams::default());
        let mut ma = PixelMatrix::new(4, 15);
        let mut mb = PixelMatrix::new(4, 15);
        for _ in 0..30 {
            a.generate(&mut ma, &silent_audio(), 1.0 / 60.0);
            b.generate(&mut mb, &silent_audio(), 1.0 / 60.0);
        }
        assert_eq!(ma.pixels(), mb.pixels());
    }
}
