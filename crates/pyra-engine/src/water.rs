//! Water generator
//!
//! Drops fall from the top row over a tropical-sea backdrop and splash
//! into radial child particles when they reach the floor. Drops max-blend
//! so they read as distinct droplets against the dark water.

use noise::Simplex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use pyra_core::{AudioControl, DeviceConfig, PixelMatrix, Rgb};

use crate::fire::clamp_unit;
use crate::{noise01, Forces, Particle, ParticleFlags, ParticlePool};

const WATER_POOL_SIZE: usize = 30;

/// Maximum splash events processed per frame; matches the deepest
/// plausible stack of simultaneous floor impacts.
const MAX_SPLASHES_PER_FRAME: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterParams {
    pub base_spawn_chance: f32,
    /// Smaller than fire's: rain stays gentle even on hits
    pub audio_spawn_boost: f32,
    pub drop_velocity_min: f32,
    pub drop_velocity_max: f32,
    pub drop_spread: f32,
    pub intensity_min: u8,
    pub intensity_max: u8,
    pub lifespan: u16,
    /// Children spawned when a drop splashes on the floor
    pub splash_particles: u8,
    pub splash_velocity_min: f32,
    pub splash_velocity_max: f32,
    /// Child intensity as a fraction of the parent's, out of 255
    pub splash_intensity: u8,
    pub organic_transient_min: f32,
    pub max_particles: usize,
    pub gravity: f32,
    pub wind_base: f32,
    pub wind_variation: f32,
    pub drag: f32,
    pub background_level: f32,
}

impl Default for WaterParams {
    fn default() -> Self {
        Self {
            base_spawn_chance: 0.25,
            audio_spawn_boost: 0.2,
            drop_velocity_min: 3.0,
            drop_velocity_max: 7.0,
            drop_spread: 1.0,
            intensity_min: 120,
            intensity_max: 220,
            lifespan: 60,
            splash_particles: 6,
            splash_velocity_min: 1.0,
            splash_velocity_max: 2.5,
            splash_intensity: 180,
            organic_transient_min: 0.5,
            max_particles: WATER_POOL_SIZE,
            gravity: 3.0,
            wind_base: 0.0,
            wind_variation: 0.5,
            drag: 0.995,
            background_level: 0.18,
        }
    }
}

impl WaterParams {
    pub fn validate(&mut self) {
        clamp_unit(&mut self.base_spawn_chance, "water.base_spawn_chance");
        clamp_unit(&mut self.audio_spawn_boost, "water.audio_spawn_boost");
        clamp_unit(&mut self.organic_transient_min, "water.organic_transient_min");
        clamp_unit(&mut self.background_level, "water.background_level");
        if self.intensity_min > self.intensity_max {
            log::warn!("water: intensity range inverted, swapping");
            std::mem::swap(&mut self.intensity_min, &mut self.intensity_max);
        }
        if self.drop_velocity_min > self.drop_velocity_max {
            log::warn!("water: drop velocity range inverted, swapping");
            std::mem::swap(&mut self.drop_velocity_min, &mut self.drop_velocity_max);
        }
        if self.splash_velocity_min > self.splash_velocity_max {
            log::warn!("water: splash velocity range inverted, swapping");
            std::mem::swap(&mut self.splash_velocity_min, &mut self.splash_velocity_max);
        }
        if self.lifespan == 0 {
            log::warn!("water: lifespan clamped to 1");
            self.lifespan = 1;
        }
        if self.max_particles > WATER_POOL_SIZE {
            log::warn!("water: max_particles clamped to {WATER_POOL_SIZE}");
            self.max_particles = WATER_POOL_SIZE;
        }
    }
}

/// White/light-cyan drops: brighter means whiter, like foam catching light.
fn drop_color(intensity: u8) -> Rgb {
    Rgb::new(
        intensity,
        (intensity as u16 * 3 / 4) as u8,
        (intensity as u16 + 40).min(255) as u8,
    )
}

pub struct Water {
    width: i32,
    height: i32,
    params: WaterParams,
    pool: ParticlePool,
    forces: Forces,
    backdrop_noise: Simplex,
    rng: SmallRng,
    seed: u64,
    noise_time: f32,
    prev_phase: f32,
}

impl Water {
    pub fn new(config: &DeviceConfig, mut params: WaterParams) -> Self {
        params.validate();
        Self {
            width: config.width as i32,
            height: config.height as i32,
            params,
            pool: ParticlePool::new(WATER_POOL_SIZE),
            forces: Forces::new(
                params.gravity,
                params.wind_base,
                params.wind_variation,
                params.drag,
                config.seed as u32,
            ),
            backdrop_noise: Simplex::new(config.seed as u32),
            rng: SmallRng::seed_from_u64(config.seed ^ 0x57415445),
            seed: config.seed ^ 0x57415445,
            noise_time: 0.0,
            prev_phase: 0.0,
        }
    }

    pub fn generate(&mut self, matrix: &mut PixelMatrix, audio: &AudioControl, dt: f32) {
        let time_speed = if audio.has_rhythm() {
            0.03 + 0.02 * audio.energy
        } else {
            0.012 + 0.008 * audio.energy
        };
        self.noise_time += time_speed;

        self.render_backdrop(matrix, audio);
        self.spawn_drops(audio);
        self.integrate(dt);
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

    pub fn particles(&self) -> impl Iterator<Item = &Particle> {
        self.pool.iter_alive()
    }

    pub fn params(&self) -> &WaterParams {
        &self.params
    }

    pub fn set_params(&mut self, mut params: WaterParams) {
        params.validate();
        self.forces.gravity = params.gravity;
        self.forces.wind_base = params.wind_base;
        self.forces.wind_variation = params.wind_variation;
        self.forces.drag = params.drag;
        self.params = params;
    }

    /// Spawn one drop directly (test hook for the splash behavior).
    pub fn spawn_drop(&mut self, x: f32, y: f32, vy: f32, flags: ParticleFlags) -> bool {
        if self.pool.active_count() >= self.params.max_particles {
            return false;
        }
        self.pool.spawn(Particle {
            x,
            y,
            vx: 0.0,
            vy,
            intensity: self.params.intensity_max,
            age: 0,
            lifespan: self.params.lifespan,
            flags,
        })
    }

    /// Tropical sea: two wave layers for brightness, a third slow noise
    /// field choosing deep-blue / turquoise / cyan per cell.
    fn render_backdrop(&mut self, matrix: &mut PixelMatrix, audio: &AudioControl) {
        let wave_brightness = if audio.has_rhythm() {
            0.7 + 0.3 * audio.phase_to_pulse()
        } else {
            1.0
        };

        for y in 0..self.height {
            for x in 0..self.width {
                let nx = x as f32 * 0.12;
                let ny = y as f32 * 0.12;

                let wave1 = noise01(&self.backdrop_noise, nx, ny, self.noise_time);
                let wave2 = noise01(
                    &self.backdrop_noise,
                    nx * 2.5,
                    ny * 2.5,
                    self.noise_time * 1.5,
                );
                let combined = wave1 * 0.6 + wave2 * 0.4;

                let intensity = (combined * wave_brightness * self.params.background_level)
                    .clamp(0.0, 1.0);
                let level = (intensity * 255.0) as f32;

                let color_noise = noise01(
                    &self.backdrop_noise,
                    nx * 0.5,
                    ny * 0.5,
                    self.noise_time * 0.3,
                );
                let color = if color_noise < 0.4 {
                    // Deep blue-green
                    Rgb::new((level * 0.05) as u8, (level * 0.4) as u8, level as u8)
                } else if color_noise < 0.7 {
                    // Turquoise
                    Rgb::new((level * 0.1) as u8, (level * 0.6) as u8, (level * 0.8) as u8)
                } else {
                    // Cyan highlights
                    Rgb::new(
                        (level * 0.15) as u8,
                        (level * 0.7) as u8,
                        (level * 0.65) as u8,
                    )
                };
                matrix.set(x, y, color);
            }
        }
    }

    fn spawn_drops(&mut self, audio: &AudioControl) {
        let mut spawn_prob = self.params.base_spawn_chance;
        let mut drop_count: u32 = 0;

        if audio.has_rhythm() {
            let phase_pulse = audio.phase_to_pulse();
            spawn_prob *= 0.4 + 0.6 * phase_pulse;
            spawn_prob += self.params.audio_spawn_boost * audio.pulse * phase_pulse;

            // Beat: a wave of drops distributed across the width
            if audio.phase < self.prev_phase {
                let wave = 3.0 + 5.0 * audio.rhythm_strength;
                drop_count = (wave * (0.5 + 0.5 * audio.energy)) as u32;
            }
        } else {
            let smooth_energy = 0.4 + 0.3 * audio.energy;
            spawn_prob *= smooth_energy;

            if audio.pulse > self.params.organic_transient_min {
                let strength = (audio.pulse - self.params.organic_transient_min)
                    / (1.0 - self.params.organic_transient_min);
                drop_count = (2.0 * strength) as u32;
            }
        }

        if self.rng.random::<f32>() < spawn_prob {
            drop_count += 1;
        }

        for _ in 0..drop_count {
            if self.pool.active_count() >= self.params.max_particles {
                break;
            }
            let velocity_mult = if audio.has_rhythm() {
                1.0 + 0.2 * audio.pulse
            } else {
                0.7
            };
            let vy = self
                .rng
                .random_range(self.params.drop_velocity_min..=self.params.drop_velocity_max)
                * velocity_mult;
            let vx = self.rng.random_range(-1.0..1.0) * self.params.drop_spread;

            self.pool.spawn(Particle {
                x: self.rng.random_range(0.0..self.width as f32),
                y: 0.0,
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
                    | ParticleFlags::SPLASH,
            });
        }
    }

    fn integrate(&mut self, dt: f32) {
        let wind = self.forces.wind_at(self.noise_time);
        let (width, height) = (self.width, self.height);

        // Splash events collected into a fixed buffer; spawning children
        // mid-iteration would alias the pool.
        let mut splashes = [(0.0f32, 0.0f32, 0u8); MAX_SPLASHES_PER_FRAME];
        let mut splash_count = 0;

        for p in self.pool.slots_mut() {
            if !p.is_alive() {
                continue;
            }
            self.forces.apply(p, dt, wind);

            // Floor impact: replace the drop with a splash
            if p.has_flag(ParticleFlags::SPLASH) && p.y >= (height - 1) as f32 {
                if splash_count < MAX_SPLASHES_PER_FRAME {
                    splashes[splash_count] = (p.x, (height - 1) as f32, p.intensity);
                    splash_count += 1;
                }
                p.kill();
                continue;
            }

            if p.x < 0.0 || p.x >= width as f32 || p.y < 0.0 || p.y >= height as f32 {
                p.kill();
                continue;
            }

            p.age_step();
        }

        for i in 0..splash_count {
            let (x, y, intensity) = splashes[i];
            self.spawn_splash(x, y, intensity);
        }
    }

    /// Radially distributed children with a small upward bias, inheriting
    /// reduced intensity from the parent drop.
    fn spawn_splash(&mut self, x: f32, y: f32, parent_intensity: u8) {
        let available = self
            .params
            .max_particles
            .saturating_sub(self.pool.active_count());
        let count = (self.params.splash_particles as usize).min(available);
        if count == 0 {
            return;
        }

        let intensity =
            (parent_intensity as u16 * self.params.splash_intensity as u16 / 255).min(255) as u8;

        for i in 0..count {
            let angle = i as f32 * std::f32::consts::TAU / count as f32
                + self.rng.random_range(0.0..1.0);
            let speed = self
                .rng
                .random_range(self.params.splash_velocity_min..=self.params.splash_velocity_max);

            self.pool.spawn(Particle {
                x,
                y,
                vx: angle.cos() * speed,
                vy: angle.sin() * speed - 1.0,
                intensity,
                age: 0,
                lifespan: 30,
                flags: ParticleFlags::GRAVITY | ParticleFlags::FADE,
            });
        }
    }

    fn composite(&mut self, matrix: &mut PixelMatrix) {
        for p in self.pool.iter_alive() {
            matrix.blend_max(p.x as i32, p.y as i32, drop_color(p.intensity));
        }
    }
}
