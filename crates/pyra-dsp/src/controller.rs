//! Rhythm analysis and audio control fusion
//!
//! Buffers a continuous onset-strength signal (OSS), estimates the beat
//! period by autocorrelation over the ring, and keeps a beat-phase
//! oscillator locked to the stimulus with a PI controller corrected on
//! transient events. The per-frame output is a fused `AudioControl`.
//!
//! The heavy path (autocorrelation) is amortized behind a wall-clock timer;
//! everything else is O(1) per frame and allocation-free.

use serde::{Deserialize, Serialize};

use pyra_core::AudioControl;
use pyra_hal::{elapsed_ms, PdmMic, SystemTime};

use crate::{smoothing_alpha, AdaptiveMic, OnePole};

/// OSS history depth: 256 frames at ~60 Hz is ~4.3 s.
pub const OSS_BUFFER_SIZE: usize = 256;

const AUTOCORR_PERIOD_MS: i32 = 500;
/// Minimum ring history before autocorrelation is trusted (seconds).
const MIN_HISTORY_SECONDS: f32 = 2.0;
/// Periodicity below this never updates the tracked tempo.
const PERIODICITY_FLOOR: f32 = 0.3;
/// Blend factor for accepted tempo estimates.
const TEMPO_BLEND: f32 = 0.2;
/// PI integral anti-windup clamp.
const INTEGRAL_CLAMP: f32 = 5.0;
/// Confidence decays once the input goes quiet for this long.
const QUIET_DECAY_MS: i32 = 2_000;
const QUIET_DECAY_FACTOR: f32 = 0.995;

/// Tunable controller parameters. Clamped at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerParams {
    pub bpm_min: f32,
    pub bpm_max: f32,
    /// PLL proportional gain
    pub pll_kp: f32,
    /// PLL integral gain
    pub pll_ki: f32,
    /// Confidence needed before beat-shaped output engages
    pub activation_threshold: f32,
    /// Transient multiplier when a hit lands on the beat
    pub pulse_boost_on_beat: f32,
    /// Transient multiplier when a hit lands off the beat
    pub pulse_suppress_off_beat: f32,
    /// Energy lift near the beat, scaled by confidence
    pub energy_boost_on_beat: f32,
}

impl Default for ControllerParams {
    fn default() -> Self {
        Self {
            bpm_min: 60.0,
            bpm_max: 200.0,
            pll_kp: 0.1,
            pll_ki: 0.01,
            activation_threshold: 0.6,
            pulse_boost_on_beat: 1.3,
            pulse_suppress_off_beat: 0.6,
            energy_boost_on_beat: 0.3,
        }
    }
}

impl ControllerParams {
    pub fn validate(&mut self) {
        if self.bpm_min < 30.0 || self.bpm_min > 120.0 {
            log::warn!("controller: bpm_min {} clamped to 30..120", self.bpm_min);
            self.bpm_min = self.bpm_min.clamp(30.0, 120.0);
        }
        if self.bpm_max < self.bpm_min + 20.0 || self.bpm_max > 300.0 {
            log::warn!("controller: bpm_max {} clamped", self.bpm_max);
            self.bpm_max = self.bpm_max.clamp(self.bpm_min + 20.0, 300.0);
        }
        if self.pulse_boost_on_beat < 1.0 || self.pulse_boost_on_beat > 3.0 {
            log::warn!("controller: pulse_boost_on_beat clamped to 1..3");
            self.pulse_boost_on_beat = self.pulse_boost_on_beat.clamp(1.0, 3.0);
        }
        if self.pulse_suppress_off_beat < 0.1 || self.pulse_suppress_off_beat > 1.0 {
            log::warn!("controller: pulse_suppress_off_beat clamped to 0.1..1");
            self.pulse_suppress_off_beat = self.pulse_suppress_off_beat.clamp(0.1, 1.0);
        }
        if self.energy_boost_on_beat < 0.0 || self.energy_boost_on_beat > 1.0 {
            log::warn!("controller: energy_boost_on_beat clamped to 0..1");
            self.energy_boost_on_beat = self.energy_boost_on_beat.clamp(0.0, 1.0);
        }
    }
}

/// Fixed-length ring of recent onset-strength samples.
pub struct OnsetRing {
    samples: [f32; OSS_BUFFER_SIZE],
    write_idx: usize,
    count: usize,
}

impl Default for OnsetRing {
    fn default() -> Self {
        Self {
            samples: [0.0; OSS_BUFFER_SIZE],
            write_idx: 0,
            count: 0,
        }
    }
}

impl OnsetRing {
    pub fn push(&mut self, onset_strength: f32) {
        self.samples[self.write_idx] = onset_strength.max(0.0);
        self.write_idx = (self.write_idx + 1) % OSS_BUFFER_SIZE;
        if self.count < OSS_BUFFER_SIZE {
            self.count += 1;
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn clear(&mut self) {
        self.samples = [0.0; OSS_BUFFER_SIZE];
        self.write_idx = 0;
        self.count = 0;
    }

    /// Oldest-first linearized view into `out`; returns the filled length.
    fn linearize<'a>(&self, out: &'a mut [f32; OSS_BUFFER_SIZE]) -> &'a [f32] {
        let start = (self.write_idx + OSS_BUFFER_SIZE - self.count) % OSS_BUFFER_SIZE;
        for i in 0..self.count {
            out[i] = self.samples[(start + i) % OSS_BUFFER_SIZE];
        }
        &out[..self.count]
    }
}

/// Autocorrelation peak over a lag range.
///
/// `R(lag) = mean(signal[i] * signal[i-lag])`, with the strength reported
/// relative to the signal energy (lag-0 autocorrelation). Returns
/// `(best_lag, strength, energy)`.
pub fn autocorrelate(signal: &[f32], min_lag: usize, max_lag: usize) -> (usize, f32, f32) {
    let length = signal.len();
    let max_lag = max_lag.min(length.saturating_sub(1));
    let min_lag = min_lag.max(2);

    let energy = if length == 0 {
        0.0
    } else {
        signal.iter().map(|s| s * s).sum::<f32>() / length as f32
    };

    if min_lag > max_lag || energy <= f32::EPSILON {
        return (min_lag, 0.0, energy);
    }

    // Normalizing every lag by the full window length (rather than the
    // per-lag overlap count) biases ties toward shorter lags, which keeps
    // an impulse train from resolving to half tempo.
    let mut best_lag = min_lag;
    let mut best_corr = 0.0f32;
    for lag in min_lag..=max_lag {
        let mut corr = 0.0f32;
        for i in lag..length {
            corr += signal[i] * signal[i - lag];
        }
        corr /= length as f32;
        if corr > best_corr {
            best_corr = corr;
            best_lag = lag;
        }
    }

    let strength = (best_corr * 2.0 / energy).clamp(0.0, 1.0);
    (best_lag, strength, energy)
}

/// Beat tracking and audio fusion. Owns the microphone front-end; one
/// `update` per frame drives the whole audio side of the pipeline.
pub struct AudioController<P: PdmMic, T: SystemTime> {
    mic: AdaptiveMic<P, T>,
    time: T,
    params: ControllerParams,

    ring: OnsetRing,
    scratch: Box<[f32; OSS_BUFFER_SIZE]>,

    bpm: f32,
    beat_period_ms: f32,
    phase: f32,
    periodicity_strength: f32,
    error_integral: f32,
    confidence: f32,
    confidence_smooth: OnePole,

    beat_number: u32,
    beat_happened: bool,
    half_note: bool,
    whole_note: bool,

    energy_smooth: OnePole,
    onset_density: OnePole,
    fps_estimate: f32,

    last_autocorr_ms: u32,
    last_onset_ms: u32,
}

impl<P: PdmMic, T: SystemTime> AudioController<P, T> {
    pub fn new(mic: AdaptiveMic<P, T>, time: T, mut params: ControllerParams) -> Self {
        params.validate();
        let now = time.millis();
        Self {
            mic,
            time,
            params,
            ring: OnsetRing::default(),
            scratch: Box::new([0.0; OSS_BUFFER_SIZE]),
            bpm: 120.0,
            beat_period_ms: 500.0,
            phase: 0.0,
            periodicity_strength: 0.0,
            error_integral: 0.0,
            confidence: 0.0,
            confidence_smooth: OnePole::new(0.0),
            beat_number: 0,
            beat_happened: false,
            half_note: false,
            whole_note: false,
            energy_smooth: OnePole::new(0.0),
            onset_density: OnePole::new(0.0),
            // Seeded from the first observed dt
            fps_estimate: 0.0,
            last_autocorr_ms: now,
            last_onset_ms: now,
        }
    }

    /// Run one frame of the audio side: mic update, tempo estimation, phase
    /// tracking, and output fusion.
    pub fn update(&mut self, dt: f32) -> AudioControl {
        let dt = dt.clamp(1e-4, 0.1);
        let now = self.time.millis();

        self.mic.update(dt);
        let onset_strength = self.mic.transient();
        self.ring.push(onset_strength);

        // Track the actual frame rate; lag<->BPM conversion depends on it
        if self.fps_estimate <= 0.0 {
            self.fps_estimate = 1.0 / dt;
        } else {
            self.fps_estimate += smoothing_alpha(dt, 2.0) * (1.0 / dt - self.fps_estimate);
        }

        self.run_autocorrelation(now);
        self.advance_phase(dt);

        if onset_strength > 0.0 {
            self.on_transient(onset_strength, now);
        }
        if elapsed_ms(now, self.last_onset_ms) > QUIET_DECAY_MS {
            self.confidence *= QUIET_DECAY_FACTOR;
        }

        self.confidence_smooth.advance(self.confidence, dt, 0.5);
        self.energy_smooth.advance(self.mic.level(), dt, 0.15);
        let density_target = if onset_strength > 0.0 { 1.0 / dt } else { 0.0 };
        self.onset_density.advance(density_target, dt, 2.0);

        self.build_output()
    }

    /// Amortized tempo estimation over the OSS ring.
    fn run_autocorrelation(&mut self, now: u32) {
        if elapsed_ms(now, self.last_autocorr_ms) < AUTOCORR_PERIOD_MS {
            return;
        }
        self.last_autocorr_ms = now;

        let fps = self.fps_estimate.max(1.0);
        if (self.ring.len() as f32) < MIN_HISTORY_SECONDS * fps {
            return;
        }

        let min_lag = (60.0 / self.params.bpm_max * fps) as usize;
        let max_lag = ((60.0 / self.params.bpm_min * fps) as usize).min(OSS_BUFFER_SIZE / 2);

        let signal = self.ring.linearize(&mut self.scratch);
        let (best_lag, strength, energy) = autocorrelate(signal, min_lag, max_lag);

        if energy <= f32::EPSILON {
            // Degenerate window: decay rather than retune
            self.periodicity_strength *= 0.9;
            return;
        }

        self.periodicity_strength = strength;
        if strength > PERIODICITY_FLOOR && best_lag > 0 {
            let new_bpm = (60.0 * fps / best_lag as f32).clamp(self.params.bpm_min, self.params.bpm_max);
            self.bpm += TEMPO_BLEND * (new_bpm - self.bpm);
            self.beat_period_ms = 60_000.0 / self.bpm;
        }
    }

    /// Advance the beat oscillator; a large `dt` may wrap several beats and
    /// all of them are counted.
    fn advance_phase(&mut self, dt: f32) {
        self.beat_happened = false;
        self.half_note = false;
        self.whole_note = false;

        self.phase += dt * 1000.0 / self.beat_period_ms;
        if self.phase >= 1.0 {
            let beats = self.phase as u32;
            self.phase -= beats as f32;
            // Guard against float edge where phase lands exactly on 1.0
            if self.phase >= 1.0 {
                self.phase = 0.0;
            }
            self.beat_number = self.beat_number.wrapping_add(beats);
            self.beat_happened = true;
            self.half_note = self.beat_number % 2 == 0;
            self.whole_note = self.beat_number % 4 == 0;
        }
    }

    /// PLL correction on a transient event.
    fn on_transient(&mut self, strength: f32, now: u32) {
        // Signed phase error: transient expected at phase 0 (or 1)
        let error = if self.phase < 0.5 {
            self.phase
        } else {
            self.phase - 1.0
        };

        if self.periodicity_strength > PERIODICITY_FLOOR {
            if error.abs() > 0.3 && self.confidence < 0.4 {
                // Far off and not yet trusted: hard re-sync
                self.phase = 0.0;
            } else {
                self.error_integral =
                    (self.error_integral + error).clamp(-INTEGRAL_CLAMP, INTEGRAL_CLAMP);
                let correction =
                    self.params.pll_kp * error + self.params.pll_ki * self.error_integral;
                self.beat_period_ms *= 1.0 - 0.1 * correction;
                self.bpm =
                    (60_000.0 / self.beat_period_ms).clamp(self.params.bpm_min, self.params.bpm_max);
                self.beat_period_ms = 60_000.0 / self.bpm;
            }

            if error.abs() < 0.2 {
                self.confidence = (self.confidence + 0.1 * strength).min(1.0);
            } else if error.abs() > 0.4 {
                self.confidence = (self.confidence - 0.05).max(0.0);
            }
        } else {
            // No periodic pattern yet: every transient restarts the beat
            self.phase = 0.0;
        }

        self.last_onset_ms = now;
    }

    fn build_output(&self) -> AudioControl {
        let confidence = self.confidence_smooth.value();

        let mut energy = self.energy_smooth.value();
        if confidence > self.params.activation_threshold {
            let beat_proximity = (0.5 - (self.phase - 0.5).abs()) * 2.0;
            energy += beat_proximity * self.params.energy_boost_on_beat * confidence;
        }
        let energy = energy.clamp(0.0, 1.0);

        let transient = self.mic.transient();
        let pulse = if transient > 0.0 {
            let distance = if self.phase < 0.5 {
                self.phase
            } else {
                1.0 - self.phase
            };
            let factor = if distance < 0.2 {
                self.params.pulse_boost_on_beat
            } else if distance > 0.3 {
                self.params.pulse_suppress_off_beat
            } else {
                let t = (distance - 0.2) / 0.1;
                self.params.pulse_boost_on_beat
                    + t * (self.params.pulse_suppress_off_beat - self.params.pulse_boost_on_beat)
            };
            let modulated = transient * factor;
            (transient + (modulated - transient) * confidence).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut rhythm_strength = 0.5 * self.periodicity_strength + 0.5 * confidence;
        if rhythm_strength < self.params.activation_threshold * 0.5 {
            rhythm_strength = 0.0;
        }

        AudioControl {
            energy,
            pulse,
            phase: self.phase,
            rhythm_strength,
            onset_density: self.onset_density.value().max(0.0),
            loud_mode: self.mic.loud_mode(),
        }
    }

    pub fn reset(&mut self) {
        self.ring.clear();
        self.bpm = 120.0;
        self.beat_period_ms = 500.0;
        self.phase = 0.0;
        self.periodicity_strength = 0.0;
        self.error_integral = 0.0;
        self.confidence = 0.0;
        self.confidence_smooth.set(0.0);
        self.beat_number = 0;
        self.beat_happened = false;
        self.half_note = false;
        self.whole_note = false;
        self.energy_smooth.set(0.0);
        self.onset_density.set(0.0);
        let now = self.time.millis();
        self.last_autocorr_ms = now;
        self.last_onset_ms = now;
    }

    // ---- Accessors ----

    #[inline]
    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    #[inline]
    pub fn phase(&self) -> f32 {
        self.phase
    }

    #[inline]
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    #[inline]
    pub fn periodicity_strength(&self) -> f32 {
        self.periodicity_strength
    }

    #[inline]
    pub fn beat_number(&self) -> u32 {
        self.beat_number
    }

    #[inline]
    pub fn beat_happened(&self) -> bool {
        self.beat_happened
    }

    #[inline]
    pub fn half_note(&self) -> bool {
        self.half_note
    }

    #[inline]
    pub fn whole_note(&self) -> bool {
        self.whole_note
    }

    pub fn mic(&self) -> &AdaptiveMic<P, T> {
        &self.mic
    }

    pub fn mic_mut(&mut self) -> &mut AdaptiveMic<P, T> {
        &mut self.mic
    }

    pub fn params(&self) -> &ControllerParams {
        &self.params
    }
}
