//! Adaptive microphone front-end
//!
//! Turns the raw PCM stream into a normalized loudness level and one-shot
//! transient impulses:
//! - Raw samples -> normalize (0-1) -> peak/valley window mapping ->
//!   noise gate -> `level`
//! - Transient detection is amplitude-domain ("the drummer's algorithm"):
//!   a hit must be LOUD (well above the recent average), SUDDEN (rising
//!   fast against a ~4-frame-old reference) and INFREQUENT (cooldown)
//! - Hardware gain is the primary gain control: it adapts slowly to keep
//!   the raw ADC level near a target, while the peak/valley window maps
//!   whatever remains onto 0-1

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use pyra_core::{PyraError, PyraResult};
use pyra_hal::{
    elapsed_ms, PdmMic, SystemTime, PDM_DEFAULT_GAIN, PDM_DEFAULT_SAMPLE_RATE, PDM_GAIN_MAX,
    PDM_GAIN_MIN,
};

use crate::{smoothing_alpha, OnePole, SampleAccumulator};

const MIN_DT_SECONDS: f32 = 1e-4;
const MAX_DT_SECONDS: f32 = 0.1;
const MIC_DEAD_TIMEOUT_MS: i32 = 250;

const HW_CALIB_PERIOD_MS: i32 = 30_000;
const HW_TRACKING_TAU: f32 = 30.0;
const HW_DEAD_ZONE: f32 = 0.01;
const MIN_TAU_HARDWARE: f32 = 1.0;
const MIN_TAU_RANGE: f32 = 0.1;

/// Minimum peak/valley spread; prevents division blow-up in the mapping.
const MIN_NORMALIZATION_RANGE: f32 = 0.01;
/// Snap the peak straight to the signal when it jumps this far past it.
const INSTANT_ADAPT_THRESHOLD: f32 = 1.3;
/// Gate applied to the mapped output, not the raw signal.
const MAPPED_NOISE_GATE: f32 = 0.05;

/// Lookback depth for the attack reference (~67 ms at 60 fps).
const ATTACK_BUFFER_SIZE: usize = 4;

/// Tunable microphone parameters. Clamped at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicParams {
    /// Peak attack time constant (seconds)
    pub peak_tau: f32,
    /// Peak release time constant (seconds)
    pub release_tau: f32,
    /// Raw-level noise gate; the valley floor sits at half of this
    pub noise_gate: f32,
    /// Target raw input level for the hardware AGC
    pub hw_target: f32,
    pub fast_agc_enabled: bool,
    /// Raw level below which fast AGC engages
    pub fast_agc_threshold: f32,
    pub fast_agc_period_ms: u32,
    pub fast_agc_tau: f32,
    /// A hit must be this many times louder than the recent average
    pub transient_threshold: f32,
    /// ... and this many times louder than the attack reference
    pub attack_multiplier: f32,
    /// Recent-average tracking time constant (seconds)
    pub average_tau: f32,
    /// Minimum spacing between transients (milliseconds)
    pub cooldown_ms: u32,
}

impl Default for MicParams {
    fn default() -> Self {
        Self {
            peak_tau: 2.0,
            release_tau: 5.0,
            noise_gate: 0.04,
            hw_target: 0.35,
            fast_agc_enabled: true,
            fast_agc_threshold: 0.15,
            fast_agc_period_ms: 5_000,
            fast_agc_tau: 5.0,
            transient_threshold: 2.0,
            attack_multiplier: 1.1,
            average_tau: 0.8,
            cooldown_ms: 40,
        }
    }
}

impl MicParams {
    /// Clamp every field to its documented range, logging each adjustment.
    pub fn validate(&mut self) {
        clamp_field(&mut self.peak_tau, 0.1, 30.0, "peak_tau");
        clamp_field(&mut self.release_tau, 0.1, 60.0, "release_tau");
        clamp_field(&mut self.noise_gate, 0.0, 0.5, "noise_gate");
        clamp_field(&mut self.hw_target, 0.05, 0.9, "hw_target");
        clamp_field(&mut self.fast_agc_threshold, 0.01, 0.5, "fast_agc_threshold");
        clamp_field(&mut self.transient_threshold, 1.1, 8.0, "transient_threshold");
        clamp_field(&mut self.attack_multiplier, 1.0, 3.0, "attack_multiplier");
        clamp_field(&mut self.average_tau, 0.1, 5.0, "average_tau");
        if self.cooldown_ms < 10 || self.cooldown_ms > 1000 {
            log::warn!("mic: cooldown_ms {} clamped to 10..1000", self.cooldown_ms);
            self.cooldown_ms = self.cooldown_ms.clamp(10, 1000);
        }
    }
}

fn clamp_field(value: &mut f32, min: f32, max: f32, name: &str) {
    if *value < min || *value > max {
        log::warn!("mic: {name} {value} clamped to {min}..{max}");
        *value = value.clamp(min, max);
    }
}

/// Adaptive microphone front-end. Owns the driver and the shared
/// accumulator the driver callback writes into.
pub struct AdaptiveMic<P: PdmMic, T: SystemTime> {
    pdm: P,
    time: T,
    params: MicParams,
    accumulator: Arc<SampleAccumulator>,

    // Outputs
    level: f32,
    transient: f32,
    zcr: f32,

    // Window/range tracking
    peak_level: f32,
    valley_level: f32,
    raw_tracked: OnePole,
    raw_instant: f32,

    // Transient detection
    attack_ring: [f32; ATTACK_BUFFER_SIZE],
    attack_idx: usize,
    recent_average: OnePole,
    previous_level: f32,
    last_transient_ms: u32,

    // Hardware gain
    gain: i32,
    gain_locked: bool,
    in_fast_agc: bool,
    last_hw_calib_ms: u32,

    // Liveness
    last_callback_count: u32,
    last_callback_ms: u32,
    alive: bool,
    began: bool,
}

impl<P: PdmMic, T: SystemTime> AdaptiveMic<P, T> {
    pub fn new(pdm: P, time: T, mut params: MicParams) -> Self {
        params.validate();
        let valley = params.noise_gate * 0.5;
        Self {
            pdm,
            time,
            params,
            accumulator: Arc::new(SampleAccumulator::new()),
            level: 0.0,
            transient: 0.0,
            zcr: 0.0,
            peak_level: valley + MIN_NORMALIZATION_RANGE,
            valley_level: valley,
            raw_tracked: OnePole::new(0.0),
            raw_instant: 0.0,
            attack_ring: [0.0; ATTACK_BUFFER_SIZE],
            attack_idx: 0,
            recent_average: OnePole::new(0.0),
            previous_level: 0.0,
            last_transient_ms: 0,
            gain: PDM_DEFAULT_GAIN,
            gain_locked: false,
            in_fast_agc: false,
            last_hw_calib_ms: 0,
            last_callback_count: 0,
            last_callback_ms: 0,
            alive: false,
            began: false,
        }
    }

    /// Start the driver and install the sample callback. On failure the
    /// component stays safe to poll: zero level, zero transient.
    pub fn begin(&mut self, sample_rate: u32, initial_gain: i32) -> PyraResult<()> {
        let accumulator = Arc::clone(&self.accumulator);
        self.pdm
            .on_receive(Box::new(move |samples| accumulator.ingest(samples)));

        if !self.pdm.begin(1, sample_rate) {
            log::error!("mic: PDM driver failed to start at {sample_rate} Hz");
            return Err(PyraError::AudioInput(format!(
                "PDM begin failed at {sample_rate} Hz"
            )));
        }

        self.gain = initial_gain.clamp(PDM_GAIN_MIN, PDM_GAIN_MAX);
        self.pdm.set_gain(self.gain);

        let now = self.time.millis();
        self.last_transient_ms = now;
        self.last_hw_calib_ms = now;
        self.last_callback_ms = now;
        self.began = true;
        log::info!("mic: started at {sample_rate} Hz, gain {}", self.gain);
        Ok(())
    }

    pub fn begin_default(&mut self) -> PyraResult<()> {
        self.begin(PDM_DEFAULT_SAMPLE_RATE, PDM_DEFAULT_GAIN)
    }

    pub fn end(&mut self) {
        self.pdm.end();
        self.began = false;
        self.alive = false;
    }

    /// Per-frame update with elapsed seconds. Safe to call whether or not
    /// `begin` succeeded.
    pub fn update(&mut self, dt: f32) {
        let dt = dt.clamp(MIN_DT_SECONDS, MAX_DT_SECONDS);
        let now = self.time.millis();

        let stats = self.accumulator.drain(&self.time);
        self.zcr = stats.zcr();

        // Liveness: the callback counter advancing is the only heartbeat.
        let callback_count = self.accumulator.callback_count();
        if callback_count != self.last_callback_count {
            self.last_callback_count = callback_count;
            self.last_callback_ms = now;
        }
        self.alive = self.began && elapsed_ms(now, self.last_callback_ms) <= MIC_DEAD_TIMEOUT_MS;

        if stats.count > 0 {
            let normalized = stats.avg_abs() / 32_768.0;
            self.raw_instant = normalized;

            // Raw tracking for the hardware AGC (slow; faster in fast-AGC mode)
            let tracking_tau = if self.in_fast_agc {
                self.params.fast_agc_tau
            } else {
                HW_TRACKING_TAU
            };
            self.raw_tracked
                .advance(normalized, dt, tracking_tau.max(MIN_TAU_HARDWARE));

            self.update_window(normalized, dt);

            // Map into the tracked window and gate the result
            let range = (self.peak_level - self.valley_level).max(MIN_NORMALIZATION_RANGE);
            let mapped = ((normalized - self.valley_level) / range).clamp(0.0, 1.0);
            self.level = if mapped < MAPPED_NOISE_GATE { 0.0 } else { mapped };

            self.detect_transient(now, dt);
        } else {
            // No samples this frame: the one-shot must not be held
            self.transient = 0.0;
        }

        if self.alive && !self.gain_locked {
            self.hardware_calibrate(now);
        }
    }

    /// Peak/valley window tracking with asymmetric attack/release.
    fn update_window(&mut self, normalized: f32, dt: f32) {
        let peak_tau = if normalized > self.peak_level {
            self.params.peak_tau
        } else {
            self.params.release_tau
        };
        let peak_alpha = smoothing_alpha(dt, peak_tau.max(MIN_TAU_RANGE));
        self.peak_level += peak_alpha * (normalized - self.peak_level);

        // Large transients are captured immediately rather than smoothed in
        if normalized > self.peak_level * INSTANT_ADAPT_THRESHOLD {
            self.peak_level = normalized;
        }

        // Valley: fast attack to new minima, very slow release upward
        let valley_tau = if normalized < self.valley_level {
            self.params.peak_tau
        } else {
            self.params.release_tau * 4.0
        };
        let valley_alpha = smoothing_alpha(dt, valley_tau.max(MIN_TAU_RANGE));
        self.valley_level += valley_alpha * (normalized - self.valley_level);
        self.valley_level = self.valley_level.max(self.params.noise_gate * 0.5);

        self.peak_level = self
            .peak_level
            .max(self.valley_level + MIN_NORMALIZATION_RANGE);
    }

    /// The drummer's algorithm: LOUD + SUDDEN + INFREQUENT.
    fn detect_transient(&mut self, now: u32, dt: f32) {
        self.transient = 0.0;

        // The slot about to be overwritten is the oldest entry: the level
        // ~ATTACK_BUFFER_SIZE frames ago. Catches 50-100 ms attacks that a
        // single-frame comparison misses.
        let attack_ref = self.attack_ring[self.attack_idx];
        let average = self.recent_average.value();

        let loud = self.level >= average * self.params.transient_threshold;
        let sudden = self.level >= attack_ref * self.params.attack_multiplier;
        let past_cooldown =
            elapsed_ms(now, self.last_transient_ms) >= self.params.cooldown_ms as i32;

        if loud && sudden && past_cooldown && self.level > 0.0 {
            let denom = (average * self.params.transient_threshold).max(0.02);
            self.transient = (self.level / denom - 1.0).clamp(0.0, 1.0);
            self.last_transient_ms = now;
        }

        self.attack_ring[self.attack_idx] = self.level;
        self.attack_idx = (self.attack_idx + 1) % ATTACK_BUFFER_SIZE;
        self.recent_average
            .advance(self.level, dt, self.params.average_tau);
        self.previous_level = self.level;
    }

    /// Step the hardware gain toward the raw-level target. Runs every 30 s
    /// (5 s in fast-AGC mode), with a step ladder proportional to the error.
    fn hardware_calibrate(&mut self, now: u32) {
        self.in_fast_agc = self.params.fast_agc_enabled
            && self.raw_tracked.value() < self.params.fast_agc_threshold
            && self.gain < PDM_GAIN_MAX;

        let period = if self.in_fast_agc {
            self.params.fast_agc_period_ms as i32
        } else {
            HW_CALIB_PERIOD_MS
        };
        if elapsed_ms(now, self.last_hw_calib_ms) < period {
            return;
        }
        self.last_hw_calib_ms = now;

        let tracked = self.raw_tracked.value();
        let low = self.params.hw_target - HW_DEAD_ZONE;
        let high = self.params.hw_target + HW_DEAD_ZONE;

        let (error, direction) = if tracked < low {
            (low - tracked, 1)
        } else if tracked > high {
            (tracked - high, -1)
        } else {
            return;
        };

        let step = if error > 0.15 {
            4
        } else if error > 0.05 {
            2
        } else {
            1
        };

        let new_gain = (self.gain + direction * step).clamp(PDM_GAIN_MIN, PDM_GAIN_MAX);
        if new_gain != self.gain {
            log::debug!(
                "mic: AGC gain {} -> {} (tracked {:.3}, fast={})",
                self.gain,
                new_gain,
                tracked,
                self.in_fast_agc
            );
            self.gain = new_gain;
            self.pdm.set_gain(new_gain);
        }
    }

    // ---- Accessors ----

    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    #[inline]
    pub fn transient(&self) -> f32 {
        self.transient
    }

    #[inline]
    pub fn zcr(&self) -> f32 {
        self.zcr
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    #[inline]
    pub fn peak_level(&self) -> f32 {
        self.peak_level
    }

    #[inline]
    pub fn valley_level(&self) -> f32 {
        self.valley_level
    }

    #[inline]
    pub fn raw_level(&self) -> f32 {
        self.raw_instant
    }

    #[inline]
    pub fn recent_average(&self) -> f32 {
        self.recent_average.value()
    }

    #[inline]
    pub fn previous_level(&self) -> f32 {
        self.previous_level
    }

    #[inline]
    pub fn gain(&self) -> i32 {
        self.gain
    }

    #[inline]
    pub fn in_fast_agc(&self) -> bool {
        self.in_fast_agc
    }

    /// Gain pinned at minimum while the input still runs hot: the signal is
    /// saturating the input stage and level mapping is compressed.
    #[inline]
    pub fn loud_mode(&self) -> bool {
        self.gain <= PDM_GAIN_MIN && self.raw_tracked.value() > self.params.hw_target * 1.5
    }

    /// Fix the hardware gain and disable AGC (testing/calibration).
    pub fn lock_gain(&mut self, gain: i32) {
        self.gain = gain.clamp(PDM_GAIN_MIN, PDM_GAIN_MAX);
        self.pdm.set_gain(self.gain);
        self.gain_locked = true;
    }

    pub fn unlock_gain(&mut self) {
        self.gain_locked = false;
    }

    pub fn params(&self) -> &MicParams {
        &self.params
    }

    pub fn set_params(&mut self, mut params: MicParams) {
        params.validate();
        self.params = params;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyra_hal::{MockClock, MockPdmMic};

    const FRAME_DT: f32 = 1.0 / 60.0;
    const SAMPLES_PER_FRAME: usize = 267; // 16 kHz / 60 fps

    fn make_mic() -> (AdaptiveMic<MockPdmMic, MockClock>, MockPdmMic, MockClock) {
        let pdm = MockPdmMic::new();
        let clock = MockClock::new();
        let mut mic = AdaptiveMic::new(pdm.clone(), clock.clone(), MicParams::default());
        mic.begin_default().unwrap();
        (mic, pdm, clock)
    }

    fn run_frame(
        mic: &mut AdaptiveMic<MockPdmMic, MockClock>,
        pdm: &MockPdmMic,
        clock: &MockClock,
        amplitude: i16,
    ) {
        let samples: Vec<i16> = (0..SAMPLES_PER_FRAME)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect();
        pdm.push_samples(&samples);
        clock.advance_ms(16);
        mic.update(FRAME_DT);
    }

    #[test]
    fn silence_produces_no_output() {
        let (mut mic, pdm, clock) = make_mic();
        for _ in 0..60 {
            run_frame(&mut mic, &pdm, &clock, 0);
        }
        assert_eq!(mic.level(), 0.0);
        assert_eq!(mic.transient(), 0.0);
        assert!(mic.is_alive());
    }

    #[test]
    fn impulse_after_silence_fires_transient() {
        let (mut mic, pdm, clock) = make_mic();
        for _ in 0..30 {
            run_frame(&mut mic, &pdm, &clock, 50);
        }
        run_frame(&mut mic, &pdm, &clock, 30_000);
        assert!(mic.transient() > 0.5);
    }

    #[test]
    fn transient_respects_cooldown() {
        let (mut mic, pdm, clock) = make_mic();
        for _ in 0..30 {
            run_frame(&mut mic, &pdm, &clock, 50);
        }
        run_frame(&mut mic, &pdm, &clock, 30_000);
        assert!(mic.transient() > 0.0);
        // Next frame is 16 ms later: inside the 40 ms cooldown
        run_frame(&mut mic, &pdm, &clock, 30_000);
        assert_eq!(mic.transient(), 0.0);
    }

    #[test]
    fn dead_driver_detected_within_a_frame() {
        let (mut mic, pdm, clock) = make_mic();
        run_frame(&mut mic, &pdm, &clock, 100);
        assert!(mic.is_alive());

        clock.advance_ms(251);
        mic.update(FRAME_DT);
        assert!(!mic.is_alive());
    }

    #[test]
    fn failed_begin_is_safe_to_poll() {
        let pdm = MockPdmMic::new();
        pdm.fail_next_begin();
        let clock = MockClock::new();
        let mut mic = AdaptiveMic::new(pdm.clone(), clock.clone(), MicParams::default());
        assert!(mic.begin_default().is_err());

        mic.update(FRAME_DT);
        assert_eq!(mic.level(), 0.0);
        assert_eq!(mic.transient(), 0.0);
        assert!(!mic.is_alive());
    }

    #[test]
    fn agc_raises_gain_for_quiet_input() {
        let (mut mic, pdm, clock) = make_mic();
        let initial_gain = mic.gain();
        // Persistently quiet: fast AGC should engage (5 s period)
        for _ in 0..400 {
            run_frame(&mut mic, &pdm, &clock, 200);
        }
        assert!(mic.in_fast_agc());
        assert!(mic.gain() > initial_gain);
        assert!(pdm.gain_history().len() > 1);
    }

    #[test]
    fn gain_lock_disables_agc() {
        let (mut mic, pdm, clock) = make_mic();
        mic.lock_gain(37);
        for _ in 0..400 {
            run_frame(&mut mic, &pdm, &clock, 200);
        }
        assert_eq!(mic.gain(), 37);
    }

    #[test]
    fn level_tracks_into_unit_range() {
        let (mut mic, pdm, clock) = make_mic();
        for _ in 0..120 {
            run_frame(&mut mic, &pdm, &clock, 8_000);
        }
        assert!(mic.level() >= 0.0 && mic.level() <= 1.0);
        assert!(mic.peak_level() >= mic.valley_level() + 0.01);
    }
}
