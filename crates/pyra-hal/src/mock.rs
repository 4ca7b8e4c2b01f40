//! Mock hardware for host-side testing
//!
//! All mocks are cheap shared handles (`Clone`), so a test can keep one half
//! while the component under test owns the other. `MockPdmMic::push_samples`
//! plays the role of the ISR: it invokes the installed callback
//! synchronously on the caller's thread.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::{LedStrip, PdmMic, SampleCallback, SystemTime};

// ---- Clock ----

#[derive(Clone, Default)]
pub struct MockClock {
    millis: Arc<AtomicU32>,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_ms(&self, ms: u32) {
        self.millis.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set_ms(&self, ms: u32) {
        self.millis.store(ms, Ordering::SeqCst);
    }
}

impl SystemTime for MockClock {
    fn millis(&self) -> u32 {
        self.millis.load(Ordering::SeqCst)
    }

    fn micros(&self) -> u32 {
        self.millis().wrapping_mul(1000)
    }

    fn delay_ms(&self, ms: u32) {
        self.advance_ms(ms);
    }

    fn delay_us(&self, us: u32) {
        self.advance_ms(us / 1000);
    }

    fn disable_interrupts(&self) {}

    fn enable_interrupts(&self) {}
}

// ---- PDM microphone ----

#[derive(Default)]
struct MockPdmState {
    callback: Option<SampleCallback>,
    pending: VecDeque<i16>,
    began: bool,
    fail_begin: bool,
    channels: u8,
    sample_rate: u32,
    gain: i32,
    gain_history: Vec<i32>,
}

#[derive(Clone, Default)]
pub struct MockPdmMic {
    state: Arc<Mutex<MockPdmState>>,
}

impl MockPdmMic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `begin` call report failure (init-failure tests).
    pub fn fail_next_begin(&self) {
        self.state.lock().fail_begin = true;
    }

    /// Deliver samples as the driver would from interrupt context.
    pub fn push_samples(&self, samples: &[i16]) {
        let mut state = self.state.lock();
        if !state.began {
            return;
        }
        if let Some(callback) = state.callback.as_mut() {
            callback(samples);
        } else {
            state.pending.extend(samples.iter().copied());
        }
    }

    pub fn began(&self) -> bool {
        self.state.lock().began
    }

    pub fn gain(&self) -> i32 {
        self.state.lock().gain
    }

    /// Every gain value the component has set, in order.
    pub fn gain_history(&self) -> Vec<i32> {
        self.state.lock().gain_history.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.state.lock().sample_rate
    }
}

impl PdmMic for MockPdmMic {
    fn begin(&mut self, channels: u8, sample_rate: u32) -> bool {
        let mut state = self.state.lock();
        if state.fail_begin {
            state.fail_begin = false;
            return false;
        }
        state.began = true;
        state.channels = channels;
        state.sample_rate = sample_rate;
        true
    }

    fn end(&mut self) {
        let mut state = self.state.lock();
        state.began = false;
        state.callback = None;
        state.pending.clear();
    }

    fn set_gain(&mut self, gain: i32) {
        let mut state = self.state.lock();
        state.gain = gain;
        state.gain_history.push(gain);
    }

    fn on_receive(&mut self, callback: SampleCallback) {
        self.state.lock().callback = Some(callback);
    }

    fn available(&self) -> usize {
        self.state.lock().pending.len() * size_of::<i16>()
    }

    fn read(&mut self, buf: &mut [i16]) -> usize {
        let mut state = self.state.lock();
        let mut read = 0;
        for slot in buf.iter_mut() {
            match state.pending.pop_front() {
                Some(sample) => {
                    *slot = sample;
                    read += 1;
                }
                None => break,
            }
        }
        read * size_of::<i16>()
    }
}

// ---- LED strip ----

#[derive(Default)]
struct MockStripState {
    buffer: Vec<(u8, u8, u8)>,
    last_presented: Vec<(u8, u8, u8)>,
    present_count: u32,
    brightness: u8,
    began: bool,
}

#[derive(Clone)]
pub struct MockLedStrip {
    state: Arc<Mutex<MockStripState>>,
}

impl MockLedStrip {
    pub fn new(num_pixels: u16) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockStripState {
                buffer: vec![(0, 0, 0); num_pixels as usize],
                last_presented: vec![(0, 0, 0); num_pixels as usize],
                ..Default::default()
            })),
        }
    }

    pub fn pixel(&self, index: u16) -> (u8, u8, u8) {
        let state = self.state.lock();
        state
            .last_presented
            .get(index as usize)
            .copied()
            .unwrap_or((0, 0, 0))
    }

    pub fn last_presented(&self) -> Vec<(u8, u8, u8)> {
        self.state.lock().last_presented.clone()
    }

    pub fn present_count(&self) -> u32 {
        self.state.lock().present_count
    }

    pub fn brightness(&self) -> u8 {
        self.state.lock().brightness
    }

    pub fn began(&self) -> bool {
        self.state.lock().began
    }
}

impl LedStrip for MockLedStrip {
    fn begin(&mut self) -> bool {
        self.state.lock().began = true;
        true
    }

    fn set_pixel(&mut self, index: u16, r: u8, g: u8, b: u8) {
        let mut state = self.state.lock();
        if let Some(slot) = state.buffer.get_mut(index as usize) {
            *slot = (r, g, b);
        }
    }

    fn clear(&mut self) {
        self.state.lock().buffer.fill((0, 0, 0));
    }

    fn set_brightness(&mut self, brightness: u8) {
        self.state.lock().brightness = brightness;
    }

    fn num_pixels(&self) -> u16 {
        self.state.lock().buffer.len() as u16
    }

    fn present(&mut self) {
        let mut state = self.state.lock();
        let frame = state.buffer.clone();
        state.last_presented = frame;
        state.present_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elapsed_ms;

    #[test]
    fn clock_shares_state_across_clones() {
        let clock = MockClock::new();
        let other = clock.clone();
        clock.advance_ms(250);
        assert_eq!(other.millis(), 250);
        assert_eq!(elapsed_ms(other.millis(), 0), 250);
    }

    #[test]
    fn pdm_invokes_callback_with_samples() {
        let pdm = MockPdmMic::new();
        let mut handle = pdm.clone();
        let received = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&received);
        handle.on_receive(Box::new(move |samples| {
            counter.fetch_add(samples.len() as u32, Ordering::SeqCst);
        }));
        assert!(handle.begin(1, 16_000));
        pdm.push_samples(&[1, -2, 3]);
        assert_eq!(received.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn pdm_ignores_samples_before_begin() {
        let pdm = MockPdmMic::new();
        pdm.push_samples(&[1, 2, 3]);
        assert_eq!(pdm.available(), 0);
    }

    #[test]
    fn strip_latches_on_present() {
        let strip = MockLedStrip::new(4);
        let mut handle = strip.clone();
        handle.set_pixel(2, 10, 20, 30);
        assert_eq!(strip.pixel(2), (0, 0, 0));
        handle.present();
        assert_eq!(strip.pixel(2), (10, 20, 30));
        assert_eq!(strip.present_count(), 1);
    }

    #[test]
    fn strip_drops_out_of_range_writes() {
        let mut strip = MockLedStrip::new(2);
        strip.set_pixel(5, 1, 1, 1);
        strip.present();
        assert_eq!(strip.last_presented(), vec![(0, 0, 0), (0, 0, 0)]);
    }
}
