//! PDM microphone driver interface

/// Callback invoked by the driver when samples arrive. May run in interrupt
/// context: no allocation, no blocking.
pub type SampleCallback = Box<dyn FnMut(&[i16]) + Send>;

/// Hardware gain limits of the nRF52840 PDM peripheral.
pub const PDM_GAIN_MIN: i32 = 0;
pub const PDM_GAIN_MAX: i32 = 80;
pub const PDM_DEFAULT_GAIN: i32 = 20;
pub const PDM_DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Asynchronous PDM microphone driver.
///
/// The driver delivers signed 16-bit mono PCM through the installed
/// callback. `available`/`read` expose the same data for hosts that poll
/// instead.
pub trait PdmMic {
    fn begin(&mut self, channels: u8, sample_rate: u32) -> bool;
    fn end(&mut self);

    fn set_gain(&mut self, gain: i32);
    fn on_receive(&mut self, callback: SampleCallback);

    /// Bytes ready for `read`
    fn available(&self) -> usize;
    /// Reads into `buf`, returns bytes read
    fn read(&mut self, buf: &mut [i16]) -> usize;
}
