//! Frame presentation
//!
//! Walks the pixel matrix, resolves each logical coordinate to a physical
//! strip index through the mapper, writes into the strip driver's buffer,
//! and latches. Out-of-range mapper results are dropped without error.

use pyra_core::{DeviceConfig, LedMapper, PixelMatrix, PyraError, PyraResult};
use pyra_hal::LedStrip;

/// Bring the strip driver up and apply the device's brightness cap. On
/// failure the strip is left unused; the caller keeps rendering into a
/// dead driver, which drops every write.
pub fn init_strip<S: LedStrip>(strip: &mut S, config: &DeviceConfig) -> PyraResult<()> {
    if !strip.begin() {
        log::error!("strip: driver failed to start");
        return Err(PyraError::Strip("driver begin failed".into()));
    }
    strip.set_brightness(config.brightness);
    strip.clear();
    strip.present();
    Ok(())
}

pub fn blit<S: LedStrip>(matrix: &PixelMatrix, mapper: &LedMapper, strip: &mut S) {
    let strip_len = strip.num_pixels();
    for y in 0..matrix.height() {
        for x in 0..matrix.width() {
            if let Some(index) = mapper.index(x, y) {
                if index < strip_len {
                    let color = matrix.get(x, y);
                    strip.set_pixel(index, color.r, color.g, color.b);
                }
            }
        }
    }
    strip.present();
}
