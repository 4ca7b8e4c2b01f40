//! Logical-to-physical LED index mapping
//!
//! Encodes the device wiring as a precomputed bijection between logical
//! `(x, y)` coordinates and physical strip indices:
//! - Horizontal matrix wiring: row-major, `index = y*width + x`
//! - Vertical matrix wiring (serpentine): even columns run top-to-bottom,
//!   odd columns bottom-to-top, `index = x*height + (y | height-1-y)`
//! - Linear strands: identity over `x` (single row)
//!
//! Out-of-range lookups return `None`; callers drop the write.

use crate::{DeviceConfig, Layout, Orientation};

pub struct LedMapper {
    width: i32,
    height: i32,
    position_to_index: Vec<u16>,
    index_to_coords: Vec<(u16, u16)>,
}

impl LedMapper {
    pub fn new(config: &DeviceConfig) -> Self {
        let width = config.width as i32;
        let height = config.height as i32;
        let total = (width * height) as usize;

        let mut position_to_index = vec![0u16; total];
        let mut index_to_coords = vec![(0u16, 0u16); total];

        let serpentine =
            config.layout == Layout::Matrix && config.orientation == Orientation::Vertical;

        for y in 0..height {
            for x in 0..width {
                let index = if serpentine {
                    // Each column is a continuous strip of `height` LEDs;
                    // odd columns are physically routed in reverse.
                    if x % 2 == 0 {
                        x * height + y
                    } else {
                        x * height + (height - 1 - y)
                    }
                } else {
                    y * width + x
                };
                position_to_index[(y * width + x) as usize] = index as u16;
                index_to_coords[index as usize] = (x as u16, y as u16);
            }
        }

        Self {
            width,
            height,
            position_to_index,
            index_to_coords,
        }
    }

    /// Physical strip index for a logical coordinate
    #[inline]
    pub fn index(&self, x: i32, y: i32) -> Option<u16> {
        if x < 0 || x >= self.width || y < 0 || y >= self.height {
            return None;
        }
        Some(self.position_to_index[(y * self.width + x) as usize])
    }

    /// Logical coordinate for a physical strip index
    #[inline]
    pub fn coords(&self, index: u16) -> Option<(u16, u16)> {
        self.index_to_coords.get(index as usize).copied()
    }

    #[inline]
    pub fn num_pixels(&self) -> u16 {
        self.index_to_coords.len() as u16
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertical_4x15() -> LedMapper {
        LedMapper::new(&DeviceConfig {
            width: 4,
            height: 15,
            orientation: Orientation::Vertical,
            layout: Layout::Matrix,
            ..Default::default()
        })
    }

    #[test]
    fn serpentine_known_indices() {
        let mapper = vertical_4x15();
        assert_eq!(mapper.index(0, 0), Some(0));
        assert_eq!(mapper.index(0, 14), Some(14));
        assert_eq!(mapper.index(1, 0), Some(29));
        assert_eq!(mapper.index(1, 14), Some(15));
        assert_eq!(mapper.index(2, 0), Some(30));
        assert_eq!(mapper.index(3, 14), Some(45));
    }

    #[test]
    fn horizontal_is_row_major() {
        let mapper = LedMapper::new(&DeviceConfig {
            width: 8,
            height: 4,
            orientation: Orientation::Horizontal,
            layout: Layout::Matrix,
            ..Default::default()
        });
        assert_eq!(mapper.index(0, 0), Some(0));
        assert_eq!(mapper.index(7, 0), Some(7));
        assert_eq!(mapper.index(0, 1), Some(8));
        assert_eq!(mapper.index(7, 3), Some(31));
    }

    #[test]
    fn linear_is_identity() {
        let mut config = DeviceConfig {
            width: 10,
            height: 1,
            layout: Layout::Linear,
            orientation: Orientation::Horizontal,
            ..Default::default()
        };
        config.validate().unwrap();
        let mapper = LedMapper::new(&config);
        for x in 0..10 {
            assert_eq!(mapper.index(x, 0), Some(x as u16));
        }
    }

    #[test]
    fn bijection_both_directions() {
        let mapper = vertical_4x15();
        for y in 0..15 {
            for x in 0..4 {
                let index = mapper.index(x, y).unwrap();
                assert_eq!(mapper.coords(index), Some((x as u16, y as u16)));
            }
        }
        for index in 0..mapper.num_pixels() {
            let (x, y) = mapper.coords(index).unwrap();
            assert_eq!(mapper.index(x as i32, y as i32), Some(index));
        }
    }

    #[test]
    fn out_of_range_is_none() {
        let mapper = vertical_4x15();
        assert_eq!(mapper.index(-1, 0), None);
        assert_eq!(mapper.index(4, 0), None);
        assert_eq!(mapper.index(0, 15), None);
        assert_eq!(mapper.coords(60), None);
    }
}
