//! Hardware safety monitor
//!
//! LED fixtures overheat under sustained full-white output. The monitor
//! counts consecutive frames where more than half the surface is
//! `(255, 255, 255)`; past the limit the pipeline refuses to emit. This is
//! the engine's only fatal condition.

use pyra_core::PixelMatrix;

pub const DEFAULT_WHITEOUT_FRAME_LIMIT: u32 = 30;

pub struct WhiteoutMonitor {
    limit: u32,
    consecutive: u32,
    tripped: bool,
}

impl WhiteoutMonitor {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            consecutive: 0,
            tripped: false,
        }
    }

    /// Observe one rendered frame. Returns true once tripped; a tripped
    /// monitor stays tripped.
    pub fn observe(&mut self, matrix: &PixelMatrix) -> bool {
        if self.tripped {
            return true;
        }

        let white = matrix.pixels().iter().filter(|p| p.is_full_white()).count();
        if white * 2 > matrix.num_pixels() {
            self.consecutive += 1;
            if self.consecutive >= self.limit {
                self.tripped = true;
                log::error!(
                    "safety: {} consecutive whiteout frames, halting output",
                    self.consecutive
                );
            }
        } else {
            self.consecutive = 0;
        }
        self.tripped
    }

    #[inline]
    pub fn tripped(&self) -> bool {
        self.tripped
    }
}
