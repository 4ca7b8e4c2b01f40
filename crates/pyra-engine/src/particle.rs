//! Particle value type and behavior flags

use bitflags::bitflags;

bitflags! {
    /// Per-particle behavior selection. Flags compose freely; generators
    /// pick the set at spawn time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ParticleFlags: u8 {
        /// Gravity acceleration applies
        const GRAVITY = 1 << 0;
        /// Wind acceleration applies
        const WIND = 1 << 1;
        /// Intensity fades with age
        const FADE = 1 << 2;
        /// Deposits heat into the generator's heat buffer each step
        const EMIT_TRAIL = 1 << 3;
        /// Splashes into child particles on floor impact
        const SPLASH = 1 << 4;
        /// May spawn branch particles while young
        const BRANCH = 1 << 5;
    }
}

/// One particle slot. Slots live in a fixed pool and are killed in place;
/// a dead slot is a valid spawn target.
#[derive(Debug, Clone, Copy, Default)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub intensity: u8,
    pub age: u16,
    pub lifespan: u16,
    pub flags: ParticleFlags,
}

impl Particle {
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.intensity > 0 && self.age < self.lifespan
    }

    #[inline]
    pub fn kill(&mut self) {
        self.intensity = 0;
    }

    #[inline]
    pub fn has_flag(&self, flag: ParticleFlags) -> bool {
        self.flags.contains(flag)
    }

    #[inline]
    pub fn clear_flag(&mut self, flag: ParticleFlags) {
        self.flags.remove(flag);
    }

    /// Advance age; applies the linear fade when flagged and kills the
    /// slot once the lifespan is spent.
    pub fn age_step(&mut self) {
        self.age += 1;
        if self.age >= self.lifespan {
            self.kill();
            return;
        }
        if self.has_flag(ParticleFlags::FADE) {
            let remaining = 1.0 - self.age as f32 / self.lifespan as f32;
            self.intensity = (self.intensity as f32 * remaining) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spark() -> Particle {
        Particle {
            intensity: 200,
            lifespan: 10,
            flags: ParticleFlags::FADE,
            ..Default::default()
        }
    }

    #[test]
    fn dies_at_lifespan() {
        let mut p = Particle {
            flags: ParticleFlags::empty(),
            ..spark()
        };
        for _ in 0..9 {
            p.age_step();
            assert!(p.is_alive());
        }
        p.age_step();
        assert!(!p.is_alive());
    }

    #[test]
    fn fade_decreases_monotonically() {
        let mut p = spark();
        let mut last = p.intensity;
        while p.is_alive() {
            p.age_step();
            assert!(p.intensity <= last);
            last = p.intensity;
        }
    }

    #[test]
    fn flags_compose() {
        let mut p = Particle {
            flags: ParticleFlags::GRAVITY | ParticleFlags::BRANCH,
            ..Default::default()
        };
        assert!(p.has_flag(ParticleFlags::GRAVITY));
        assert!(!p.has_flag(ParticleFlags::WIND));
        p.clear_flag(ParticleFlags::BRANCH);
        assert!(!p.has_flag(ParticleFlags::BRANCH));
        assert!(p.has_flag(ParticleFlags::GRAVITY));
    }
}
