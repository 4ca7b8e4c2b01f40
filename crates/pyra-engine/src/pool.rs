//! Fixed-capacity particle pool
//!
//! A dense array of slots reused in place: spawn writes the first dead
//! slot, kill happens by zeroing intensity, and no compaction is ever
//! needed. Capacity is fixed at init; when the pool is full a spawn fails
//! silently, which is the documented overload behavior.

use crate::Particle;

pub struct ParticlePool {
    slots: Vec<Particle>,
}

impl ParticlePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Particle::default(); capacity],
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live particles. Bounded scan over the (small) pool.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|p| p.is_alive()).count()
    }

    /// Write the first dead slot. Returns false (and drops the particle)
    /// when every slot is live.
    pub fn spawn(&mut self, particle: Particle) -> bool {
        if let Some(slot) = self.slots.iter_mut().find(|p| !p.is_alive()) {
            *slot = particle;
            slot.age = 0;
            true
        } else {
            false
        }
    }

    /// Kill every slot.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = Particle::default();
        }
    }

    #[inline]
    pub fn slots(&self) -> &[Particle] {
        &self.slots
    }

    #[inline]
    pub fn slots_mut(&mut self) -> &mut [Particle] {
        &mut self.slots
    }

    pub fn iter_alive(&self) -> impl Iterator<Item = &Particle> {
        self.slots.iter().filter(|p| p.is_alive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParticleFlags;

    fn live_particle() -> Particle {
        Particle {
            intensity: 100,
            lifespan: 100,
            flags: ParticleFlags::empty(),
            ..Default::default()
        }
    }

    #[test]
    fn spawn_fails_silently_when_full() {
        let mut pool = ParticlePool::new(3);
        for _ in 0..3 {
            assert!(pool.spawn(live_particle()));
        }
        assert!(!pool.spawn(live_particle()));
        assert_eq!(pool.active_count(), 3);
    }

    #[test]
    fn dead_slots_are_reused() {
        let mut pool = ParticlePool::new(2);
        assert!(pool.spawn(live_particle()));
        assert!(pool.spawn(live_particle()));
        pool.slots_mut()[0].kill();
        assert_eq!(pool.active_count(), 1);
        assert!(pool.spawn(live_particle()));
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn reset_empties_pool() {
        let mut pool = ParticlePool::new(4);
        for _ in 0..4 {
            pool.spawn(live_particle());
        }
        pool.reset();
        assert_eq!(pool.active_count(), 0);
        // Idempotent: a second reset leaves identical state
        pool.reset();
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn active_count_never_exceeds_capacity() {
        let mut pool = ParticlePool::new(5);
        for _ in 0..20 {
            pool.spawn(live_particle());
        }
        assert!(pool.active_count() <= pool.capacity());
    }
}
