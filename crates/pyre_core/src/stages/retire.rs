//! Retire stage: expired particles go back to the free list.

use crate::pool::ParticlePool;

/// Retires every live particle whose normalized age reached 1.
///
/// O(capacity). Returns the number retired.
pub fn retire(pool: &mut ParticlePool) -> u32 {
    let mut retired = 0;
    for index in 0..pool.capacity() {
        let p = &pool.particles()[index as usize];
        if p.is_alive() && p.age() >= 1.0 {
            pool.release_slot(index);
            retired += 1;
        }
    }
    retired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::FLAG_ALIVE;

    #[test]
    fn test_only_expired_live_particles_retire() {
        let mut pool = ParticlePool::new(4);
        for age in [0.5, 1.0, 1.5] {
            let (slot, _) = pool.acquire_slot().expect("slot");
            let p = &mut pool.particles_mut()[slot as usize];
            p.flags[0] = FLAG_ALIVE;
            p.position_age[3] = age;
        }
        assert_eq!(pool.alive_count(), 3);

        assert_eq!(retire(&mut pool), 2);
        assert_eq!(pool.alive_count(), 1);
        // Dead slots are not retired twice.
        assert_eq!(retire(&mut pool), 0);
        assert_eq!(pool.free_slots(), 3);
    }
}
