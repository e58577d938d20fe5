//! # Particle Pool
//!
//! Fixed-capacity, per-effect particle storage. Sized once from the
//! effect's budget grant and never grown.
//!
//! ## Free List Discipline
//!
//! ```text
//! Retire ──push──► [ free list ] ──pop──► Emit
//! ```
//!
//! Retire only appends and Emit only pops, and the stages never overlap,
//! so a plain index stack stands in for the device-side atomic free list.

use bytemuck::{Pod, Zeroable};

/// Vertices per billboard instance (two triangles).
pub const BILLBOARD_VERTEX_COUNT: u32 = 6;

/// `flags[0]`: slot holds a live particle.
pub const FLAG_ALIVE: u32 = 1;
/// `flags[3]` bit: particle may be promoted to physics debris.
pub const FLAG_DEBRIS: u32 = 1;

/// One particle, laid out as the device sees it.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Particle {
    /// Position (xyz) + normalized age (w, dead at >= 1)
    pub position_age: [f32; 4],
    /// Velocity (xyz) + mass (w)
    pub velocity_mass: [f32; 4],
    /// Color (rgba)
    pub color: [f32; 4],
    /// Size, lifetime in seconds, unused, unused
    pub size_lifetime: [f32; 4],
    /// Alive, emitter slot, spawn index, handoff bits
    pub flags: [u32; 4],
}

impl Particle {
    /// Size of a particle in bytes
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Creates a dead particle (used for pool initialization)
    #[must_use]
    pub const fn dead() -> Self {
        Self {
            position_age: [0.0, 0.0, 0.0, 1.0],
            velocity_mass: [0.0; 4],
            color: [0.0; 4],
            size_lifetime: [0.0; 4],
            flags: [0; 4],
        }
    }

    /// Is this particle alive?
    #[inline]
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.flags[0] & FLAG_ALIVE != 0
    }

    /// Normalized age.
    #[inline]
    #[must_use]
    pub const fn age(&self) -> f32 {
        self.position_age[3]
    }

    /// Position.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> [f32; 3] {
        [self.position_age[0], self.position_age[1], self.position_age[2]]
    }

    /// Velocity.
    #[inline]
    #[must_use]
    pub const fn velocity(&self) -> [f32; 3] {
        [self.velocity_mass[0], self.velocity_mass[1], self.velocity_mass[2]]
    }

    /// Rendered size, also the cull radius.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> f32 {
        self.size_lifetime[0]
    }

    /// Whether the particle is flagged for physics handoff.
    #[inline]
    #[must_use]
    pub const fn is_debris(&self) -> bool {
        self.flags[3] & FLAG_DEBRIS != 0
    }
}

/// Indirect draw arguments written by the cull stage.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectDrawRecord {
    /// Vertices per instance.
    pub vertex_count: u32,
    /// Visible particles.
    pub instance_count: u32,
    /// First vertex.
    pub first_vertex: u32,
    /// First instance.
    pub first_instance: u32,
}

impl IndirectDrawRecord {
    /// Record with no instances.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            vertex_count: BILLBOARD_VERTEX_COUNT,
            instance_count: 0,
            first_vertex: 0,
            first_instance: 0,
        }
    }

    /// Adds visible instances.
    #[inline]
    pub fn accumulate(&mut self, instances: u32) {
        self.instance_count = self.instance_count.saturating_add(instances);
    }
}

/// Per-effect particle storage.
#[derive(Debug, Clone)]
pub struct ParticlePool {
    particles: Vec<Particle>,
    /// Free slot indices; popped from the back.
    free_list: Vec<u32>,
    alive_count: u32,
    /// Spawns issued so far; the per-particle hash input.
    spawn_index: u32,
    /// Visible slots in draw order, rebuilt by cull every frame.
    draw_indices: Vec<u32>,
    indirect: IndirectDrawRecord,
}

impl ParticlePool {
    /// Creates a pool of dead particles.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        assert!(capacity > 0, "Pool capacity must be greater than zero");

        Self {
            particles: vec![Particle::dead(); capacity as usize],
            // Reverse so slot 0 is handed out first.
            free_list: (0..capacity).rev().collect(),
            alive_count: 0,
            spawn_index: 0,
            draw_indices: Vec::with_capacity(capacity as usize),
            indirect: IndirectDrawRecord::empty(),
        }
    }

    /// Slot count.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn capacity(&self) -> u32 {
        self.particles.len() as u32
    }

    /// Live particles.
    #[inline]
    #[must_use]
    pub const fn alive_count(&self) -> u32 {
        self.alive_count
    }

    /// `capacity - alive_count`.
    #[inline]
    #[must_use]
    pub fn free_slots(&self) -> u32 {
        self.capacity() - self.alive_count
    }

    /// All slots, live or dead.
    #[inline]
    #[must_use]
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// All slots, mutable.
    #[inline]
    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    /// Marks a live slot dead and returns it to the free list.
    pub(crate) fn release_slot(&mut self, index: u32) {
        let particle = &mut self.particles[index as usize];
        debug_assert!(particle.is_alive(), "Released slot {index} was not alive");
        particle.flags[0] &= !FLAG_ALIVE;
        self.free_list.push(index);
        self.alive_count -= 1;
    }

    /// Takes a free slot for a new particle and advances the spawn index.
    ///
    /// Returns `(slot, spawn_index)`.
    pub(crate) fn acquire_slot(&mut self) -> Option<(u32, u32)> {
        let slot = self.free_list.pop()?;
        let spawn_index = self.spawn_index;
        self.spawn_index = self.spawn_index.wrapping_add(1);
        self.alive_count += 1;
        Some((slot, spawn_index))
    }

    /// Spawns issued over the pool's lifetime (wrapping).
    #[inline]
    #[must_use]
    pub const fn spawn_index(&self) -> u32 {
        self.spawn_index
    }

    /// Visible slots from the last cull, in draw order.
    #[inline]
    #[must_use]
    pub fn draw_indices(&self) -> &[u32] {
        &self.draw_indices
    }

    pub(crate) fn draw_indices_mut(&mut self) -> &mut Vec<u32> {
        &mut self.draw_indices
    }

    /// Indirect draw record from the last cull.
    #[inline]
    #[must_use]
    pub const fn indirect(&self) -> IndirectDrawRecord {
        self.indirect
    }

    pub(crate) fn indirect_mut(&mut self) -> &mut IndirectDrawRecord {
        &mut self.indirect
    }

    /// Clears the draw list and zeroes the instance count.
    pub fn reset_indirect(&mut self) {
        self.indirect = IndirectDrawRecord::empty();
        self.draw_indices.clear();
    }

    /// Device memory the pool occupies.
    #[must_use]
    pub fn gpu_memory_bytes(&self) -> u64 {
        self.particles.len() as u64 * Particle::SIZE as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particle_size() {
        assert_eq!(Particle::SIZE, 80);
        assert_eq!(std::mem::size_of::<IndirectDrawRecord>(), 16);
    }

    #[test]
    fn test_new_pool_is_empty() {
        let pool = ParticlePool::new(8);
        assert_eq!(pool.capacity(), 8);
        assert_eq!(pool.alive_count(), 0);
        assert_eq!(pool.free_slots(), 8);
        assert!(pool.particles().iter().all(|p| !p.is_alive()));
        assert_eq!(pool.gpu_memory_bytes(), 640);
    }

    #[test]
    fn test_acquire_release_cycle() {
        let mut pool = ParticlePool::new(4);
        let (slot, index) = pool.acquire_slot().expect("free slot");
        assert_eq!((slot, index), (0, 0));
        pool.particles_mut()[slot as usize].flags[0] = FLAG_ALIVE;

        assert_eq!(pool.alive_count(), 1);
        pool.release_slot(slot);
        assert_eq!(pool.alive_count(), 0);

        // Slot reused, spawn index keeps climbing.
        let (slot, index) = pool.acquire_slot().expect("free slot");
        assert_eq!((slot, index), (0, 1));
    }

    #[test]
    fn test_acquire_exhausts() {
        let mut pool = ParticlePool::new(2);
        assert!(pool.acquire_slot().is_some());
        assert!(pool.acquire_slot().is_some());
        assert!(pool.acquire_slot().is_none());
        assert_eq!(pool.free_slots(), 0);
    }

    #[test]
    #[should_panic(expected = "Pool capacity must be greater than zero")]
    fn test_zero_capacity_panics() {
        let _ = ParticlePool::new(0);
    }
}
