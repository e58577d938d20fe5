//! # Readback Ring
//!
//! Debris candidates travel from the simulation to the physics system with
//! a fixed two-frame latency, the time it takes device writes to become
//! host-visible.
//!
//! ```text
//! frame:      N        N+1      N+2
//! write:    slot[N%3]
//! read:                       slot[N%3]   (= slot[(N+2-2)%3])
//! ```
//!
//! Three slots means the producer of frame N and the consumer of frame N
//! never touch the same slot, so no locking is needed.

use bytemuck::{Pod, Zeroable};
use pyre_shared::{DebrisSpawnEvent, Mat4, PhysicsHandoffConfig, Vec3};

use crate::pool::ParticlePool;

/// Ring depth (frames in flight).
pub const RING_SIZE: usize = 3;
/// Frames between a write and its read.
pub const READBACK_LATENCY: u64 = 2;
/// Default candidate capacity per slot.
pub const DEFAULT_MAX_CANDIDATES: u32 = 256;

/// A particle eligible for promotion to a rigid body.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct DebrisCandidate {
    /// Position X.
    pub px: f32,
    /// Position Y.
    pub py: f32,
    /// Position Z.
    pub pz: f32,
    /// Rigid-body mass.
    pub mass: f32,
    /// Velocity X.
    pub vx: f32,
    /// Velocity Y.
    pub vy: f32,
    /// Velocity Z.
    pub vz: f32,
    /// Spin about Y.
    pub angular_speed: f32,
    /// Interned mesh id.
    pub mesh_id: u32,
    /// Interned material tag.
    pub material_tag: u32,
    /// Registry slot of the emitting effect.
    pub emitter_id: u32,
    /// Slot generation at write time; a mismatch on read means the emitter
    /// was despawned in between.
    pub emitter_generation: u32,
}

impl DebrisCandidate {
    /// Size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Builds the physics event, translated to the candidate position.
    #[must_use]
    pub fn to_spawn_event(&self, physics: &PhysicsHandoffConfig) -> DebrisSpawnEvent {
        DebrisSpawnEvent {
            world_transform: Mat4::from_translation(Vec3::new(self.px, self.py, self.pz)),
            velocity: Vec3::new(self.vx, self.vy, self.vz),
            angular_velocity: Vec3::new(0.0, self.angular_speed, 0.0),
            mass: self.mass,
            mesh_id: physics.mesh_id.clone(),
            material_tag: physics.material_tag.clone(),
            source_emitter_id: self.emitter_id,
        }
    }
}

/// One ring position: a count plus fixed-capacity records.
#[derive(Debug, Clone)]
pub struct ReadbackSlot {
    /// Candidates the producer tried to write, possibly more than capacity.
    count: u32,
    candidates: Vec<DebrisCandidate>,
}

impl ReadbackSlot {
    /// Empty slot.
    ///
    /// # Panics
    ///
    /// Panics if `max_candidates` is zero.
    #[must_use]
    pub fn new(max_candidates: u32) -> Self {
        assert!(max_candidates > 0, "Readback capacity must be greater than zero");
        Self {
            count: 0,
            candidates: vec![DebrisCandidate::default(); max_candidates as usize],
        }
    }

    /// Clears the count before the producer writes.
    pub fn reset_on_gpu(&mut self) {
        self.count = 0;
    }

    /// Appends a candidate. Past capacity the count still grows but the
    /// record is dropped, as with a device-side atomic append.
    pub fn push(&mut self, candidate: DebrisCandidate) -> bool {
        let index = self.count as usize;
        self.count = self.count.saturating_add(1);
        match self.candidates.get_mut(index) {
            Some(dst) => {
                *dst = candidate;
                true
            }
            None => false,
        }
    }

    /// Appends many, truncating at capacity.
    pub fn write_candidates(&mut self, candidates: &[DebrisCandidate]) {
        for c in candidates {
            self.push(*c);
        }
    }

    /// Raw count, possibly above capacity.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Record capacity.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn capacity(&self) -> u32 {
        self.candidates.len() as u32
    }

    /// At most `min(count, capacity)` records.
    #[must_use]
    pub fn read_candidates(&self) -> &[DebrisCandidate] {
        let n = (self.count as usize).min(self.candidates.len());
        &self.candidates[..n]
    }

    /// Whether writes overflowed capacity.
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.count as usize > self.candidates.len()
    }
}

/// Three readback slots indexed by frame.
#[derive(Debug, Clone)]
pub struct ReadbackRing {
    slots: [ReadbackSlot; RING_SIZE],
}

impl ReadbackRing {
    /// Ring with `max_candidates` per slot.
    #[must_use]
    pub fn new(max_candidates: u32) -> Self {
        Self {
            slots: std::array::from_fn(|_| ReadbackSlot::new(max_candidates)),
        }
    }

    /// Slot index the producer writes for `frame_index`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn write_index(frame_index: u64) -> usize {
        (frame_index % RING_SIZE as u64) as usize
    }

    /// Slot index the consumer reads for `frame_index`: `(frame - 2) mod 3`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn read_index(frame_index: u64) -> usize {
        let ring = RING_SIZE as u64;
        ((frame_index % ring + ring - READBACK_LATENCY % ring) % ring) as usize
    }

    /// Slot written this frame.
    pub fn write_buffer(&mut self, frame_index: u64) -> &mut ReadbackSlot {
        &mut self.slots[Self::write_index(frame_index)]
    }

    /// Slot written two frames ago.
    #[must_use]
    pub fn read_buffer(&self, frame_index: u64) -> &ReadbackSlot {
        &self.slots[Self::read_index(frame_index)]
    }
}

/// Thresholds for promoting particles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateCriteria {
    /// Normalized age a particle must exceed.
    pub age_threshold: f32,
    /// Speed a particle must exceed.
    pub speed_threshold: f32,
}

/// Appends every qualifying live particle of `pool` to `slot`.
///
/// Returns how many were offered (including any dropped for capacity).
pub fn write_debris_candidates(
    pool: &ParticlePool,
    emitter_slot: u32,
    emitter_generation: u32,
    physics: &PhysicsHandoffConfig,
    criteria: CandidateCriteria,
    slot: &mut ReadbackSlot,
) -> u32 {
    let speed_sq = criteria.speed_threshold * criteria.speed_threshold;
    let mut offered = 0;
    for p in pool.particles() {
        if !p.is_alive() || !p.is_debris() || p.age() <= criteria.age_threshold {
            continue;
        }
        let v = Vec3::from_array(p.velocity());
        if v.length_squared() <= speed_sq {
            continue;
        }
        let [px, py, pz] = p.position();
        slot.push(DebrisCandidate {
            px,
            py,
            pz,
            mass: physics.mass,
            vx: v.x,
            vy: v.y,
            vz: v.z,
            angular_speed: v.length(),
            mesh_id: 0,
            material_tag: 0,
            emitter_id: emitter_slot,
            emitter_generation,
        });
        offered += 1;
    }
    offered
}
