//! Stateless per-particle randomness.
//!
//! Every per-particle random value is a pure function of the effect seed,
//! the particle's spawn index and a per-attribute salt, so a replay with
//! the same seed and spawn counts reproduces every particle bit for bit.

/// Salt for velocity draws.
pub const SALT_VELOCITY: u32 = 0x9e37_79b9;
/// Salt for size draws.
pub const SALT_SIZE: u32 = 0x7f4a_7c15;
/// Salt for lifetime draws.
pub const SALT_LIFETIME: u32 = 0x85eb_ca6b;
/// Salt for position draws.
pub const SALT_POSITION: u32 = 0xc2b2_ae35;
/// Salt for direction draws.
pub const SALT_DIRECTION: u32 = 0x27d4_eb2f;

/// PCG-RXS-M-XS 32-bit integer hash.
#[inline]
#[must_use]
pub const fn pcg_hash(v: u32) -> u32 {
    let state = v.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Maps the low 24 bits of `v` to `[0, 1)`.
#[inline]
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn unit_float(v: u32) -> f32 {
    (v & 0x00ff_ffff) as f32 / 16_777_216.0
}

/// Random stream for one particle.
#[derive(Debug, Clone, Copy)]
pub struct ParticleRng {
    base: u32,
}

impl ParticleRng {
    /// Stream for spawn `spawn_index` of the effect seeded with `seed`.
    #[inline]
    #[must_use]
    pub const fn new(seed: u32, spawn_index: u32) -> Self {
        Self {
            base: pcg_hash(seed ^ pcg_hash(spawn_index)),
        }
    }

    /// Value in `[0, 1)` for `salt`, with a sub-index for multi-component draws.
    #[inline]
    #[must_use]
    pub fn unit(&self, salt: u32, component: u32) -> f32 {
        unit_float(pcg_hash(self.base ^ salt ^ pcg_hash(component)))
    }

    /// Value in `[min, max]` for `salt`.
    #[inline]
    #[must_use]
    pub fn range(&self, salt: u32, min: f32, max: f32) -> f32 {
        min + (max - min) * self.unit(salt, 0)
    }
}
