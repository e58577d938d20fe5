//! Runtime statistics surfaced to the host.

use crate::budget::BudgetStats;

/// Snapshot returned by [`crate::EffectRegistry::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VfxStats {
    /// Live effects.
    pub active_effect_count: u32,
    /// Live particles across all effects.
    pub active_particle_count: u32,
    /// Effects skipped by LOD sleeping in the last frame.
    pub sleeping_emitter_count: u32,
    /// Live particles outside the frustum in the last frame.
    pub culled_particle_count: u32,
    /// Debris events forwarded to the physics handoff in the last frame.
    pub debris_events_forwarded: u32,
    /// Device memory held by particle pools.
    pub gpu_memory_bytes: u64,
    /// Budget allocator snapshot.
    pub budget: BudgetStats,
}

/// Counters reset at the start of every simulate call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FrameCounters {
    pub sleeping: u32,
    pub culled: u32,
    pub debris_forwarded: u32,
}

impl FrameCounters {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
