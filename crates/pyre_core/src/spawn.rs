//! # Spawn Scheduling
//!
//! Turns an emission rate, a frame delta and the free pool capacity into
//! an integer spawn count.
//!
//! - **Burst**: edge-triggered; fires `burst_count` once after creation or
//!   [`SpawnScheduler::reset`].
//! - **Continuous**: carries the fractional remainder between frames so
//!   the long-run rate matches `particles_per_second` under any frame-time
//!   jitter.
//! - **Event**: host-triggered, never spawns here.
//!
//! One scheduler per effect. Sharing one across effects leaks burst and
//! accumulator state between them.

use pyre_shared::{EmissionMode, EmissionRate};

/// Per-effect emission state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpawnScheduler {
    /// Fractional particles carried into the next frame.
    accumulator: f32,
    /// Whether the burst already fired.
    burst_consumed: bool,
}

impl SpawnScheduler {
    /// Fresh scheduler.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            accumulator: 0.0,
            burst_consumed: false,
        }
    }

    /// Particles to spawn this frame, clamped to `[0, free_slots]`.
    ///
    /// The clamp is silent: it is exactly the overflow the budget allocator
    /// is meant to prevent upstream.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn compute_spawn_count(
        &mut self,
        rate: Option<&EmissionRate>,
        delta_time: f32,
        free_slots: u32,
    ) -> u32 {
        let Some(rate) = rate else {
            return 0;
        };
        if free_slots == 0 || delta_time <= 0.0 || delta_time.is_nan() {
            return 0;
        }

        let count = match rate.mode {
            EmissionMode::Burst => {
                if self.burst_consumed {
                    0
                } else {
                    self.burst_consumed = true;
                    rate.burst_count
                }
            }
            EmissionMode::Continuous => {
                let exact = rate.particles_per_second.max(0.0) * delta_time + self.accumulator;
                let spawn = exact.floor();
                self.accumulator = exact - spawn;
                if spawn >= u32::MAX as f32 {
                    u32::MAX
                } else {
                    spawn as u32
                }
            }
            EmissionMode::Event => 0,
        };

        count.min(free_slots)
    }

    /// Clears the accumulator and re-arms the burst.
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
        self.burst_consumed = false;
    }

    /// Fractional carry.
    #[inline]
    #[must_use]
    pub const fn accumulator(&self) -> f32 {
        self.accumulator
    }

    /// Whether the burst already fired.
    #[inline]
    #[must_use]
    pub const fn burst_consumed(&self) -> bool {
        self.burst_consumed
    }
}
