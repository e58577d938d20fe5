//! # Deterministic Simulation Harness
//!
//! Runs one effect headless for a fixed number of steps and records what
//! happened. Two runs with the same config, descriptor, step count, `dt`
//! and seed produce identical traces.

use std::sync::Arc;

use pyre_shared::{DebrisSpawnEvent, EffectDescriptor, Mat4};

use crate::config::EngineConfig;
use crate::device::{DrawCommand, FrameContext, HeadlessPipelineFactory, RecordingDevice};
use crate::error::{VfxError, VfxResult};
use crate::hash::pcg_hash;
use crate::registry::EffectRegistry;

/// Per-step observations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationTrace {
    /// Live particles after each step.
    pub alive_counts: Vec<u32>,
    /// Instances drawn after each step.
    pub draw_counts: Vec<u32>,
    /// Debris events forwarded during each step.
    pub debris_counts: Vec<u32>,
    /// Hash of every live particle position after the last step.
    pub position_signature: u32,
}

impl SimulationTrace {
    /// Alive count after the last step.
    #[must_use]
    pub fn final_alive(&self) -> u32 {
        self.alive_counts.last().copied().unwrap_or(0)
    }
}

/// Fixed-step headless runner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeterministicSimHarness {
    /// Frames to run.
    pub steps: u32,
    /// Seconds per frame.
    pub dt: f32,
    /// Seed for per-effect seeds; overrides the config's.
    pub seed: u64,
}

impl Default for DeterministicSimHarness {
    fn default() -> Self {
        Self {
            steps: 60,
            dt: 1.0 / 60.0,
            seed: 1234,
        }
    }
}

impl DeterministicSimHarness {
    /// Harness for `steps` frames of `dt` seconds.
    #[must_use]
    pub const fn new(steps: u32, dt: f32, seed: u64) -> Self {
        Self { steps, dt, seed }
    }

    /// Spawns `descriptor` at the origin and steps it.
    ///
    /// # Errors
    ///
    /// Returns [`VfxError::Config`] for an invalid config, or
    /// [`VfxError::InvalidArgument`] if the budget denies the effect.
    pub fn run(&self, config: &EngineConfig, descriptor: &EffectDescriptor) -> VfxResult<SimulationTrace> {
        let config = EngineConfig {
            seed: self.seed,
            ..config.clone()
        };
        let mut registry = EffectRegistry::new(
            config,
            Box::new(RecordingDevice::new()),
            Arc::new(HeadlessPipelineFactory::new()),
        )?;

        let (debris_tx, debris_rx) = crossbeam_channel::unbounded::<DebrisSpawnEvent>();
        registry.set_physics_handoff(Some(Box::new(debris_tx)));

        let handle = registry
            .spawn(descriptor.clone(), Mat4::IDENTITY)
            .ok_or_else(|| VfxError::invalid_argument("descriptor", "budget denied the effect"))?;
        let handles = [handle];

        let mut trace = SimulationTrace::default();
        let mut draws: Vec<DrawCommand> = Vec::new();
        for step in 0..self.steps {
            let frame = FrameContext::new(u64::from(step), Vec::new());
            registry.simulate(&handles, self.dt, &frame);

            draws.clear();
            registry.record_draws(&handles, &mut draws);

            trace.alive_counts.push(registry.alive_count(&handles[0]).unwrap_or(0));
            trace
                .draw_counts
                .push(draws.iter().map(|d| d.indirect.instance_count).sum());
            #[allow(clippy::cast_possible_truncation)]
            let debris = debris_rx.try_iter().count() as u32;
            trace.debris_counts.push(debris);
        }

        trace.position_signature = registry.pool(&handles[0]).map_or(0, |pool| {
            pool.particles()
                .iter()
                .filter(|p| p.is_alive())
                .flat_map(|p| p.position())
                .fold(0x811c_9dc5, |acc, v| pcg_hash(acc ^ v.to_bits()))
        });

        tracing::debug!(
            "Harness run of {} finished: {} steps, final alive {}",
            descriptor.id,
            self.steps,
            trace.final_alive()
        );
        Ok(trace)
    }
}
