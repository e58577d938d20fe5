//! # Stage Pipeline
//!
//! Five fixed stages per effect per frame, each followed by a barrier:
//!
//! ```text
//! ┌────────┐   ┌──────┐   ┌──────────┐   ┌──────┐   ┌──────────────┐
//! │ Retire │──►│ Emit │──►│ Simulate │──►│ Sort │──►│ Cull/Compact │
//! └────────┘ │ └──────┘ │ └──────────┘ │ └──────┘ │ └──────────────┘
//!         barrier    barrier       barrier    barrier
//! ```
//!
//! Sort runs only when the blend mode needs back-to-front order.
//!
//! The stage objects hold no per-effect state; only scratch reused across
//! effects. Everything that persists lives in the effect's
//! [`ParticlePool`] and [`SpawnScheduler`].

pub mod cull;
pub mod emit;
pub mod retire;
pub mod simulate;
pub mod sort;

use pyre_shared::{EffectDescriptor, Mat4, ParticleInit, Vec3};

use crate::device::{group_count, CommandBufferId, Dispatch, GpuDevice, ResourceId, Stage};
use crate::noise::NoiseField3D;
use crate::pool::ParticlePool;
use crate::spawn::SpawnScheduler;

use self::cull::Frustum;
use self::emit::EmitParams;
use self::simulate::CurlInput;
use self::sort::{RadixSorter, RADIX_PASSES};

/// Per-effect inputs for one frame.
#[derive(Debug, Clone, Copy)]
pub struct StageInputs<'a> {
    /// Current descriptor.
    pub descriptor: &'a EffectDescriptor,
    /// World transform.
    pub transform: &'a Mat4,
    /// Simulation step in seconds.
    pub dt: f32,
    /// Step fed to the spawn scheduler (LOD-scaled).
    pub emission_dt: f32,
    /// Effect seed.
    pub seed: u32,
    /// Registry slot.
    pub emitter_slot: u32,
    /// Camera world position.
    pub camera_position: Vec3,
    /// Cull frustum.
    pub frustum: &'a Frustum,
    /// Baked curl field when the descriptor has a curl-noise force.
    pub noise: Option<&'a NoiseField3D>,
    /// Command buffer to record into.
    pub command_buffer: CommandBufferId,
    /// Effect device resources.
    pub resources: ResourceId,
}

/// What one run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Particles retired.
    pub retired: u32,
    /// Particles spawned.
    pub spawned: u32,
    /// Whether the sort stage ran.
    pub sorted: bool,
    /// Particles drawn.
    pub visible: u32,
    /// Live particles outside the frustum.
    pub culled: u32,
}

/// Shared stage objects.
#[derive(Debug, Default)]
pub struct StagePipeline {
    sorter: RadixSorter,
    keys: Vec<u32>,
    order: Vec<u32>,
}

impl StagePipeline {
    /// Creates the pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys from the last sort, ascending.
    #[must_use]
    pub fn sorted_keys(&self) -> &[u32] {
        &self.keys
    }

    /// Runs all stages for one effect.
    pub fn run(
        &mut self,
        pool: &mut ParticlePool,
        scheduler: &mut SpawnScheduler,
        inputs: &StageInputs<'_>,
        device: &mut dyn GpuDevice,
    ) -> StageReport {
        let cb = inputs.command_buffer;
        let resources = inputs.resources;
        let capacity_groups = group_count(pool.capacity());
        let dispatch = |stage, group_count, pass| Dispatch {
            stage,
            resources,
            group_count,
            pass,
        };
        let descriptor = inputs.descriptor;

        pool.reset_indirect();
        self.keys.clear();
        self.order.clear();

        // Retire
        device.record_dispatch(cb, dispatch(Stage::Retire, capacity_groups, 0));
        let retired = retire::retire(pool);
        device.record_barrier(cb, Stage::Retire);

        // Emit
        let spawn_count =
            scheduler.compute_spawn_count(descriptor.rate.as_ref(), inputs.emission_dt, pool.free_slots());
        device.record_dispatch(cb, dispatch(Stage::Emit, group_count(spawn_count), 0));
        let default_init;
        let init = match &descriptor.init {
            Some(init) => init,
            None => {
                default_init = ParticleInit::default();
                &default_init
            }
        };
        let spawned = emit::emit(
            pool,
            spawn_count,
            &EmitParams {
                init,
                shape: descriptor.shape.as_ref(),
                transform: inputs.transform,
                seed: inputs.seed,
                emitter_slot: inputs.emitter_slot,
                physics: descriptor.physics.as_ref(),
            },
        );
        device.record_barrier(cb, Stage::Emit);

        // Simulate
        device.record_dispatch(cb, dispatch(Stage::Simulate, capacity_groups, 0));
        let curl = inputs.noise.zip(descriptor.curl_noise()).map(|(field, force)| CurlInput {
            field,
            strength: force.strength,
        });
        simulate::simulate(pool, &descriptor.forces, curl, inputs.dt);
        device.record_barrier(cb, Stage::Simulate);

        // Sort
        let sorted = descriptor.blend_mode().requires_sort();
        if sorted {
            sort::build_depth_keys(pool, inputs.camera_position, &mut self.keys, &mut self.order);
            device.record_dispatch(cb, dispatch(Stage::Sort, capacity_groups, 0));
            for pass in 1..=RADIX_PASSES {
                device.record_dispatch(cb, dispatch(Stage::Sort, capacity_groups, pass));
            }
            self.sorter.sort(&mut self.keys, &mut self.order);
            device.record_barrier(cb, Stage::Sort);
        }

        // Cull / compact
        device.record_dispatch(cb, dispatch(Stage::CullCompact, capacity_groups, 0));
        let order = sorted.then_some(self.order.as_slice());
        let (visible, culled) = cull::cull_compact(pool, order, inputs.frustum);
        device.record_barrier(cb, Stage::CullCompact);

        StageReport {
            retired,
            spawned,
            sorted,
            visible,
            culled,
        }
    }
}
