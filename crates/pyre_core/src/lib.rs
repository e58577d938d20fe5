//! # PYRE Core
//!
//! Lifecycle and scheduling engine for device-resident particle effects.
//!
//! ## Frame Flow
//!
//! ```text
//! host ──► EffectRegistry::simulate(handles, dt, frame)
//!            │
//!            ├─► ReadbackRing (debris from frame N-2) ──► PhysicsHandoff
//!            ├─► PipelineSwapper::poll_and_swap
//!            └─► StagePipeline: Retire → Emit → Simulate → Sort → Cull
//!                                  ▲
//!                           SpawnScheduler
//!
//! host ──► EffectRegistry::record_draws(handles, sink) ──► DrawSink
//! ```
//!
//! ## Architecture Rules
//!
//! 1. **Recorded, not issued** - every device operation goes through [`GpuDevice`]
//! 2. **Fixed stage order** - one barrier after each stage, never reordered
//! 3. **Replayable** - per-particle values come from integer hashes of a seed
//! 4. **One background thread** - the pipeline rebuild worker
//!
//! ## Example
//!
//! ```rust,ignore
//! use pyre_core::{EffectRegistry, EngineConfig, FrameContext};
//! use pyre_shared::{EffectDescriptor, EmissionRate, Mat4};
//!
//! let mut registry = EffectRegistry::headless(EngineConfig::default())?;
//! let sparks = registry.spawn(EffectDescriptor::new("sparks", EmissionRate::burst(500)), Mat4::IDENTITY);
//! registry.simulate(&[sparks.unwrap()], 1.0 / 60.0, &FrameContext::new(0, Vec::new()));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod budget;
pub mod config;
pub mod device;
pub mod error;
pub mod harness;
pub mod hash;
pub mod lod;
pub mod noise;
pub mod pool;
pub mod readback;
pub mod registry;
pub mod reload;
pub mod spawn;
pub mod stages;
pub mod stats;
pub mod swapper;

pub use budget::{BudgetAllocation, BudgetAllocator, BudgetPolicy, BudgetStats, DEFAULT_GLOBAL_BUDGET};
pub use config::{CapacitySizing, DebrisConfig, EngineConfig, NoiseFieldConfig};
pub use device::{
    CommandBufferId, DeviceCommand, Dispatch, DrawCommand, DrawSink, FrameContext, GpuDevice,
    HeadlessPipelineFactory, PhysicsHandoff, PipelineFactory, PipelineHandle, RecordingDevice,
    ResourceId, SharedRecordingDevice, Stage,
};
pub use error::{VfxError, VfxResult};
pub use harness::{DeterministicSimHarness, SimulationTrace};
pub use lod::{LodDecision, LodPolicy};
pub use noise::NoiseField3D;
pub use pool::{IndirectDrawRecord, Particle, ParticlePool};
pub use readback::{DebrisCandidate, ReadbackRing, ReadbackSlot};
pub use registry::{EffectRegistry, ReloadOutcome};
pub use reload::{ReloadAssessment, ReloadCategory, ReloadClassifier};
pub use spawn::SpawnScheduler;
pub use stages::cull::Frustum;
pub use stages::sort::RadixSorter;
pub use stages::{StageInputs, StagePipeline, StageReport};
pub use stats::VfxStats;
pub use swapper::PipelineSwapper;
