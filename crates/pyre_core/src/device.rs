//! # Device Collaborators
//!
//! The runtime never talks to a graphics API. It records what the device
//! must do through these traits and the host renderer maps them onto its
//! own objects.
//!
//! ```text
//!             ┌──────────────┐  dispatch / barrier   ┌───────────────┐
//! Registry ──►│  GpuDevice   │──────────────────────►│ host renderer │
//!             └──────────────┘                       └───────────────┘
//! Swapper  ──► PipelineFactory (worker thread)
//! Registry ──► PhysicsHandoff  (debris events)
//! Registry ──► DrawSink        (indirect draws)
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pyre_shared::{DebrisSpawnEvent, Mat4, RendererConfig};

use crate::error::VfxResult;
use crate::pool::IndirectDrawRecord;

/// Opaque per-effect device resource set (particle buffers, free list, counters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub u64);

/// Opaque command buffer handle supplied by the host each frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CommandBufferId(pub u64);

/// Opaque renderer pipeline handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineHandle(pub u64);

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Return expired particles to the free list.
    Retire,
    /// Initialize new particles.
    Emit,
    /// Integrate forces.
    Simulate,
    /// Depth key generation and radix passes.
    Sort,
    /// Frustum test and draw-list compaction.
    CullCompact,
    /// Debris candidate selection into the readback ring.
    DebrisWrite,
}

/// One compute dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    /// Stage being run.
    pub stage: Stage,
    /// Effect resources bound.
    pub resources: ResourceId,
    /// Workgroups launched.
    pub group_count: u32,
    /// Sub-pass within the stage (radix digit for `Sort`, else 0).
    pub pass: u32,
}

/// Threads per compute workgroup.
pub const WORKGROUP_SIZE: u32 = 256;

/// Workgroups needed to cover `items`.
#[inline]
#[must_use]
pub const fn group_count(items: u32) -> u32 {
    items.div_ceil(WORKGROUP_SIZE)
}

/// Records device work for the particle stages.
pub trait GpuDevice: Send {
    /// Allocates buffers for an effect with `capacity` particle slots.
    fn create_effect_resources(&mut self, effect_slot: u32, capacity: u32) -> ResourceId;

    /// Frees an effect's buffers.
    fn destroy_effect_resources(&mut self, resources: ResourceId);

    /// Records a compute dispatch.
    fn record_dispatch(&mut self, command_buffer: CommandBufferId, dispatch: Dispatch);

    /// Records a barrier making `after`'s writes visible to the next stage.
    fn record_barrier(&mut self, command_buffer: CommandBufferId, after: Stage);
}

/// Builds renderer pipelines. Called from the rebuild worker.
pub trait PipelineFactory: Send + Sync {
    /// Builds a pipeline for `renderer`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VfxError::PipelineBuild`] if the pipeline cannot be built.
    fn build(&self, renderer: &RendererConfig) -> VfxResult<PipelineHandle>;

    /// Destroys a pipeline no frame references any more.
    fn destroy(&self, pipeline: PipelineHandle);
}

/// Receives particles promoted to rigid bodies.
pub trait PhysicsHandoff: Send {
    /// Called once per promoted particle.
    fn on_debris_spawn(&mut self, event: DebrisSpawnEvent);
}

impl PhysicsHandoff for crossbeam_channel::Sender<DebrisSpawnEvent> {
    fn on_debris_spawn(&mut self, event: DebrisSpawnEvent) {
        if self.send(event).is_err() {
            tracing::warn!("Physics handoff receiver dropped, debris event lost");
        }
    }
}

/// Per-frame inputs from the host renderer.
#[derive(Debug, Clone)]
pub struct FrameContext {
    /// Command buffer to record into.
    pub command_buffer: CommandBufferId,
    /// Camera view matrix.
    pub camera_view: Mat4,
    /// Camera projection matrix.
    pub camera_projection: Mat4,
    /// Six planes as `(nx, ny, nz, d)`, 24 floats. Missing values read as zero.
    pub frustum_planes: Vec<f32>,
    /// Monotonic frame counter.
    pub frame_index: u64,
}

impl FrameContext {
    /// Frame with identity camera and the given planes.
    #[must_use]
    pub fn new(frame_index: u64, frustum_planes: Vec<f32>) -> Self {
        Self {
            command_buffer: CommandBufferId::default(),
            camera_view: Mat4::IDENTITY,
            camera_projection: Mat4::IDENTITY,
            frustum_planes,
            frame_index,
        }
    }
}

/// One indirect draw for one effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCommand {
    /// Registry slot of the effect.
    pub effect_slot: u32,
    /// Rebuilt renderer pipeline, if a hot reload produced one.
    pub pipeline: Option<PipelineHandle>,
    /// Draw arguments.
    pub indirect: IndirectDrawRecord,
}

/// Collects draw commands for the frame.
pub trait DrawSink {
    /// Appends one draw.
    fn push(&mut self, command: DrawCommand);
}

impl DrawSink for Vec<DrawCommand> {
    fn push(&mut self, command: DrawCommand) {
        Vec::push(self, command);
    }
}

// =============================================================================
// HEADLESS IMPLEMENTATIONS
// =============================================================================

/// A recorded device call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Effect buffers created.
    Create {
        /// Resources.
        resources: ResourceId,
        /// Slot capacity.
        capacity: u32,
    },
    /// Effect buffers destroyed.
    Destroy(ResourceId),
    /// Compute dispatch.
    Dispatch(Dispatch),
    /// Barrier after a stage.
    Barrier(Stage),
}

/// Device that only records calls. Used headless and in tests.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    commands: Vec<DeviceCommand>,
    live: HashSet<ResourceId>,
    next_id: u64,
}

impl RecordingDevice {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far, in order.
    #[must_use]
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Drops the recorded log, keeping live-resource tracking.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Resources created and not yet destroyed.
    #[must_use]
    pub fn live_resources(&self) -> usize {
        self.live.len()
    }
}

impl GpuDevice for RecordingDevice {
    fn create_effect_resources(&mut self, _effect_slot: u32, capacity: u32) -> ResourceId {
        self.next_id += 1;
        let resources = ResourceId(self.next_id);
        self.live.insert(resources);
        self.commands.push(DeviceCommand::Create { resources, capacity });
        resources
    }

    fn destroy_effect_resources(&mut self, resources: ResourceId) {
        if !self.live.remove(&resources) {
            tracing::warn!("Destroying unknown effect resources {:?}", resources);
        }
        self.commands.push(DeviceCommand::Destroy(resources));
    }

    fn record_dispatch(&mut self, _command_buffer: CommandBufferId, dispatch: Dispatch) {
        self.commands.push(DeviceCommand::Dispatch(dispatch));
    }

    fn record_barrier(&mut self, _command_buffer: CommandBufferId, after: Stage) {
        self.commands.push(DeviceCommand::Barrier(after));
    }
}

/// [`RecordingDevice`] that stays inspectable after being handed to a registry.
#[derive(Debug, Clone, Default)]
pub struct SharedRecordingDevice(pub Arc<Mutex<RecordingDevice>>);

impl SharedRecordingDevice {
    /// Empty shared recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl GpuDevice for SharedRecordingDevice {
    fn create_effect_resources(&mut self, effect_slot: u32, capacity: u32) -> ResourceId {
        self.0.lock().create_effect_resources(effect_slot, capacity)
    }

    fn destroy_effect_resources(&mut self, resources: ResourceId) {
        self.0.lock().destroy_effect_resources(resources);
    }

    fn record_dispatch(&mut self, command_buffer: CommandBufferId, dispatch: Dispatch) {
        self.0.lock().record_dispatch(command_buffer, dispatch);
    }

    fn record_barrier(&mut self, command_buffer: CommandBufferId, after: Stage) {
        self.0.lock().record_barrier(command_buffer, after);
    }
}

/// Pipeline factory that hands out sequential ids and counts builds/destroys.
#[derive(Debug, Default)]
pub struct HeadlessPipelineFactory {
    built: AtomicU64,
    destroyed: AtomicU64,
}

impl HeadlessPipelineFactory {
    /// New factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipelines built so far.
    #[must_use]
    pub fn built(&self) -> u64 {
        self.built.load(Ordering::Acquire)
    }

    /// Pipelines destroyed so far.
    #[must_use]
    pub fn destroyed(&self) -> u64 {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl PipelineFactory for HeadlessPipelineFactory {
    fn build(&self, _renderer: &RendererConfig) -> VfxResult<PipelineHandle> {
        Ok(PipelineHandle(self.built.fetch_add(1, Ordering::AcqRel) + 1))
    }

    fn destroy(&self, _pipeline: PipelineHandle) {
        self.destroyed.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_count() {
        assert_eq!(group_count(0), 0);
        assert_eq!(group_count(1), 1);
        assert_eq!(group_count(256), 1);
        assert_eq!(group_count(257), 2);
    }

    #[test]
    fn test_recording_device_tracks_resources() {
        let mut device = RecordingDevice::new();
        let a = device.create_effect_resources(1, 64);
        let b = device.create_effect_resources(2, 64);
        assert_ne!(a, b);
        assert_eq!(device.live_resources(), 2);
        device.destroy_effect_resources(a);
        assert_eq!(device.live_resources(), 1);
        assert_eq!(device.commands().len(), 3);
    }

    #[test]
    fn test_channel_handoff_forwards() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut sink = tx;
        sink.on_debris_spawn(DebrisSpawnEvent {
            world_transform: Mat4::IDENTITY,
            velocity: pyre_shared::Vec3::ZERO,
            angular_velocity: pyre_shared::Vec3::ZERO,
            mass: 1.0,
            mesh_id: "rock".into(),
            material_tag: "stone".into(),
            source_emitter_id: 1,
        });
        assert_eq!(rx.try_iter().count(), 1);
    }
}
