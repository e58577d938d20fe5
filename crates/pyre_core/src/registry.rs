//! # Effect Registry
//!
//! Owns every live effect and drives the per-frame work.
//!
//! ```text
//! simulate(handles, dt, frame)
//!   ├─► drain readback[read slot]  ──► PhysicsHandoff
//!   ├─► reset readback[write slot]
//!   └─► per effect
//!         ├─► swapper.poll_and_swap
//!         ├─► LOD (sleep / scale emission)
//!         ├─► Retire → Emit → Simulate → Sort → Cull
//!         └─► debris candidates ──► readback[write slot]
//! ```
//!
//! ## Handles
//!
//! Slots are recycled through a free-id stack. Each slot keeps a
//! generation bumped on despawn, so a handle that outlives its effect is
//! detected by comparison and every operation on it is a silent no-op.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use pyre_shared::{
    camera_position, DescriptorValidator, EffectDescriptor, EffectHandle, EffectValidator, ForceType, Mat4,
    NoiseForceConfig, MAX_FORCES,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::budget::{BudgetAllocation, BudgetAllocator};
use crate::config::EngineConfig;
use crate::device::{
    group_count, Dispatch, DrawCommand, DrawSink, FrameContext, GpuDevice, HeadlessPipelineFactory, PhysicsHandoff,
    PipelineFactory, RecordingDevice, ResourceId, Stage,
};
use crate::error::VfxResult;
use crate::lod::LodPolicy;
use crate::noise::NoiseField3D;
use crate::pool::ParticlePool;
use crate::readback::{write_debris_candidates, CandidateCriteria, ReadbackRing};
use crate::reload::{ReloadCategory, ReloadClassifier};
use crate::spawn::SpawnScheduler;
use crate::stages::cull::Frustum;
use crate::stages::{StageInputs, StagePipeline};
use crate::stats::{FrameCounters, VfxStats};
use crate::swapper::PipelineSwapper;

/// Per-effect state.
struct EffectState {
    effect_id: Arc<str>,
    descriptor: EffectDescriptor,
    transform: Mat4,
    allocation: BudgetAllocation,
    pool: ParticlePool,
    scheduler: SpawnScheduler,
    resources: ResourceId,
    seed: u32,
    noise: Option<Arc<NoiseField3D>>,
    sleeping: bool,
}

#[derive(Default)]
struct EffectSlot {
    generation: u32,
    state: Option<EffectState>,
}

/// Slot table with generational ids.
#[derive(Default)]
struct EffectTable {
    slots: Vec<EffectSlot>,
    free_ids: Vec<u32>,
    by_allocation: HashMap<u64, u32>,
    live: u32,
}

impl EffectTable {
    fn get(&self, handle: &EffectHandle) -> Option<&EffectState> {
        let slot = self.slots.get(handle.id as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.state.as_ref()
    }

    fn get_mut(&mut self, handle: &EffectHandle) -> Option<&mut EffectState> {
        let slot = self.slots.get_mut(handle.id as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.state.as_mut()
    }

    /// Stores `state` in a free slot and returns its handle.
    #[allow(clippy::cast_possible_truncation)]
    fn insert(&mut self, state: EffectState) -> EffectHandle {
        let id = self.free_ids.pop().unwrap_or_else(|| {
            self.slots.push(EffectSlot::default());
            (self.slots.len() - 1) as u32
        });
        self.by_allocation.insert(state.allocation.allocation_id, id);
        let slot = &mut self.slots[id as usize];
        let handle = EffectHandle::new(id, slot.generation, Arc::clone(&state.effect_id));
        slot.state = Some(state);
        self.live += 1;
        handle
    }

    /// Takes the effect out, bumping the generation and freeing the id.
    fn remove(&mut self, id: u32) -> Option<EffectState> {
        let slot = self.slots.get_mut(id as usize)?;
        let state = slot.state.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_ids.push(id);
        self.by_allocation.remove(&state.allocation.allocation_id);
        self.live -= 1;
        Some(state)
    }

    fn states(&self) -> impl Iterator<Item = &EffectState> {
        self.slots.iter().filter_map(|s| s.state.as_ref())
    }

    /// State in slot `id` if it is still the occupant stamped `generation`.
    fn state_for(&self, id: u32, generation: u32) -> Option<&EffectState> {
        let slot = self.slots.get(id as usize)?;
        if slot.generation != generation {
            return None;
        }
        slot.state.as_ref()
    }
}

/// Frees an effect's device resources and pipeline.
fn teardown(id: u32, state: &EffectState, device: &mut dyn GpuDevice, swapper: &mut PipelineSwapper, frame: u64) {
    device.destroy_effect_resources(state.resources);
    swapper.forget(id, frame);
}

/// Result of [`EffectRegistry::reload_effect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadOutcome {
    /// Classification of the change.
    pub category: ReloadCategory,
    /// Whether the effect was modified.
    pub applied: bool,
    /// Replacement handle after a full respawn, `None` if the respawn was denied.
    pub respawned: Option<EffectHandle>,
}

/// Owner of every live effect.
pub struct EffectRegistry {
    config: EngineConfig,
    budget: BudgetAllocator,
    effects: EffectTable,
    pipeline: StagePipeline,
    readback: ReadbackRing,
    swapper: PipelineSwapper,
    device: Box<dyn GpuDevice>,
    validator: Box<dyn DescriptorValidator>,
    physics: Option<Box<dyn PhysicsHandoff>>,
    /// Baked fields by settings; effects hold the only strong references.
    noise_cache: Vec<(NoiseForceConfig, Weak<NoiseField3D>)>,
    seeds: ChaCha8Rng,
    last_respawned: Option<EffectHandle>,
    frame_index: u64,
    counters: FrameCounters,
}

impl std::fmt::Debug for EffectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectRegistry")
            .field("effects", &self.effects.live)
            .field("budget", &self.budget)
            .field("swapper", &self.swapper)
            .field("frame_index", &self.frame_index)
            .finish_non_exhaustive()
    }
}

impl EffectRegistry {
    /// Creates a registry over the host's device and pipeline factory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VfxError::Config`] for an invalid configuration, or
    /// the swapper's error if the rebuild worker cannot start.
    pub fn new(
        config: EngineConfig,
        device: Box<dyn GpuDevice>,
        factory: Arc<dyn PipelineFactory>,
    ) -> VfxResult<Self> {
        config.validate()?;
        let budget = BudgetAllocator::new(config.total_budget, config.budget_policy)?;
        let swapper = PipelineSwapper::new(factory, config.frames_in_flight)?;

        tracing::info!(
            "Effect registry created: budget {} ({:?}), {} frames in flight",
            config.total_budget,
            config.budget_policy,
            config.frames_in_flight
        );

        Ok(Self {
            readback: ReadbackRing::new(config.debris.max_candidates),
            seeds: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            budget,
            effects: EffectTable::default(),
            pipeline: StagePipeline::new(),
            swapper,
            device,
            validator: Box::new(EffectValidator),
            physics: None,
            noise_cache: Vec::new(),
            last_respawned: None,
            frame_index: 0,
            counters: FrameCounters::default(),
        })
    }

    /// Registry over a [`RecordingDevice`] and [`HeadlessPipelineFactory`].
    ///
    /// # Errors
    ///
    /// As [`EffectRegistry::new`].
    pub fn headless(config: EngineConfig) -> VfxResult<Self> {
        Self::new(
            config,
            Box::new(RecordingDevice::new()),
            Arc::new(HeadlessPipelineFactory::new()),
        )
    }

    /// Replaces the descriptor validator used to gate reloads.
    #[must_use]
    pub fn with_validator(mut self, validator: Box<dyn DescriptorValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Spawns an effect. Returns `None` if the budget denies it.
    pub fn spawn(&mut self, descriptor: EffectDescriptor, transform: Mat4) -> Option<EffectHandle> {
        let requested = self.config.request_for(&descriptor);
        let frame = self.frame_index;

        let effects = &mut self.effects;
        let device = &mut *self.device;
        let swapper = &mut self.swapper;
        let allocation = self.budget.allocate(requested, |evicted| {
            // The allocator releases the evicted allocation itself.
            let Some(id) = effects.by_allocation.get(&evicted).copied() else {
                return;
            };
            if let Some(state) = effects.remove(id) {
                tracing::info!("Evicted effect {}#{} for budget", state.effect_id, id);
                teardown(id, &state, &mut *device, &mut *swapper, frame);
            }
        });
        let Some(allocation) = allocation else {
            tracing::debug!("Spawn of {} denied: {} particles unavailable", descriptor.id, requested);
            return None;
        };

        let packed = descriptor
            .forces
            .iter()
            .filter(|f| f.force_type != ForceType::CurlNoise)
            .count();
        if packed > MAX_FORCES {
            tracing::warn!(
                "Effect {} has {} forces, only the first {} apply",
                descriptor.id,
                packed,
                MAX_FORCES
            );
        }

        let capacity = allocation.granted_particles;
        let noise = self.noise_for(&descriptor);
        let seed = self.seeds.gen::<u32>();
        let effect_id: Arc<str> = Arc::from(descriptor.id.as_str());

        // Resource creation needs the slot id, which insert assigns.
        let state = EffectState {
            effect_id,
            descriptor,
            transform,
            allocation,
            pool: ParticlePool::new(capacity),
            scheduler: SpawnScheduler::new(),
            resources: ResourceId(0),
            seed,
            noise,
            sleeping: false,
        };
        let handle = self.effects.insert(state);
        let resources = self.device.create_effect_resources(handle.id, capacity);
        if let Some(state) = self.effects.get_mut(&handle) {
            state.resources = resources;
        }

        tracing::debug!("Spawned {} with {} particles", handle, capacity);
        Some(handle)
    }

    /// Despawns an effect. Stale handles are ignored.
    pub fn despawn(&mut self, handle: &EffectHandle) {
        if self.effects.get(handle).is_none() {
            return;
        }
        if let Some(state) = self.effects.remove(handle.id) {
            self.budget.release(state.allocation.allocation_id);
            teardown(handle.id, &state, &mut *self.device, &mut self.swapper, self.frame_index);
            tracing::debug!("Despawned {}", handle);
        }
        self.prune_noise_cache();
    }

    /// Whether `handle` refers to a live effect.
    #[must_use]
    pub fn is_handle_alive(&self, handle: &EffectHandle) -> bool {
        self.effects.get(handle).is_some()
    }

    /// Moves an effect. Stale handles are ignored.
    pub fn update_transform(&mut self, handle: &EffectHandle, transform: Mat4) {
        if let Some(state) = self.effects.get_mut(handle) {
            state.transform = transform;
        }
    }

    /// Installs or clears the debris sink.
    pub fn set_physics_handoff(&mut self, handoff: Option<Box<dyn PhysicsHandoff>>) {
        self.physics = handoff;
    }

    /// Baked field for the descriptor's curl-noise force, shared between
    /// effects with equal noise settings.
    fn noise_for(&mut self, descriptor: &EffectDescriptor) -> Option<Arc<NoiseField3D>> {
        let config = descriptor.curl_noise()?.noise.as_ref()?;
        self.prune_noise_cache();
        if let Some(field) = self
            .noise_cache
            .iter()
            .find(|(c, _)| c == config)
            .and_then(|(_, field)| field.upgrade())
        {
            return Some(field);
        }
        match NoiseField3D::bake(config, self.config.noise.grid_size, self.config.noise.world_scale) {
            Ok(field) => {
                let field = Arc::new(field);
                self.noise_cache.push((config.clone(), Arc::downgrade(&field)));
                Some(field)
            }
            Err(e) => {
                tracing::warn!("Curl noise for {} not baked: {}", descriptor.id, e);
                None
            }
        }
    }

    /// Drops cache entries no live effect uses.
    fn prune_noise_cache(&mut self) {
        self.noise_cache.retain(|(_, field)| field.strong_count() > 0);
    }

    // =========================================================================
    // FRAME
    // =========================================================================

    /// Runs one frame for `handles`. Stale handles are skipped.
    pub fn simulate(&mut self, handles: &[EffectHandle], dt: f32, frame: &FrameContext) {
        self.frame_index = frame.frame_index;
        self.counters.reset();
        self.forward_debris(frame.frame_index);
        self.readback.write_buffer(frame.frame_index).reset_on_gpu();
        self.swapper.destroy_due(frame.frame_index);

        let camera = camera_position(&frame.camera_view);
        let frustum = Frustum::from_packed(&frame.frustum_planes);
        let criteria_age = self.config.debris.age_threshold;
        let default_speed = self.config.debris.default_speed_threshold;

        for handle in handles {
            self.swapper.poll_and_swap(handle.id, frame.frame_index);

            let Some(state) = self.effects.get_mut(handle) else {
                continue;
            };

            let distance = state.transform.translation().distance_squared(camera).sqrt();
            let lod = LodPolicy::decide(state.descriptor.lod.as_ref(), distance);
            state.sleeping = lod.sleeping;
            if lod.sleeping {
                self.counters.sleeping += 1;
                continue;
            }

            let inputs = StageInputs {
                descriptor: &state.descriptor,
                transform: &state.transform,
                dt,
                emission_dt: dt * lod.emission_scale,
                seed: state.seed,
                emitter_slot: handle.id,
                camera_position: camera,
                frustum: &frustum,
                noise: state.noise.as_deref(),
                command_buffer: frame.command_buffer,
                resources: state.resources,
            };
            let report = self
                .pipeline
                .run(&mut state.pool, &mut state.scheduler, &inputs, &mut *self.device);
            self.counters.culled += report.culled;
            if report.spawned > 0 {
                tracing::debug!("{} spawned {} (alive {})", handle, report.spawned, state.pool.alive_count());
            }

            let Some(physics) = state.descriptor.physics.as_ref().filter(|p| p.enabled) else {
                continue;
            };
            let criteria = CandidateCriteria {
                age_threshold: criteria_age,
                speed_threshold: if physics.speed_threshold > 0.0 {
                    physics.speed_threshold
                } else {
                    default_speed
                },
            };
            self.device.record_dispatch(
                frame.command_buffer,
                Dispatch {
                    stage: Stage::DebrisWrite,
                    resources: state.resources,
                    group_count: group_count(state.pool.capacity()),
                    pass: 0,
                },
            );
            let slot = self.readback.write_buffer(frame.frame_index);
            write_debris_candidates(&state.pool, handle.id, handle.generation, physics, criteria, slot);
            self.device.record_barrier(frame.command_buffer, Stage::DebrisWrite);
        }

        let written = self.readback.write_buffer(frame.frame_index);
        if written.overflowed() {
            tracing::warn!(
                "Debris readback overflow: {} candidates, {} kept",
                written.count(),
                written.capacity()
            );
        }
    }

    /// Sends the candidates written two frames ago to the physics sink.
    fn forward_debris(&mut self, frame_index: u64) {
        let Some(sink) = self.physics.as_mut() else {
            return;
        };
        let slot = self.readback.read_buffer(frame_index);
        for candidate in slot.read_candidates() {
            // The emitter may have despawned, or its slot been reused, since the write.
            let Some(physics) = self
                .effects
                .state_for(candidate.emitter_id, candidate.emitter_generation)
                .and_then(|s| s.descriptor.physics.as_ref())
                .filter(|p| p.enabled)
            else {
                continue;
            };
            sink.on_debris_spawn(candidate.to_spawn_event(physics));
            self.counters.debris_forwarded += 1;
        }
    }

    /// Emits one draw per live, awake handle using the last cull result.
    pub fn record_draws(&self, handles: &[EffectHandle], sink: &mut dyn DrawSink) {
        for handle in handles {
            let Some(state) = self.effects.get(handle) else {
                continue;
            };
            if state.sleeping {
                continue;
            }
            sink.push(DrawCommand {
                effect_slot: handle.id,
                pipeline: self.swapper.active_pipeline(handle.id),
                indirect: state.pool.indirect(),
            });
        }
    }

    // =========================================================================
    // HOT RELOAD
    // =========================================================================

    /// Applies an updated descriptor to a live effect.
    ///
    /// Returns `None` for a stale handle.
    pub fn reload_effect(&mut self, handle: &EffectHandle, updated: EffectDescriptor) -> Option<ReloadOutcome> {
        let state = self.effects.get(handle)?;
        let assessment = ReloadClassifier::new(&*self.validator).assess(&state.descriptor, &updated);
        let transform = state.transform;

        if assessment.is_invalid() {
            for error in assessment.errors.iter().filter(|e| e.is_error()) {
                tracing::warn!("Reload of {} rejected: {}", handle, error);
            }
            return Some(ReloadOutcome {
                category: assessment.category,
                applied: false,
                respawned: None,
            });
        }

        let category = assessment.category;
        let mut respawned = None;
        match category {
            ReloadCategory::ForcesOnly => self.patch_descriptor(handle, updated),
            ReloadCategory::RendererChanged => {
                let renderer = updated.renderer.clone();
                self.patch_descriptor(handle, updated);
                if let Some(renderer) = renderer {
                    if let Err(e) = self.swapper.submit_rebuild(handle.id, renderer) {
                        tracing::warn!("Pipeline rebuild for {} not queued: {}", handle, e);
                    }
                }
            }
            ReloadCategory::FullRespawn => {
                self.despawn(handle);
                respawned = self.spawn(updated, transform);
                tracing::info!(
                    "Respawned {} as {}",
                    handle,
                    respawned.as_ref().map_or_else(|| "<denied>".to_owned(), ToString::to_string)
                );
                self.last_respawned.clone_from(&respawned);
            }
        }

        Some(ReloadOutcome {
            category,
            applied: true,
            respawned,
        })
    }

    /// Replaces the descriptor in place, re-baking curl noise if its
    /// settings changed.
    fn patch_descriptor(&mut self, handle: &EffectHandle, updated: EffectDescriptor) {
        let noise_changed = self.effects.get(handle).is_some_and(|s| {
            s.descriptor.curl_noise().and_then(|f| f.noise.as_ref()) != updated.curl_noise().and_then(|f| f.noise.as_ref())
        });
        let noise = if noise_changed { Some(self.noise_for(&updated)) } else { None };

        if let Some(state) = self.effects.get_mut(handle) {
            if let Some(noise) = noise {
                state.noise = noise;
            }
            state.descriptor = updated;
        }
        self.prune_noise_cache();
    }

    /// Handle produced by the most recent full-respawn reload.
    #[must_use]
    pub fn last_respawned_handle(&self) -> Option<&EffectHandle> {
        self.last_respawned.as_ref()
    }

    // =========================================================================
    // INSPECTION
    // =========================================================================

    /// Zeroes the budget's rejected/clamped/evicted counters.
    pub fn reset_frame_counters(&self) {
        self.budget.reset_counters();
    }

    /// Live effects.
    #[must_use]
    pub const fn effect_count(&self) -> u32 {
        self.effects.live
    }

    /// Live particles of one effect.
    #[must_use]
    pub fn alive_count(&self, handle: &EffectHandle) -> Option<u32> {
        self.effects.get(handle).map(|s| s.pool.alive_count())
    }

    /// Particle pool of one effect.
    #[must_use]
    pub fn pool(&self, handle: &EffectHandle) -> Option<&ParticlePool> {
        self.effects.get(handle).map(|s| &s.pool)
    }

    /// Current descriptor of one effect.
    #[must_use]
    pub fn descriptor(&self, handle: &EffectHandle) -> Option<&EffectDescriptor> {
        self.effects.get(handle).map(|s| &s.descriptor)
    }

    /// Depth keys from the most recent sort.
    #[must_use]
    pub fn last_sorted_keys(&self) -> &[u32] {
        self.pipeline.sorted_keys()
    }

    /// Baked curl-noise fields currently cached.
    #[must_use]
    pub fn cached_noise_fields(&self) -> usize {
        self.noise_cache.iter().filter(|(_, field)| field.strong_count() > 0).count()
    }

    /// Rebuilds queued but not yet swapped in.
    #[must_use]
    pub fn pending_rebuilds(&self) -> usize {
        self.swapper.pending_count()
    }

    /// Statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> VfxStats {
        let mut stats = VfxStats {
            active_effect_count: self.effects.live,
            sleeping_emitter_count: self.counters.sleeping,
            culled_particle_count: self.counters.culled,
            debris_events_forwarded: self.counters.debris_forwarded,
            budget: self.budget.stats(),
            ..VfxStats::default()
        };
        for state in self.effects.states() {
            stats.active_particle_count += state.pool.alive_count();
            stats.gpu_memory_bytes += state.pool.gpu_memory_bytes();
        }
        stats
    }
}

impl Drop for EffectRegistry {
    fn drop(&mut self) {
        let ids: Vec<u32> = self.effects.by_allocation.values().copied().collect();
        for id in ids {
            if let Some(state) = self.effects.remove(id) {
                self.budget.release(state.allocation.allocation_id);
                teardown(id, &state, &mut *self.device, &mut self.swapper, self.frame_index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::BudgetPolicy;
    use pyre_shared::EmissionRate;

    fn registry(budget: u32, policy: BudgetPolicy) -> EffectRegistry {
        EffectRegistry::headless(EngineConfig {
            total_budget: budget,
            budget_policy: policy,
            per_effect_particles: 64,
            ..EngineConfig::test_preset()
        })
        .expect("registry")
    }

    fn burst(n: u32) -> EffectDescriptor {
        EffectDescriptor::new("fx", EmissionRate::burst(n))
    }

    #[test]
    fn test_spawn_and_despawn_recycle_ids() {
        let mut r = registry(1024, BudgetPolicy::Reject);
        let a = r.spawn(burst(8), Mat4::IDENTITY).expect("spawn");
        assert!(r.is_handle_alive(&a));
        assert_eq!(r.effect_count(), 1);

        r.despawn(&a);
        assert!(!r.is_handle_alive(&a));
        assert_eq!(r.stats().budget.used_budget, 0);

        let b = r.spawn(burst(8), Mat4::IDENTITY).expect("spawn");
        assert_eq!(b.id, a.id);
        assert_ne!(b.generation, a.generation);
        assert!(!r.is_handle_alive(&a));

        // Stale handle operations are no-ops.
        r.despawn(&a);
        r.update_transform(&a, Mat4::from_translation(pyre_shared::Vec3::Y));
        assert!(r.is_handle_alive(&b));
    }

    #[test]
    fn test_reject_denies_spawn() {
        let mut r = registry(100, BudgetPolicy::Reject);
        assert!(r.spawn(burst(8), Mat4::IDENTITY).is_some());
        assert!(r.spawn(burst(8), Mat4::IDENTITY).is_none());
        assert_eq!(r.stats().budget.rejected, 1);
        r.reset_frame_counters();
        assert_eq!(r.stats().budget.rejected, 0);
    }

    #[test]
    fn test_evict_oldest_despawns_owner() {
        let mut r = registry(128, BudgetPolicy::EvictOldest);
        let a = r.spawn(burst(8), Mat4::IDENTITY).expect("a");
        let b = r.spawn(burst(8), Mat4::IDENTITY).expect("b");
        let c = r.spawn(burst(8), Mat4::IDENTITY).expect("c");

        assert!(!r.is_handle_alive(&a));
        assert!(r.is_handle_alive(&b));
        assert!(r.is_handle_alive(&c));
        let stats = r.stats();
        assert_eq!(stats.active_effect_count, 2);
        assert_eq!(stats.budget.evicted, 1);
        assert_eq!(stats.budget.used_budget, 128);
    }

    #[test]
    fn test_gpu_memory_tracks_capacity() {
        let mut r = registry(1024, BudgetPolicy::Clamp);
        r.spawn(burst(8), Mat4::IDENTITY).expect("spawn");
        assert_eq!(r.stats().gpu_memory_bytes, 64 * 80);
    }
}
