//! Integration tests for live descriptor reloads and pipeline swaps.

use pyre_core::{
    DrawCommand, EffectRegistry, EngineConfig, FrameContext, HeadlessPipelineFactory, RecordingDevice,
    ReloadCategory,
};
use pyre_shared::{
    BlendMode, EffectDescriptor, EmissionRate, EmitterShape, Force, Mat4, NoiseForceConfig, ParticleInit, Vec3,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn registry() -> EffectRegistry {
    EffectRegistry::headless(EngineConfig::test_preset()).expect("registry")
}

fn sparks() -> EffectDescriptor {
    EffectDescriptor::new("sparks", EmissionRate::burst(100))
}

#[test]
fn forces_only_patches_in_place() {
    let mut registry = registry();
    let handle = registry.spawn(sparks(), Mat4::IDENTITY).expect("spawn");
    registry.simulate(&[handle.clone()], 0.016, &FrameContext::new(0, Vec::new()));

    let mut updated = sparks();
    updated.forces.push(Force::gravity(30.0));
    let outcome = registry.reload_effect(&handle, updated.clone()).expect("live handle");

    assert_eq!(outcome.category, ReloadCategory::ForcesOnly);
    assert!(outcome.applied);
    assert!(outcome.respawned.is_none());
    assert!(registry.is_handle_alive(&handle));
    assert_eq!(registry.alive_count(&handle), Some(100));
    assert_eq!(registry.descriptor(&handle), Some(&updated));

    // Gravity now applies to the existing particles.
    registry.simulate(&[handle.clone()], 0.1, &FrameContext::new(1, Vec::new()));
    let pool = registry.pool(&handle).expect("pool");
    assert!(pool.particles().iter().filter(|p| p.is_alive()).all(|p| p.velocity()[1] < 0.0));
}

#[test]
fn burst_change_respawns_under_new_handle() {
    let mut registry = registry();
    let transform = Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0));
    let handle = registry.spawn(sparks(), transform).expect("spawn");

    let outcome = registry
        .reload_effect(&handle, EffectDescriptor::new("sparks", EmissionRate::burst(250)))
        .expect("live handle");

    assert_eq!(outcome.category, ReloadCategory::FullRespawn);
    let fresh = outcome.respawned.expect("respawned");
    assert_ne!(fresh, handle);
    assert!(!registry.is_handle_alive(&handle));
    assert!(registry.is_handle_alive(&fresh));
    assert_eq!(registry.last_respawned_handle(), Some(&fresh));
    assert_eq!(registry.effect_count(), 1);

    registry.simulate(&[fresh.clone()], 0.016, &FrameContext::new(0, Vec::new()));
    assert_eq!(registry.alive_count(&fresh), Some(250));
    // Same transform: particles start at the old origin.
    let pool = registry.pool(&fresh).expect("pool");
    assert!(pool
        .particles()
        .iter()
        .filter(|p| p.is_alive())
        .all(|p| (p.position()[0] - 3.0).abs() < 1e-3));
}

#[test]
fn shape_change_respawns() {
    let mut registry = registry();
    let handle = registry.spawn(sparks(), Mat4::IDENTITY).expect("spawn");
    let mut updated = sparks();
    updated.shape = Some(EmitterShape::sphere(2.0));
    let outcome = registry.reload_effect(&handle, updated).expect("live");
    assert_eq!(outcome.category, ReloadCategory::FullRespawn);
}

#[test]
fn invalid_descriptor_leaves_effect_untouched() {
    let mut registry = registry();
    let handle = registry.spawn(sparks(), Mat4::IDENTITY).expect("spawn");
    registry.simulate(&[handle.clone()], 0.016, &FrameContext::new(0, Vec::new()));

    let mut broken = EffectDescriptor::new("sparks", EmissionRate::burst(999));
    broken.init = Some(ParticleInit {
        lifetime_min: 3.0,
        lifetime_max: 1.0,
        ..ParticleInit::default()
    });
    let outcome = registry.reload_effect(&handle, broken).expect("live");

    assert_eq!(outcome.category, ReloadCategory::ForcesOnly);
    assert!(!outcome.applied);
    assert!(registry.is_handle_alive(&handle));
    assert_eq!(registry.descriptor(&handle), Some(&sparks()));
    assert_eq!(registry.alive_count(&handle), Some(100));
}

#[test]
fn stale_handle_reload_is_none() {
    let mut registry = registry();
    let handle = registry.spawn(sparks(), Mat4::IDENTITY).expect("spawn");
    registry.despawn(&handle);
    assert!(registry.reload_effect(&handle, sparks()).is_none());
}

#[test]
fn renderer_change_swaps_pipeline_without_respawn() {
    let mut registry = registry();
    let handle = registry.spawn(sparks(), Mat4::IDENTITY).expect("spawn");
    let handles = [handle.clone()];

    let mut updated = sparks();
    if let Some(renderer) = updated.renderer.as_mut() {
        renderer.blend_mode = BlendMode::Additive;
    }
    let outcome = registry.reload_effect(&handle, updated).expect("live");
    assert_eq!(outcome.category, ReloadCategory::RendererChanged);
    assert!(registry.is_handle_alive(&handle));

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut frame = 0;
    let mut draws: Vec<DrawCommand> = Vec::new();
    loop {
        registry.simulate(&handles, 0.001, &FrameContext::new(frame, Vec::new()));
        draws.clear();
        registry.record_draws(&handles, &mut draws);
        if draws[0].pipeline.is_some() {
            break;
        }
        assert!(Instant::now() < deadline, "pipeline never swapped");
        frame += 1;
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(registry.pending_rebuilds(), 0);
    assert_eq!(registry.alive_count(&handle), Some(100));
}

#[test]
fn despawn_mid_reload_drops_pending_rebuild() {
    let mut registry = registry();
    let handle = registry.spawn(sparks(), Mat4::IDENTITY).expect("spawn");
    let mut updated = sparks();
    if let Some(renderer) = updated.renderer.as_mut() {
        renderer.texture_atlas_id = Some("atlas_02".into());
    }
    registry.reload_effect(&handle, updated).expect("live");
    registry.despawn(&handle);
    assert_eq!(registry.pending_rebuilds(), 0);
}

fn curled(frequency: f32) -> EffectDescriptor {
    let mut d = sparks();
    d.forces.push(Force::curl_noise(
        4.0,
        NoiseForceConfig {
            frequency,
            ..NoiseForceConfig::default()
        },
    ));
    d
}

#[test]
fn noise_edits_do_not_accumulate_baked_fields() {
    let mut registry = registry();
    let handle = registry.spawn(curled(0.02), Mat4::IDENTITY).expect("spawn");
    assert_eq!(registry.cached_noise_fields(), 1);

    for step in 1..=10u8 {
        let outcome = registry
            .reload_effect(&handle, curled(0.02 + f32::from(step) * 0.01))
            .expect("live");
        assert_eq!(outcome.category, ReloadCategory::ForcesOnly);
        assert_eq!(registry.cached_noise_fields(), 1);
    }

    registry.despawn(&handle);
    assert_eq!(registry.cached_noise_fields(), 0);
}

#[test]
fn shared_noise_field_lives_until_last_user_despawns() {
    let mut registry = registry();
    let a = registry.spawn(curled(0.05), Mat4::IDENTITY).expect("a");
    let b = registry.spawn(curled(0.05), Mat4::IDENTITY).expect("b");
    assert_eq!(registry.cached_noise_fields(), 1);

    registry.despawn(&a);
    assert_eq!(registry.cached_noise_fields(), 1);
    registry.despawn(&b);
    assert_eq!(registry.cached_noise_fields(), 0);
}

#[test]
fn replaced_pipeline_destroyed_with_no_effects_left() {
    let factory = Arc::new(HeadlessPipelineFactory::new());
    let mut registry = EffectRegistry::new(
        EngineConfig::test_preset(),
        Box::new(RecordingDevice::new()),
        factory.clone(),
    )
    .expect("registry");
    let frames_in_flight = u64::from(registry.config().frames_in_flight);
    let handle = registry.spawn(sparks(), Mat4::IDENTITY).expect("spawn");
    let handles = [handle.clone()];

    let mut updated = sparks();
    if let Some(renderer) = updated.renderer.as_mut() {
        renderer.soft_particles = true;
    }
    registry.reload_effect(&handle, updated).expect("live");

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut frame = 0;
    while registry.pending_rebuilds() > 0 {
        registry.simulate(&handles, 0.001, &FrameContext::new(frame, Vec::new()));
        assert!(Instant::now() < deadline, "pipeline never swapped");
        frame += 1;
        thread::sleep(Duration::from_millis(1));
    }

    // Retires the active pipeline at the last simulated frame.
    registry.despawn(&handle);
    let retired_at = frame - 1;
    registry.simulate(&[], 0.001, &FrameContext::new(retired_at + frames_in_flight - 1, Vec::new()));
    assert_eq!(factory.destroyed(), 0);
    registry.simulate(&[], 0.001, &FrameContext::new(retired_at + frames_in_flight, Vec::new()));
    assert_eq!(factory.destroyed(), 1);
}
