//! Benchmark for the per-effect stage pipeline.
//!
//! TARGET: 16 continuous effects simulated well under one 60 Hz frame
//!
//! Run with: cargo bench --package pyre_core --bench stage_benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use pyre_core::stages::cull::cull_compact;
use pyre_core::stages::emit::{emit, EmitParams};
use pyre_core::{EffectRegistry, EngineConfig, FrameContext, Frustum, ParticlePool, RadixSorter};
use pyre_shared::{EffectDescriptor, EmissionRate, EmitterShape, Mat4, ParticleInit, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const SORT_KEYS: u32 = 64 * 1024;

fn benchmark_radix_sort(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let keys: Vec<u32> = (0..SORT_KEYS).map(|_| rng.gen()).collect();
    let values: Vec<u32> = (0..SORT_KEYS).collect();
    let mut sorter = RadixSorter::new();

    let mut group = c.benchmark_group("radix_sort");
    group.throughput(Throughput::Elements(u64::from(SORT_KEYS)));
    group.bench_function("64k_keys", |b| {
        let mut k = keys.clone();
        let mut v = values.clone();
        b.iter(|| {
            k.copy_from_slice(&keys);
            v.copy_from_slice(&values);
            sorter.sort(&mut k, &mut v);
            black_box(k[0])
        });
    });
    group.finish();
}

fn benchmark_cull_compact(c: &mut Criterion) {
    let init = ParticleInit::default();
    let shape = EmitterShape::sphere(100.0);
    let mut pool = ParticlePool::new(SORT_KEYS);
    let params = EmitParams {
        init: &init,
        shape: Some(&shape),
        transform: &Mat4::IDENTITY,
        seed: 7,
        emitter_slot: 0,
        physics: None,
    };
    emit(&mut pool, SORT_KEYS, &params);

    // Half-extent 50 keeps roughly an eighth of a radius-100 sphere.
    let normals = [
        [1.0, 0.0, 0.0],
        [-1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, -1.0, 0.0],
        [0.0, 0.0, 1.0],
        [0.0, 0.0, -1.0],
    ];
    let planes: Vec<f32> = normals.iter().flat_map(|[x, y, z]| [*x, *y, *z, 50.0]).collect();
    let frustum = Frustum::from_packed(&planes);

    let mut group = c.benchmark_group("cull_compact");
    group.throughput(Throughput::Elements(u64::from(SORT_KEYS)));
    group.bench_function("64k_particles", |b| {
        b.iter(|| black_box(cull_compact(&mut pool, None, &frustum)));
    });
    group.finish();
}

fn benchmark_full_frame(c: &mut Criterion) {
    let mut registry = EffectRegistry::headless(EngineConfig::default()).expect("registry");
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let mut descriptor = EffectDescriptor::new(format!("smoke_{i}"), EmissionRate::continuous(2000.0));
            descriptor.shape = Some(EmitterShape::sphere(1.0));
            #[allow(clippy::cast_precision_loss)]
            let transform = Mat4::from_translation(Vec3::new(i as f32 * 4.0, 0.0, 0.0));
            registry.spawn(descriptor, transform).expect("spawn")
        })
        .collect();

    // Warm the pools up to steady state.
    let mut frame = 0u64;
    for _ in 0..120 {
        registry.simulate(&handles, 1.0 / 60.0, &FrameContext::new(frame, Vec::new()));
        frame += 1;
    }

    let mut group = c.benchmark_group("full_frame");
    group.sample_size(20);
    group.throughput(Throughput::Elements(16));
    group.bench_function("16_continuous_effects", |b| {
        b.iter(|| {
            registry.simulate(&handles, 1.0 / 60.0, &FrameContext::new(frame, Vec::new()));
            frame += 1;
            black_box(registry.stats().active_particle_count)
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    benchmark_radix_sort,
    benchmark_cull_compact,
    benchmark_full_frame,
);

criterion_main!(benches);
