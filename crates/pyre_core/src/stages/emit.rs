//! Emit stage: initialize new particles from the descriptor's ranges.
//!
//! Every value is drawn from [`ParticleRng`] keyed by the effect seed and
//! the pool's running spawn index, so the same seed and the same spawn
//! counts replay the same particles.

use std::f32::consts::TAU;

use pyre_shared::{EmitterShape, EmitterShapeType, Mat4, ParticleInit, PhysicsHandoffConfig, Vec3};

use crate::hash::{ParticleRng, SALT_DIRECTION, SALT_LIFETIME, SALT_POSITION, SALT_SIZE, SALT_VELOCITY};
use crate::pool::{Particle, ParticlePool, FLAG_ALIVE, FLAG_DEBRIS};

/// Minimum lifetime, guards the age division.
pub const MIN_LIFETIME: f32 = 0.001;

/// Everything emit needs from the effect.
#[derive(Debug, Clone, Copy)]
pub struct EmitParams<'a> {
    /// Initial value ranges.
    pub init: &'a ParticleInit,
    /// Emitter shape; `None` emits from the origin.
    pub shape: Option<&'a EmitterShape>,
    /// Effect world transform.
    pub transform: &'a Mat4,
    /// Effect seed.
    pub seed: u32,
    /// Registry slot, stamped on each particle.
    pub emitter_slot: u32,
    /// Enabled physics handoff marks particles as debris and sets their mass.
    pub physics: Option<&'a PhysicsHandoffConfig>,
}

/// Spawns up to `count` particles. Returns how many were spawned.
pub fn emit(pool: &mut ParticlePool, count: u32, params: &EmitParams<'_>) -> u32 {
    let physics = params.physics.filter(|p| p.enabled);
    let mass = physics.map_or(1.0, |p| p.mass);
    let debris_bits = if physics.is_some() { FLAG_DEBRIS } else { 0 };
    let init = params.init;

    let mut spawned = 0;
    while spawned < count {
        let Some((slot, spawn_index)) = pool.acquire_slot() else {
            break;
        };
        let rng = ParticleRng::new(params.seed, spawn_index);

        let (local_position, direction) = sample_shape(params.shape, init, &rng);
        let position = params.transform.transform_point(local_position);
        let direction = params.transform.transform_vector(direction).normalized_or_zero();

        let speed = rng.range(SALT_VELOCITY, init.speed_min, init.speed_max);
        let velocity = direction * speed;
        let size = rng.range(SALT_SIZE, init.size_min, init.size_max);
        let lifetime = rng
            .range(SALT_LIFETIME, init.lifetime_min, init.lifetime_max)
            .max(MIN_LIFETIME);

        pool.particles_mut()[slot as usize] = Particle {
            position_age: [position.x, position.y, position.z, 0.0],
            velocity_mass: [velocity.x, velocity.y, velocity.z, mass],
            color: [init.color_rgb.x, init.color_rgb.y, init.color_rgb.z, init.alpha],
            size_lifetime: [size, lifetime, 0.0, 0.0],
            flags: [FLAG_ALIVE, params.emitter_slot, spawn_index, debris_bits],
        };
        spawned += 1;
    }
    spawned
}

/// Uniform direction on the unit sphere.
fn random_unit(rng: &ParticleRng, salt: u32) -> Vec3 {
    let z = rng.unit(salt, 0) * 2.0 - 1.0;
    let phi = rng.unit(salt, 1) * TAU;
    let r = (1.0 - z * z).max(0.0).sqrt();
    Vec3::new(r * phi.cos(), z, r * phi.sin())
}

/// Emitter-space start position and launch direction.
fn sample_shape(shape: Option<&EmitterShape>, init: &ParticleInit, rng: &ParticleRng) -> (Vec3, Vec3) {
    let configured = init.initial_direction.normalized_or_zero();
    let launch = |fallback: Vec3| {
        if configured == Vec3::ZERO {
            fallback
        } else {
            configured
        }
    };

    let Some(shape) = shape else {
        return (Vec3::ZERO, launch(random_unit(rng, SALT_DIRECTION)));
    };
    let dims = shape.dimensions;

    match shape.shape_type {
        EmitterShapeType::Sphere | EmitterShapeType::Hemisphere => {
            let mut dir = random_unit(rng, SALT_POSITION);
            if shape.shape_type == EmitterShapeType::Hemisphere {
                dir.y = dir.y.abs();
            }
            let radius = dims.x * rng.unit(SALT_POSITION, 2).cbrt();
            (dir * radius, launch(dir))
        }
        EmitterShapeType::Box | EmitterShapeType::Volume => {
            let p = Vec3::new(
                (rng.unit(SALT_POSITION, 0) - 0.5) * dims.x,
                (rng.unit(SALT_POSITION, 1) - 0.5) * dims.y,
                (rng.unit(SALT_POSITION, 2) - 0.5) * dims.z,
            );
            (p, launch(random_unit(rng, SALT_DIRECTION)))
        }
        EmitterShapeType::Cone => {
            let axis = launch(Vec3::Y);
            (Vec3::ZERO, cone_direction(rng, axis, dims.y))
        }
        EmitterShapeType::Torus => {
            let theta = rng.unit(SALT_POSITION, 0) * TAU;
            let phi = rng.unit(SALT_POSITION, 1) * TAU;
            let rho = dims.y * rng.unit(SALT_POSITION, 2).sqrt();
            let ring = dims.x + rho * phi.cos();
            let p = Vec3::new(ring * theta.cos(), rho * phi.sin(), ring * theta.sin());
            (p, launch(random_unit(rng, SALT_DIRECTION)))
        }
        // Mesh and spline geometry live outside the runtime.
        EmitterShapeType::Point | EmitterShapeType::MeshSurface | EmitterShapeType::Spline => {
            (Vec3::ZERO, launch(random_unit(rng, SALT_DIRECTION)))
        }
    }
}

/// Direction within `half_angle` radians of `axis`.
fn cone_direction(rng: &ParticleRng, axis: Vec3, half_angle: f32) -> Vec3 {
    let cos_max = half_angle.clamp(0.0, std::f32::consts::PI).cos();
    let cos_theta = 1.0 - rng.unit(SALT_DIRECTION, 0) * (1.0 - cos_max);
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi = rng.unit(SALT_DIRECTION, 1) * TAU;

    // Orthonormal basis around the axis.
    let helper = if axis.y.abs() < 0.99 { Vec3::Y } else { Vec3::new(1.0, 0.0, 0.0) };
    let u = cross(helper, axis).normalized_or_zero();
    let v = cross(axis, u);
    u * (sin_theta * phi.cos()) + v * (sin_theta * phi.sin()) + axis * cos_theta
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(a.y * b.z - a.z * b.y, a.z * b.x - a.x * b.z, a.x * b.y - a.y * b.x)
}
