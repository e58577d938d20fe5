//! Simulate stage: semi-implicit Euler over every live particle.
//!
//! ```text
//! a  = Σ forces(p, v) + curl(p) · strength
//! v += a · dt
//! p += v · dt
//! age += dt / lifetime
//! ```

use pyre_shared::{Force, ForceType, Vec3, MAX_FORCES};

use crate::noise::NoiseField3D;
use crate::pool::ParticlePool;
use crate::stages::emit::MIN_LIFETIME;

/// Attractor falloff radius in world units.
pub const ATTRACTOR_RADIUS: f32 = 1.0;

/// Curl-noise input for the stage.
#[derive(Debug, Clone, Copy)]
pub struct CurlInput<'a> {
    /// Baked field.
    pub field: &'a NoiseField3D,
    /// Force strength.
    pub strength: f32,
}

/// Acceleration from one non-curl force.
#[inline]
fn force_acceleration(force: &Force, position: Vec3, velocity: Vec3) -> Vec3 {
    match force.force_type {
        ForceType::Gravity | ForceType::Wind => force.direction * force.strength,
        ForceType::Drag => velocity * -force.strength,
        ForceType::Attractor => {
            let to_origin = force.direction - position;
            let dist = to_origin.length();
            if dist < 0.001 {
                return Vec3::ZERO;
            }
            let falloff = 1.0 - (dist / ATTRACTOR_RADIUS).clamp(0.0, 1.0);
            to_origin * (force.strength * falloff / dist)
        }
        ForceType::CurlNoise => Vec3::ZERO,
    }
}

/// Integrates every live particle by `dt`.
///
/// At most [`MAX_FORCES`] non-curl forces apply, in list order.
pub fn simulate(pool: &mut ParticlePool, forces: &[Force], curl: Option<CurlInput<'_>>, dt: f32) {
    for p in pool.particles_mut() {
        if !p.is_alive() {
            continue;
        }
        let mut position = Vec3::from_array(p.position());
        let mut velocity = Vec3::from_array(p.velocity());

        let mut acceleration = Vec3::ZERO;
        for force in forces
            .iter()
            .filter(|f| f.force_type != ForceType::CurlNoise)
            .take(MAX_FORCES)
        {
            acceleration += force_acceleration(force, position, velocity);
        }
        if let Some(curl) = curl {
            acceleration += curl.field.sample(position) * curl.strength;
        }

        velocity += acceleration * dt;
        position += velocity * dt;
        let lifetime = p.size_lifetime[1].max(MIN_LIFETIME);

        p.position_age = [position.x, position.y, position.z, p.position_age[3] + dt / lifetime];
        p.velocity_mass[0] = velocity.x;
        p.velocity_mass[1] = velocity.y;
        p.velocity_mass[2] = velocity.z;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::FLAG_ALIVE;

    fn pool_with(velocity: [f32; 3], lifetime: f32) -> ParticlePool {
        let mut pool = ParticlePool::new(2);
        let (slot, _) = pool.acquire_slot().expect("slot");
        let p = &mut pool.particles_mut()[slot as usize];
        p.flags[0] = FLAG_ALIVE;
        p.position_age = [0.0, 0.0, 0.0, 0.0];
        p.velocity_mass = [velocity[0], velocity[1], velocity[2], 1.0];
        p.size_lifetime = [0.1, lifetime, 0.0, 0.0];
        pool
    }

    #[test]
    fn test_gravity_semi_implicit() {
        let mut pool = pool_with([0.0; 3], 2.0);
        simulate(&mut pool, &[Force::gravity(10.0)], None, 0.1);
        let p = pool.particles()[0];
        // v = -1, p = v * dt = -0.1
        assert!((p.velocity()[1] + 1.0).abs() < 1e-6);
        assert!((p.position()[1] + 0.1).abs() < 1e-6);
        assert!((p.age() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_drag_opposes_velocity() {
        let mut pool = pool_with([10.0, 0.0, 0.0], 1.0);
        simulate(&mut pool, &[Force::drag(1.0)], None, 0.1);
        assert!((pool.particles()[0].velocity()[0] - 9.0).abs() < 1e-5);
    }

    #[test]
    fn test_attractor_pulls_within_radius() {
        let mut pool = pool_with([0.0; 3], 1.0);
        let origin = Vec3::new(0.5, 0.0, 0.0);
        simulate(&mut pool, &[Force::attractor(origin, 4.0)], None, 0.1);
        // falloff = 0.5, pull = 2 along +x
        assert!((pool.particles()[0].velocity()[0] - 0.2).abs() < 1e-5);

        let mut far = pool_with([0.0; 3], 1.0);
        simulate(&mut far, &[Force::attractor(Vec3::new(5.0, 0.0, 0.0), 4.0)], None, 0.1);
        assert_eq!(far.particles()[0].velocity()[0], 0.0);
    }

    #[test]
    fn test_extra_forces_ignored() {
        let forces: Vec<Force> = (0..MAX_FORCES + 4)
            .map(|_| Force::wind(Vec3::new(1.0, 0.0, 0.0), 1.0))
            .collect();
        let mut pool = pool_with([0.0; 3], 1.0);
        simulate(&mut pool, &forces, None, 1.0);
        #[allow(clippy::cast_precision_loss)]
        let expected = MAX_FORCES as f32;
        assert!((pool.particles()[0].velocity()[0] - expected).abs() < 1e-4);
    }

    #[test]
    fn test_dead_particles_untouched() {
        let mut pool = ParticlePool::new(1);
        let before = pool.particles()[0];
        simulate(&mut pool, &[Force::gravity(9.8)], None, 0.1);
        assert_eq!(pool.particles()[0], before);
    }
}
