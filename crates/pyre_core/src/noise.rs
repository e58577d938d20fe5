//! # Curl Noise Field
//!
//! A divergence-free velocity field baked once per noise configuration and
//! sampled by the simulate stage.
//!
//! ## Baking
//!
//! ```text
//! seeded fractal value noise ──► vector potential ψ on a grid³ lattice
//!                              ──► curl ψ by central differences
//!                              ──► NoiseField3D (grid³ × vec3)
//! ```
//!
//! The field covers `[-world_scale, world_scale]` on each axis. Positions
//! outside clamp to the border.

use pyre_shared::{NoiseForceConfig, Vec3};

use crate::error::{VfxError, VfxResult};
use crate::hash::pcg_hash;

/// Default lattice resolution per axis.
pub const DEFAULT_GRID_SIZE: u32 = 64;
/// Default half-extent of the field in world units.
pub const DEFAULT_WORLD_SCALE: f32 = 100.0;

/// Per-component seed offsets so ψx, ψy, ψz are independent.
const COMPONENT_SALTS: [u32; 3] = [0x68e3_1da4, 0xb529_7a4d, 0x1b56_c4e9];

/// Baked curl-noise vectors.
#[derive(Debug, Clone)]
pub struct NoiseField3D {
    grid: u32,
    world_scale: f32,
    vectors: Vec<[f32; 3]>,
}

impl NoiseField3D {
    /// Bakes the curl of a fractal vector potential.
    ///
    /// # Errors
    ///
    /// Returns [`VfxError::InvalidArgument`] if `grid` is below 2 or
    /// `world_scale` is not positive.
    #[allow(clippy::cast_precision_loss)]
    pub fn bake(config: &NoiseForceConfig, grid: u32, world_scale: f32) -> VfxResult<Self> {
        if grid < 2 {
            return Err(VfxError::invalid_argument("grid", "need at least 2 samples per axis"));
        }
        if world_scale.is_nan() || world_scale <= 0.0 {
            return Err(VfxError::invalid_argument("world_scale", "must be positive"));
        }

        let n = grid as usize;
        let spacing = 2.0 * world_scale / (grid - 1) as f32;
        let world = |i: usize| -world_scale + i as f32 * spacing;

        // Potential on the lattice.
        let mut potential = vec![[0.0f32; 3]; n * n * n];
        for z in 0..n {
            for y in 0..n {
                for x in 0..n {
                    let p = Vec3::new(world(x), world(y), world(z));
                    let cell = &mut potential[(z * n + y) * n + x];
                    for (c, salt) in COMPONENT_SALTS.iter().enumerate() {
                        cell[c] = fractal(config, config.seed ^ salt, p);
                    }
                }
            }
        }

        // d(component)/d(axis) by central differences, one-sided at borders.
        let derivative = |x: usize, y: usize, z: usize, axis: usize, component: usize| -> f32 {
            let coord = [x, y, z][axis];
            let (lo, hi) = (coord.saturating_sub(1), (coord + 1).min(n - 1));
            let at = |c: usize| {
                let mut idx = [x, y, z];
                idx[axis] = c;
                potential[(idx[2] * n + idx[1]) * n + idx[0]][component]
            };
            (at(hi) - at(lo)) / ((hi - lo) as f32 * spacing)
        };

        let mut vectors = vec![[0.0f32; 3]; n * n * n];
        for z in 0..n {
            for y in 0..n {
                for x in 0..n {
                    vectors[(z * n + y) * n + x] = [
                        derivative(x, y, z, 1, 2) - derivative(x, y, z, 2, 1),
                        derivative(x, y, z, 2, 0) - derivative(x, y, z, 0, 2),
                        derivative(x, y, z, 0, 1) - derivative(x, y, z, 1, 0),
                    ];
                }
            }
        }

        tracing::debug!(
            "Baked curl noise field: grid={}, world_scale={}, seed={}",
            grid,
            world_scale,
            config.seed
        );

        Ok(Self {
            grid,
            world_scale,
            vectors,
        })
    }

    /// Lattice resolution per axis.
    #[must_use]
    pub const fn grid(&self) -> u32 {
        self.grid
    }

    /// Half-extent in world units.
    #[must_use]
    pub const fn world_scale(&self) -> f32 {
        self.world_scale
    }

    /// Trilinear sample at a world position.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn sample(&self, position: Vec3) -> Vec3 {
        let n = self.grid as usize;
        let max = (self.grid - 1) as f32;
        let scale = self.world_scale.max(1e-4);
        let to_grid = |v: f32| ((v / scale) * 0.5 + 0.5).clamp(0.0, 1.0) * max;

        let g = [to_grid(position.x), to_grid(position.y), to_grid(position.z)];
        let i0 = g.map(|v| (v.floor() as usize).min(n - 2));
        let t = [g[0] - i0[0] as f32, g[1] - i0[1] as f32, g[2] - i0[2] as f32];

        let mut out = [0.0f32; 3];
        for corner in 0..8usize {
            let offset = [corner & 1, (corner >> 1) & 1, (corner >> 2) & 1];
            let mut weight = 1.0;
            for axis in 0..3 {
                weight *= if offset[axis] == 1 { t[axis] } else { 1.0 - t[axis] };
            }
            let idx = ((i0[2] + offset[2]) * n + (i0[1] + offset[1])) * n + (i0[0] + offset[0]);
            let v = self.vectors[idx];
            for c in 0..3 {
                out[c] += v[c] * weight;
            }
        }
        Vec3::from_array(out)
    }
}

/// Fractal sum of value noise.
fn fractal(config: &NoiseForceConfig, seed: u32, p: Vec3) -> f32 {
    let mut total = 0.0;
    let mut amplitude = config.amplitude;
    let mut frequency = config.frequency;
    for octave in 0..config.octaves.max(1) {
        total += value_noise(seed.wrapping_add(octave), p * frequency) * amplitude;
        amplitude *= config.gain;
        frequency *= config.lacunarity;
    }
    total
}

/// Smooth value noise in `[-1, 1]`.
#[allow(clippy::cast_possible_truncation)]
fn value_noise(seed: u32, p: Vec3) -> f32 {
    let floor = [p.x.floor(), p.y.floor(), p.z.floor()];
    let base = floor.map(|v| v as i32);
    let fade = |t: f32| t * t * (3.0 - 2.0 * t);
    let t = [fade(p.x - floor[0]), fade(p.y - floor[1]), fade(p.z - floor[2])];

    let lattice = |dx: i32, dy: i32, dz: i32| -> f32 {
        #[allow(clippy::cast_sign_loss)]
        let h = pcg_hash(
            (base[0] + dx) as u32 ^ pcg_hash((base[1] + dy) as u32 ^ pcg_hash((base[2] + dz) as u32 ^ seed)),
        );
        crate::hash::unit_float(h) * 2.0 - 1.0
    };
    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;

    let x00 = lerp(lattice(0, 0, 0), lattice(1, 0, 0), t[0]);
    let x10 = lerp(lattice(0, 1, 0), lattice(1, 1, 0), t[0]);
    let x01 = lerp(lattice(0, 0, 1), lattice(1, 0, 1), t[0]);
    let x11 = lerp(lattice(0, 1, 1), lattice(1, 1, 1), t[0]);
    lerp(lerp(x00, x10, t[1]), lerp(x01, x11, t[1]), t[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NoiseForceConfig {
        NoiseForceConfig {
            frequency: 0.05,
            ..NoiseForceConfig::default()
        }
    }

    #[test]
    fn test_bake_rejects_bad_arguments() {
        assert!(NoiseField3D::bake(&config(), 1, 10.0).is_err());
        assert!(NoiseField3D::bake(&config(), 8, 0.0).is_err());
    }

    #[test]
    fn test_bake_is_deterministic() {
        let a = NoiseField3D::bake(&config(), 12, 50.0).expect("bake");
        let b = NoiseField3D::bake(&config(), 12, 50.0).expect("bake");
        let p = Vec3::new(3.0, -7.5, 11.0);
        assert_eq!(a.sample(p), b.sample(p));
    }

    #[test]
    fn test_field_is_not_flat() {
        let field = NoiseField3D::bake(&config(), 16, 50.0).expect("bake");
        let energy: f32 = (0..20)
            .map(|i| {
                let f = i as f32 * 4.0 - 40.0;
                field.sample(Vec3::new(f, f * 0.5, -f)).length()
            })
            .sum();
        assert!(energy > 0.0);
    }

    #[test]
    fn test_seed_changes_field() {
        let a = NoiseField3D::bake(&config(), 12, 50.0).expect("bake");
        let mut other = config();
        other.seed = 777;
        let b = NoiseField3D::bake(&other, 12, 50.0).expect("bake");
        let p = Vec3::new(10.0, 5.0, -3.0);
        assert_ne!(a.sample(p), b.sample(p));
    }

    #[test]
    fn test_outside_positions_clamp() {
        let field = NoiseField3D::bake(&config(), 8, 10.0).expect("bake");
        let edge = field.sample(Vec3::new(10.0, 10.0, 10.0));
        let beyond = field.sample(Vec3::new(1000.0, 1000.0, 1000.0));
        assert_eq!(edge, beyond);
    }
}
