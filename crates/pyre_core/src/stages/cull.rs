//! Frustum culling and draw-list compaction.
//!
//! Each particle is a sphere of radius `size`. Visible particles are packed
//! into the pool's draw-index list in the order given (sorted when the
//! sort stage ran) and counted into the indirect draw record.

use bytemuck::{Pod, Zeroable};
use pyre_shared::{Mat4, Vec3};

use crate::pool::ParticlePool;

/// Floats in a packed frustum (6 planes x 4).
pub const PACKED_FRUSTUM_LEN: usize = 24;

/// A plane in 3D space (Ax + By + Cz + D = 0).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Plane {
    /// Normal X component.
    pub a: f32,
    /// Normal Y component.
    pub b: f32,
    /// Normal Z component.
    pub c: f32,
    /// Distance from origin.
    pub d: f32,
}

impl Plane {
    /// Creates a new plane.
    #[must_use]
    pub const fn new(a: f32, b: f32, c: f32, d: f32) -> Self {
        Self { a, b, c, d }
    }

    /// Normalizes the plane.
    #[must_use]
    pub fn normalized(self) -> Self {
        let len = (self.a * self.a + self.b * self.b + self.c * self.c).sqrt();
        if len > 0.0 {
            Self {
                a: self.a / len,
                b: self.b / len,
                c: self.c / len,
                d: self.d / len,
            }
        } else {
            self
        }
    }

    /// Returns the signed distance from a point to the plane.
    #[inline]
    #[must_use]
    pub fn distance_to_point(&self, p: Vec3) -> f32 {
        self.a * p.x + self.b * p.y + self.c * p.z + self.d
    }
}

/// View frustum for culling.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far planes.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Unpacks `(nx, ny, nz, d)` x 6. Missing floats read as zero, and an
    /// all-zero plane accepts everything.
    #[must_use]
    pub fn from_packed(values: &[f32]) -> Self {
        let at = |i: usize| values.get(i).copied().unwrap_or(0.0);
        let planes = std::array::from_fn(|p| Plane::new(at(p * 4), at(p * 4 + 1), at(p * 4 + 2), at(p * 4 + 3)));
        Self { planes }
    }

    /// Extracts frustum planes from a column-major view-projection matrix.
    #[must_use]
    pub fn from_view_projection(m: &Mat4) -> Self {
        let row = |r: usize| [m.at(r, 0), m.at(r, 1), m.at(r, 2), m.at(r, 3)];
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        let combine = |a: [f32; 4], b: [f32; 4], sign: f32| {
            Plane::new(
                a[0] + sign * b[0],
                a[1] + sign * b[1],
                a[2] + sign * b[2],
                a[3] + sign * b[3],
            )
            .normalized()
        };

        Self {
            planes: [
                combine(r3, r0, 1.0),  // left
                combine(r3, r0, -1.0), // right
                combine(r3, r1, 1.0),  // bottom
                combine(r3, r1, -1.0), // top
                combine(r3, r2, 1.0),  // near
                combine(r3, r2, -1.0), // far
            ],
        }
    }

    /// Packs planes for upload.
    #[must_use]
    pub fn to_packed(&self) -> [f32; PACKED_FRUSTUM_LEN] {
        let mut out = [0.0; PACKED_FRUSTUM_LEN];
        out.copy_from_slice(bytemuck::cast_slice(&self.planes[..]));
        out
    }

    /// Sphere test: inside or intersecting every plane.
    #[inline]
    #[must_use]
    pub fn contains_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(center) >= -radius)
    }
}

/// Culls the live particles of `pool`, visiting them in `order` when given.
///
/// Returns `(visible, culled)`.
pub fn cull_compact(pool: &mut ParticlePool, order: Option<&[u32]>, frustum: &Frustum) -> (u32, u32) {
    let mut draw = std::mem::take(pool.draw_indices_mut());
    draw.clear();

    let mut culled = 0;
    {
        let particles = pool.particles();
        let mut visit = |slot: u32| {
            let p = &particles[slot as usize];
            if !p.is_alive() {
                return;
            }
            if frustum.contains_sphere(Vec3::from_array(p.position()), p.size()) {
                draw.push(slot);
            } else {
                culled += 1;
            }
        };
        match order {
            Some(order) => order.iter().copied().for_each(&mut visit),
            None => (0..pool.capacity()).for_each(&mut visit),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    let visible = draw.len() as u32;
    *pool.draw_indices_mut() = draw;
    pool.indirect_mut().accumulate(visible);
    (visible, culled)
}
