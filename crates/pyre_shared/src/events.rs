//! Events leaving the particle runtime.

use serde::{Deserialize, Serialize};

use crate::math::{Mat4, Vec3};

/// A particle promoted to a rigid body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DebrisSpawnEvent {
    /// Spawn transform (translation at the particle position).
    pub world_transform: Mat4,
    /// Linear velocity.
    pub velocity: Vec3,
    /// Angular velocity (spin about Y).
    pub angular_velocity: Vec3,
    /// Rigid-body mass.
    pub mass: f32,
    /// Rigid-body mesh id.
    pub mesh_id: String,
    /// Physics material tag.
    pub material_tag: String,
    /// Registry slot of the emitting effect.
    pub source_emitter_id: u32,
}
