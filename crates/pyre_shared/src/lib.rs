//! # PYRE Shared
//!
//! Types exchanged between effect authoring, the particle runtime and the
//! physics integration.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on device APIs or threading crates.
//! Runtime machinery belongs in `pyre_core`.
//!
//! ## Modules
//!
//! - `math`: `Vec3`, column-major `Mat4`, camera extraction
//! - `descriptor`: immutable effect descriptors
//! - `handle`: generational effect handles
//! - `events`: debris spawn events
//! - `validation`: descriptor validation rules

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod descriptor;
pub mod events;
pub mod handle;
pub mod math;
pub mod validation;

pub use descriptor::{
    BlendMode, EffectDescriptor, EmissionMode, EmissionRate, EmitterShape, EmitterShapeType,
    Force, ForceType, LodConfig, LodTier, NoiseForceConfig, ParticleInit, PhysicsHandoffConfig,
    RendererConfig, RendererType,
};
pub use events::DebrisSpawnEvent;
pub use handle::EffectHandle;
pub use math::{camera_position, Mat4, Vec3};
pub use validation::{DescriptorValidator, EffectValidator, Severity, ValidationError, MAX_FORCES};
