//! # Effect Descriptors
//!
//! Immutable values describing one particle effect. The runtime only reads
//! and diffs them; a reload swaps the whole value.
//!
//! ```text
//! EffectDescriptor
//! ├── shape      EmitterShape        (where particles start)
//! ├── rate       EmissionRate        (how many, how often)
//! ├── init       ParticleInit        (lifetime / speed / size ranges)
//! ├── forces     Vec<Force>          (gravity, drag, attractor, wind, curl)
//! ├── renderer   RendererConfig      (style + blend)
//! ├── lod        LodConfig           (distance tiers, sleeping)
//! └── physics    PhysicsHandoffConfig (debris promotion)
//! ```

use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Emitter volume/surface type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitterShapeType {
    /// Single point at the emitter origin.
    Point,
    /// Solid sphere, radius = `dimensions.x`.
    Sphere,
    /// Cone along +Y, half-angle = `dimensions.y` radians.
    Cone,
    /// Axis-aligned box, extents = `dimensions`.
    Box,
    /// Upper half of a sphere, radius = `dimensions.x`.
    Hemisphere,
    /// Torus in the XZ plane, ring radius `dimensions.x`, tube radius `dimensions.y`.
    Torus,
    /// Surface of an externally supplied mesh.
    MeshSurface,
    /// Along an externally supplied spline.
    Spline,
    /// Box-shaped volume, extents = `dimensions`.
    Volume,
}

/// Emitter shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmitterShape {
    /// Shape type.
    pub shape_type: EmitterShapeType,
    /// Shape-specific dimensions.
    #[serde(default)]
    pub dimensions: Vec3,
    /// Mesh id for [`EmitterShapeType::MeshSurface`].
    #[serde(default)]
    pub source_mesh_id: Option<String>,
    /// Spline id for [`EmitterShapeType::Spline`].
    #[serde(default)]
    pub source_spline_id: Option<String>,
}

impl EmitterShape {
    /// Shape with no external source references.
    #[must_use]
    pub const fn new(shape_type: EmitterShapeType, dimensions: Vec3) -> Self {
        Self {
            shape_type,
            dimensions,
            source_mesh_id: None,
            source_spline_id: None,
        }
    }

    /// Point emitter.
    #[must_use]
    pub const fn point() -> Self {
        Self::new(EmitterShapeType::Point, Vec3::ZERO)
    }

    /// Solid sphere emitter.
    #[must_use]
    pub const fn sphere(radius: f32) -> Self {
        Self::new(EmitterShapeType::Sphere, Vec3::new(radius, radius, radius))
    }
}

/// Emission mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmissionMode {
    /// Steady rate with fractional carry.
    Continuous,
    /// One-shot fixed count.
    Burst,
    /// Host-triggered; never spawns on its own.
    Event,
}

/// Emission rate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmissionRate {
    /// Emission mode.
    pub mode: EmissionMode,
    /// Particles per second (continuous).
    #[serde(default)]
    pub particles_per_second: f32,
    /// Particle count (burst).
    #[serde(default)]
    pub burst_count: u32,
    /// Event key (event).
    #[serde(default)]
    pub event_key: Option<String>,
}

impl EmissionRate {
    /// Continuous emission at `particles_per_second`.
    #[must_use]
    pub const fn continuous(particles_per_second: f32) -> Self {
        Self {
            mode: EmissionMode::Continuous,
            particles_per_second,
            burst_count: 0,
            event_key: None,
        }
    }

    /// One-shot burst of `count` particles.
    #[must_use]
    pub const fn burst(count: u32) -> Self {
        Self {
            mode: EmissionMode::Burst,
            particles_per_second: 0.0,
            burst_count: count,
            event_key: None,
        }
    }
}

/// Per-particle initial value ranges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleInit {
    /// Minimum lifetime in seconds.
    pub lifetime_min: f32,
    /// Maximum lifetime in seconds.
    pub lifetime_max: f32,
    /// Minimum initial speed.
    pub speed_min: f32,
    /// Maximum initial speed.
    pub speed_max: f32,
    /// Minimum size (also the cull radius).
    pub size_min: f32,
    /// Maximum size.
    pub size_max: f32,
    /// Launch direction; zero means random per particle.
    #[serde(default)]
    pub initial_direction: Vec3,
    /// Base color.
    #[serde(default = "default_color")]
    pub color_rgb: Vec3,
    /// Base alpha.
    #[serde(default = "default_alpha")]
    pub alpha: f32,
}

fn default_color() -> Vec3 {
    Vec3::new(1.0, 1.0, 1.0)
}

fn default_alpha() -> f32 {
    1.0
}

impl Default for ParticleInit {
    fn default() -> Self {
        Self {
            lifetime_min: 1.0,
            lifetime_max: 1.0,
            speed_min: 1.0,
            speed_max: 1.0,
            size_min: 0.1,
            size_max: 0.1,
            initial_direction: Vec3::Y,
            color_rgb: default_color(),
            alpha: default_alpha(),
        }
    }
}

impl ParticleInit {
    /// Uniform lifetime with otherwise default ranges.
    #[must_use]
    pub fn with_lifetime(lifetime: f32) -> Self {
        Self {
            lifetime_min: lifetime,
            lifetime_max: lifetime,
            ..Self::default()
        }
    }
}

/// Force type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceType {
    /// Constant acceleration along `direction`.
    Gravity,
    /// Velocity damping.
    Drag,
    /// Pull toward the point stored in `direction`.
    Attractor,
    /// Constant acceleration along `direction`.
    Wind,
    /// Baked curl-noise field.
    CurlNoise,
}

/// Curl-noise parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseForceConfig {
    /// Base frequency.
    pub frequency: f32,
    /// Field amplitude.
    pub amplitude: f32,
    /// Fractal octave count.
    pub octaves: u32,
    /// Frequency multiplier per octave.
    pub lacunarity: f32,
    /// Amplitude multiplier per octave.
    pub gain: f32,
    /// Animation speed (reserved for animated fields).
    pub time_scale: f32,
    /// Field seed.
    pub seed: u32,
}

impl Default for NoiseForceConfig {
    fn default() -> Self {
        Self {
            frequency: 0.02,
            amplitude: 1.0,
            octaves: 3,
            lacunarity: 2.0,
            gain: 0.5,
            time_scale: 1.0,
            seed: 12345,
        }
    }
}

/// One force acting on every live particle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Force {
    /// Force type.
    pub force_type: ForceType,
    /// Magnitude.
    pub strength: f32,
    /// Direction, or origin for attractors.
    #[serde(default)]
    pub direction: Vec3,
    /// Curl-noise parameters.
    #[serde(default)]
    pub noise: Option<NoiseForceConfig>,
}

impl Force {
    /// Downward gravity.
    #[must_use]
    pub const fn gravity(strength: f32) -> Self {
        Self {
            force_type: ForceType::Gravity,
            strength,
            direction: Vec3::DOWN,
            noise: None,
        }
    }

    /// Linear drag.
    #[must_use]
    pub const fn drag(strength: f32) -> Self {
        Self {
            force_type: ForceType::Drag,
            strength,
            direction: Vec3::ZERO,
            noise: None,
        }
    }

    /// Wind along `direction`.
    #[must_use]
    pub const fn wind(direction: Vec3, strength: f32) -> Self {
        Self {
            force_type: ForceType::Wind,
            strength,
            direction,
            noise: None,
        }
    }

    /// Attractor at `origin`.
    #[must_use]
    pub const fn attractor(origin: Vec3, strength: f32) -> Self {
        Self {
            force_type: ForceType::Attractor,
            strength,
            direction: origin,
            noise: None,
        }
    }

    /// Curl noise with the given field parameters.
    #[must_use]
    pub const fn curl_noise(strength: f32, noise: NoiseForceConfig) -> Self {
        Self {
            force_type: ForceType::CurlNoise,
            strength,
            direction: Vec3::ZERO,
            noise: Some(noise),
        }
    }
}

/// Visual style.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererType {
    /// Camera-facing quads.
    Billboard,
    /// Instanced meshes.
    Mesh,
    /// Connected trails.
    Ribbon,
    /// Stretched beams.
    Beam,
    /// Projected decals.
    Decal,
}

/// Compositing mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Alpha blending; needs back-to-front order.
    Alpha,
    /// Additive; order-independent.
    Additive,
}

impl BlendMode {
    /// Whether particles must be depth-sorted before drawing.
    #[inline]
    #[must_use]
    pub const fn requires_sort(self) -> bool {
        !matches!(self, Self::Additive)
    }
}

/// Renderer settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Visual style.
    pub renderer_type: RendererType,
    /// Blend mode.
    pub blend_mode: BlendMode,
    /// Texture atlas id.
    #[serde(default)]
    pub texture_atlas_id: Option<String>,
    /// Atlas frame count (ribbons need at least one).
    #[serde(default = "default_frame_count")]
    pub frame_count: u32,
    /// Depth-faded edges.
    #[serde(default)]
    pub soft_particles: bool,
    /// Contributes to scene lighting.
    #[serde(default)]
    pub light_emitting: bool,
}

fn default_frame_count() -> u32 {
    1
}

impl RendererConfig {
    /// Billboard with the given blend mode.
    #[must_use]
    pub const fn billboard(blend_mode: BlendMode) -> Self {
        Self {
            renderer_type: RendererType::Billboard,
            blend_mode,
            texture_atlas_id: None,
            frame_count: 1,
            soft_particles: false,
            light_emitting: false,
        }
    }
}

/// One distance band.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LodTier {
    /// Inclusive lower camera distance.
    pub min_distance: f32,
    /// Inclusive upper camera distance.
    pub max_distance: f32,
    /// Simulation rate scale.
    pub simulation_scale: f32,
    /// Emission rate scale.
    pub emission_scale: f32,
}

/// Level-of-detail settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LodConfig {
    /// Distance tiers.
    pub tiers: Vec<LodTier>,
    /// Whether far effects may stop simulating.
    #[serde(default)]
    pub allow_sleeping: bool,
    /// Distance beyond which a sleeping-enabled effect stops.
    #[serde(default)]
    pub sleeping_distance: f32,
}

/// Debris promotion to the physics system.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicsHandoffConfig {
    /// Master switch.
    pub enabled: bool,
    /// Minimum particle speed for promotion.
    pub speed_threshold: f32,
    /// Rigid-body mesh id.
    pub mesh_id: String,
    /// Physics material tag.
    pub material_tag: String,
    /// Rigid-body mass.
    pub mass: f32,
}

/// Complete effect description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectDescriptor {
    /// Effect id, also stamped on handles.
    pub id: String,
    /// Emitter shape.
    #[serde(default)]
    pub shape: Option<EmitterShape>,
    /// Emission rate.
    #[serde(default)]
    pub rate: Option<EmissionRate>,
    /// Initial value ranges.
    #[serde(default)]
    pub init: Option<ParticleInit>,
    /// Forces, applied in order.
    #[serde(default)]
    pub forces: Vec<Force>,
    /// Renderer.
    #[serde(default)]
    pub renderer: Option<RendererConfig>,
    /// Level of detail.
    #[serde(default)]
    pub lod: Option<LodConfig>,
    /// Physics handoff.
    #[serde(default)]
    pub physics: Option<PhysicsHandoffConfig>,
}

impl EffectDescriptor {
    /// Point-emitting alpha billboard with default init ranges and no forces.
    #[must_use]
    pub fn new(id: impl Into<String>, rate: EmissionRate) -> Self {
        Self {
            id: id.into(),
            shape: Some(EmitterShape::point()),
            rate: Some(rate),
            init: Some(ParticleInit::default()),
            forces: Vec::new(),
            renderer: Some(RendererConfig::billboard(BlendMode::Alpha)),
            lod: None,
            physics: None,
        }
    }

    /// Blend mode, defaulting to alpha without a renderer.
    #[must_use]
    pub fn blend_mode(&self) -> BlendMode {
        self.renderer
            .as_ref()
            .map_or(BlendMode::Alpha, |r| r.blend_mode)
    }

    /// First curl-noise force, if any.
    #[must_use]
    pub fn curl_noise(&self) -> Option<&Force> {
        self.forces
            .iter()
            .find(|f| f.force_type == ForceType::CurlNoise)
    }
}
