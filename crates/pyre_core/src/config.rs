//! # Engine Configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file is a
//! valid configuration.
//!
//! ```toml
//! total_budget = 1048576
//! budget_policy = "evict_oldest"
//! capacity_sizing = "from_descriptor"
//! seed = 7
//!
//! [debris]
//! max_candidates = 512
//! ```

use std::path::Path;

use pyre_shared::{EffectDescriptor, EmissionMode};
use serde::{Deserialize, Serialize};

use crate::budget::{BudgetPolicy, DEFAULT_GLOBAL_BUDGET};
use crate::error::{VfxError, VfxResult};
use crate::noise::{DEFAULT_GRID_SIZE, DEFAULT_WORLD_SCALE};
use crate::readback::DEFAULT_MAX_CANDIDATES;

/// Effects sharing the default budget under fixed sizing.
const DEFAULT_EFFECTS_PER_BUDGET: u32 = 16;

/// Frame rate assumed for one frame of continuous-emission headroom.
const HEADROOM_FPS: f32 = 60.0;

/// How each effect's budget request is sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacitySizing {
    /// Every effect requests `per_effect_particles`.
    #[default]
    Fixed,
    /// Burst count, or steady-state population for continuous emission.
    FromDescriptor,
}

/// Debris promotion settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebrisConfig {
    /// Candidate records per readback slot.
    pub max_candidates: u32,
    /// Normalized age a particle must exceed.
    pub age_threshold: f32,
    /// Speed threshold when a descriptor does not set a positive one.
    pub default_speed_threshold: f32,
}

impl Default for DebrisConfig {
    fn default() -> Self {
        Self {
            max_candidates: DEFAULT_MAX_CANDIDATES,
            age_threshold: 0.8,
            default_speed_threshold: 5.0,
        }
    }
}

/// Baked curl-noise field settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseFieldConfig {
    /// Lattice points per axis.
    pub grid_size: u32,
    /// World extent covered by the field.
    pub world_scale: f32,
}

impl Default for NoiseFieldConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            world_scale: DEFAULT_WORLD_SCALE,
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Global particle ceiling.
    pub total_budget: u32,
    /// Overflow policy.
    pub budget_policy: BudgetPolicy,
    /// Per-effect request sizing.
    pub capacity_sizing: CapacitySizing,
    /// Request under [`CapacitySizing::Fixed`].
    pub per_effect_particles: u32,
    /// Hard cap on any one request. Power of two.
    pub max_particles_per_effect: u32,
    /// Frames of device work in flight; delays pipeline destruction.
    pub frames_in_flight: u32,
    /// Debris promotion.
    pub debris: DebrisConfig,
    /// Curl-noise baking.
    pub noise: NoiseFieldConfig,
    /// Seed for per-effect seeds.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            total_budget: DEFAULT_GLOBAL_BUDGET,
            budget_policy: BudgetPolicy::Clamp,
            capacity_sizing: CapacitySizing::Fixed,
            per_effect_particles: DEFAULT_GLOBAL_BUDGET / DEFAULT_EFFECTS_PER_BUDGET,
            max_particles_per_effect: DEFAULT_GLOBAL_BUDGET,
            frames_in_flight: 3,
            debris: DebrisConfig::default(),
            noise: NoiseFieldConfig::default(),
            seed: 0x5eed,
        }
    }
}

impl EngineConfig {
    /// Production preset: evicts old effects instead of starving new ones,
    /// sizes pools from descriptors.
    #[must_use]
    pub const fn production() -> Self {
        Self {
            total_budget: DEFAULT_GLOBAL_BUDGET,
            budget_policy: BudgetPolicy::EvictOldest,
            capacity_sizing: CapacitySizing::FromDescriptor,
            per_effect_particles: DEFAULT_GLOBAL_BUDGET / DEFAULT_EFFECTS_PER_BUDGET,
            max_particles_per_effect: 1 << 18,
            frames_in_flight: 3,
            debris: DebrisConfig {
                max_candidates: DEFAULT_MAX_CANDIDATES,
                age_threshold: 0.8,
                default_speed_threshold: 5.0,
            },
            noise: NoiseFieldConfig {
                grid_size: DEFAULT_GRID_SIZE,
                world_scale: DEFAULT_WORLD_SCALE,
            },
            seed: 0x5eed,
        }
    }

    /// Small budget and coarse noise for fast tests.
    #[must_use]
    pub fn test_preset() -> Self {
        Self {
            total_budget: 1 << 16,
            per_effect_particles: 4096,
            max_particles_per_effect: 1 << 16,
            noise: NoiseFieldConfig {
                grid_size: 16,
                world_scale: DEFAULT_WORLD_SCALE,
            },
            ..Self::default()
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`VfxError::Config`] on parse or validation failure.
    pub fn from_toml_str(source: &str) -> VfxResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| VfxError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`VfxError::Io`] if the file cannot be read, otherwise as
    /// [`EngineConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> VfxResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| VfxError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`VfxError::Config`] naming the first bad field.
    pub fn validate(&self) -> VfxResult<()> {
        let fail = |msg: &str| Err(VfxError::Config(msg.to_owned()));
        if self.total_budget == 0 {
            return fail("total_budget must be greater than zero");
        }
        if self.frames_in_flight == 0 {
            return fail("frames_in_flight must be greater than zero");
        }
        if !self.max_particles_per_effect.is_power_of_two() {
            return fail("max_particles_per_effect must be a power of two");
        }
        if self.per_effect_particles == 0 {
            return fail("per_effect_particles must be greater than zero");
        }
        if self.debris.max_candidates == 0 {
            return fail("debris.max_candidates must be greater than zero");
        }
        if self.noise.grid_size < 2 {
            return fail("noise.grid_size must be at least 2");
        }
        if self.noise.world_scale.is_nan() || self.noise.world_scale <= 0.0 {
            return fail("noise.world_scale must be positive");
        }
        Ok(())
    }

    /// Budget request for `descriptor`, never above `max_particles_per_effect`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn request_for(&self, descriptor: &EffectDescriptor) -> u32 {
        let cap = self.max_particles_per_effect;
        let raw = match self.capacity_sizing {
            CapacitySizing::Fixed => self.per_effect_particles,
            CapacitySizing::FromDescriptor => {
                let lifetime = descriptor.init.as_ref().map_or(1.0, |i| i.lifetime_max.max(0.0));
                match descriptor.rate.as_ref() {
                    Some(rate) if rate.mode == EmissionMode::Burst => rate.burst_count,
                    Some(rate) if rate.mode == EmissionMode::Continuous => {
                        let pps = rate.particles_per_second.max(0.0);
                        let steady = (pps * lifetime).ceil() + (pps / HEADROOM_FPS).ceil();
                        steady.min(cap as f32) as u32
                    }
                    _ => self.per_effect_particles,
                }
            }
        };
        raw.max(1).checked_next_power_of_two().unwrap_or(cap).min(cap)
    }
}
