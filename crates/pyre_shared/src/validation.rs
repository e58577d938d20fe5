//! # Descriptor Validation
//!
//! Validation gates hot reload: a descriptor with any [`Severity::Error`]
//! is never applied to a live effect. Warnings are informational.

use std::fmt;

use crate::descriptor::{EffectDescriptor, EmissionMode, ForceType, RendererType};

/// Maximum number of non-curl forces the simulation stage applies.
pub const MAX_FORCES: usize = 16;

/// Validation severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Suspicious but usable.
    Warn,
    /// Must not be applied.
    Error,
}

/// One validation finding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// Offending field path, e.g. `lod.tiers[1]`.
    pub field: String,
    /// Human-readable message.
    pub message: String,
    /// Severity.
    pub severity: Severity,
}

impl ValidationError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Error,
        }
    }

    fn warn(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Warn,
        }
    }

    /// Whether this finding blocks the descriptor.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}: {}", self.severity, self.field, self.message)
    }
}

/// Source of validation findings for a descriptor.
pub trait DescriptorValidator: Send + Sync {
    /// Returns every finding; empty means valid.
    fn validate(&self, descriptor: &EffectDescriptor) -> Vec<ValidationError>;

    /// True when no finding is an error.
    fn is_valid(&self, descriptor: &EffectDescriptor) -> bool {
        !self.validate(descriptor).iter().any(ValidationError::is_error)
    }
}

/// Built-in structural rules.
#[derive(Clone, Copy, Debug, Default)]
pub struct EffectValidator;

impl DescriptorValidator for EffectValidator {
    fn validate(&self, descriptor: &EffectDescriptor) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if descriptor.id.trim().is_empty() {
            errors.push(ValidationError::error("id", "effect id must not be empty"));
        }

        if let Some(init) = &descriptor.init {
            if init.lifetime_min > init.lifetime_max {
                errors.push(ValidationError::error("init.lifetime", "lifetime min must be <= max"));
            }
            if init.speed_min > init.speed_max {
                errors.push(ValidationError::error("init.speed", "speed min must be <= max"));
            }
            if init.size_min > init.size_max {
                errors.push(ValidationError::error("init.size", "size min must be <= max"));
            }
        }

        if let Some(rate) = &descriptor.rate {
            if rate.mode == EmissionMode::Continuous && rate.particles_per_second <= 0.0 {
                errors.push(ValidationError::warn(
                    "rate.particles_per_second",
                    "continuous emitter never spawns",
                ));
            }
        }

        if let Some(renderer) = &descriptor.renderer {
            if renderer.renderer_type == RendererType::Ribbon && renderer.frame_count == 0 {
                errors.push(ValidationError::error(
                    "renderer.frame_count",
                    "ribbon renderer requires a trail length",
                ));
            }
        }

        if let Some(lod) = &descriptor.lod {
            let mut prev_max = f32::NEG_INFINITY;
            for (i, tier) in lod.tiers.iter().enumerate() {
                if tier.min_distance > tier.max_distance {
                    errors.push(ValidationError::error(
                        format!("lod.tiers[{i}]"),
                        "tier min distance must be <= max distance",
                    ));
                }
                if tier.min_distance < prev_max {
                    errors.push(ValidationError::error(
                        format!("lod.tiers[{i}]"),
                        "tier distances must be monotonically increasing",
                    ));
                }
                prev_max = tier.max_distance;
            }
        }

        let mut packed = 0usize;
        for (i, force) in descriptor.forces.iter().enumerate() {
            if force.force_type == ForceType::CurlNoise {
                if force.noise.is_none() {
                    errors.push(ValidationError::error(
                        format!("forces[{i}].noise"),
                        "curl-noise force requires a noise config",
                    ));
                }
            } else {
                packed += 1;
            }
        }
        if packed > MAX_FORCES {
            errors.push(ValidationError::warn(
                "forces",
                format!("{packed} forces exceed the limit of {MAX_FORCES}; extras are ignored"),
            ));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{
        EmissionRate, Force, LodConfig, LodTier, ParticleInit, RendererConfig, BlendMode,
    };

    fn base() -> EffectDescriptor {
        EffectDescriptor::new("fx", EmissionRate::burst(8))
    }

    fn tier(min: f32, max: f32) -> LodTier {
        LodTier {
            min_distance: min,
            max_distance: max,
            simulation_scale: 1.0,
            emission_scale: 1.0,
        }
    }

    #[test]
    fn test_valid_descriptor_has_no_findings() {
        assert!(EffectValidator.validate(&base()).is_empty());
        assert!(EffectValidator.is_valid(&base()));
    }

    #[test]
    fn test_blank_id_is_error() {
        let mut d = base();
        d.id = "  ".into();
        assert!(!EffectValidator.is_valid(&d));
    }

    #[test]
    fn test_inverted_lifetime_is_error() {
        let mut d = base();
        d.init = Some(ParticleInit {
            lifetime_min: 2.0,
            lifetime_max: 1.0,
            ..ParticleInit::default()
        });
        let findings = EffectValidator.validate(&d);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].field, "init.lifetime");
    }

    #[test]
    fn test_ribbon_without_frames_is_error() {
        let mut d = base();
        let mut renderer = RendererConfig::billboard(BlendMode::Alpha);
        renderer.renderer_type = RendererType::Ribbon;
        renderer.frame_count = 0;
        d.renderer = Some(renderer);
        assert!(!EffectValidator.is_valid(&d));
    }

    #[test]
    fn test_lod_tiers_must_increase() {
        let mut d = base();
        d.lod = Some(LodConfig {
            tiers: vec![tier(0.0, 50.0), tier(40.0, 100.0)],
            allow_sleeping: false,
            sleeping_distance: 0.0,
        });
        let findings = EffectValidator.validate(&d);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].field, "lod.tiers[1]");
    }

    #[test]
    fn test_curl_noise_without_config_is_error() {
        let mut d = base();
        let mut curl = Force::curl_noise(1.0, Default::default());
        curl.noise = None;
        d.forces.push(curl);
        assert!(!EffectValidator.is_valid(&d));
    }

    #[test]
    fn test_too_many_forces_is_only_a_warning() {
        let mut d = base();
        d.forces = (0..=MAX_FORCES).map(|_| Force::drag(0.1)).collect();
        let findings = EffectValidator.validate(&d);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warn);
        assert!(EffectValidator.is_valid(&d));
    }
}
