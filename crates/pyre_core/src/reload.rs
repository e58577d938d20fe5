//! # Reload Classification
//!
//! Decides how much of a live effect a descriptor change invalidates.
//!
//! ```text
//! updated invalid?            ──► ForcesOnly (caller leaves the effect alone)
//! shape absent / type changed ──► FullRespawn
//! renderer absent / type      ──► FullRespawn
//! rate absent / burst count   ──► FullRespawn
//! blend / soft / atlas        ──► RendererChanged
//! anything else               ──► ForcesOnly
//! ```

use pyre_shared::{DescriptorValidator, EffectDescriptor, ValidationError};

/// How much a reload changes, ordered by cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReloadCategory {
    /// Patch the descriptor in place; particles keep simulating.
    ForcesOnly,
    /// Patch in place and rebuild the renderer pipeline off-thread.
    RendererChanged,
    /// Tear down and respawn under a new handle.
    FullRespawn,
}

/// Category plus the findings that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReloadAssessment {
    /// Classification.
    pub category: ReloadCategory,
    /// Validation findings for the updated descriptor.
    pub errors: Vec<ValidationError>,
}

impl ReloadAssessment {
    /// Whether the updated descriptor failed validation.
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        self.errors.iter().any(ValidationError::is_error)
    }
}

/// Descriptor diff.
pub struct ReloadClassifier<'a> {
    validator: &'a dyn DescriptorValidator,
}

impl<'a> ReloadClassifier<'a> {
    /// Classifier gated by `validator`.
    #[must_use]
    pub fn new(validator: &'a dyn DescriptorValidator) -> Self {
        Self { validator }
    }

    /// Category only.
    #[must_use]
    pub fn classify(&self, current: &EffectDescriptor, updated: &EffectDescriptor) -> ReloadCategory {
        self.assess(current, updated).category
    }

    /// Category and validation findings.
    #[must_use]
    pub fn assess(&self, current: &EffectDescriptor, updated: &EffectDescriptor) -> ReloadAssessment {
        let errors = self.validator.validate(updated);
        let category = if errors.iter().any(ValidationError::is_error) {
            ReloadCategory::ForcesOnly
        } else {
            diff(current, updated)
        };
        ReloadAssessment { category, errors }
    }
}

fn diff(current: &EffectDescriptor, updated: &EffectDescriptor) -> ReloadCategory {
    let (Some(old_shape), Some(new_shape)) = (&current.shape, &updated.shape) else {
        return ReloadCategory::FullRespawn;
    };
    if old_shape.shape_type != new_shape.shape_type {
        return ReloadCategory::FullRespawn;
    }

    let (Some(old_renderer), Some(new_renderer)) = (&current.renderer, &updated.renderer) else {
        return ReloadCategory::FullRespawn;
    };
    if old_renderer.renderer_type != new_renderer.renderer_type {
        return ReloadCategory::FullRespawn;
    }

    let (Some(old_rate), Some(new_rate)) = (&current.rate, &updated.rate) else {
        return ReloadCategory::FullRespawn;
    };
    if old_rate.burst_count != new_rate.burst_count {
        return ReloadCategory::FullRespawn;
    }

    if old_renderer.blend_mode != new_renderer.blend_mode
        || old_renderer.soft_particles != new_renderer.soft_particles
        || old_renderer.texture_atlas_id != new_renderer.texture_atlas_id
    {
        return ReloadCategory::RendererChanged;
    }

    ReloadCategory::ForcesOnly
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyre_shared::{BlendMode, EffectValidator, EmissionRate, EmitterShape, Force, ParticleInit};

    fn base() -> EffectDescriptor {
        EffectDescriptor::new("fx", EmissionRate::burst(100))
    }

    fn classify(current: &EffectDescriptor, updated: &EffectDescriptor) -> ReloadCategory {
        ReloadClassifier::new(&EffectValidator).classify(current, updated)
    }

    #[test]
    fn test_force_change_is_forces_only() {
        let mut updated = base();
        updated.forces.push(Force::gravity(9.8));
        assert_eq!(classify(&base(), &updated), ReloadCategory::ForcesOnly);
        assert_eq!(classify(&base(), &base()), ReloadCategory::ForcesOnly);
    }

    #[test]
    fn test_blend_change_is_renderer_changed() {
        let mut updated = base();
        if let Some(r) = updated.renderer.as_mut() {
            r.blend_mode = BlendMode::Additive;
        }
        assert_eq!(classify(&base(), &updated), ReloadCategory::RendererChanged);

        let mut soft = base();
        if let Some(r) = soft.renderer.as_mut() {
            r.soft_particles = true;
        }
        assert_eq!(classify(&base(), &soft), ReloadCategory::RendererChanged);
    }

    #[test]
    fn test_structural_changes_respawn() {
        let mut shape = base();
        shape.shape = Some(EmitterShape::sphere(1.0));
        assert_eq!(classify(&base(), &shape), ReloadCategory::FullRespawn);

        let burst = EffectDescriptor::new("fx", EmissionRate::burst(200));
        assert_eq!(classify(&base(), &burst), ReloadCategory::FullRespawn);

        let mut no_renderer = base();
        no_renderer.renderer = None;
        assert_eq!(classify(&base(), &no_renderer), ReloadCategory::FullRespawn);
    }

    #[test]
    fn test_invalid_update_is_forces_only() {
        let mut updated = base();
        updated.shape = Some(EmitterShape::sphere(1.0));
        updated.init = Some(ParticleInit {
            lifetime_min: 5.0,
            lifetime_max: 1.0,
            ..ParticleInit::default()
        });
        let assessment = ReloadClassifier::new(&EffectValidator).assess(&base(), &updated);
        assert_eq!(assessment.category, ReloadCategory::ForcesOnly);
        assert!(assessment.is_invalid());
    }

    #[test]
    fn test_category_ordering() {
        assert!(ReloadCategory::ForcesOnly < ReloadCategory::RendererChanged);
        assert!(ReloadCategory::RendererChanged < ReloadCategory::FullRespawn);
    }
}
