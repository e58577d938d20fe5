//! Distance-based level of detail.

use pyre_shared::{LodConfig, LodTier};

/// What LOD decided for one effect this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodDecision {
    /// Skip every stage this frame.
    pub sleeping: bool,
    /// Multiplier on emission.
    pub emission_scale: f32,
}

impl LodDecision {
    /// Full detail.
    pub const FULL: Self = Self {
        sleeping: false,
        emission_scale: 1.0,
    };
}

/// Tier selection rules.
pub struct LodPolicy;

impl LodPolicy {
    /// Tier for `distance`: the first (by `min_distance`) tier containing it,
    /// else the last tier. `None` without tiers.
    #[must_use]
    pub fn active_tier(lod: &LodConfig, distance: f32) -> Option<LodTier> {
        let by_min = |a: &&LodTier, b: &&LodTier| a.min_distance.total_cmp(&b.min_distance);
        lod.tiers
            .iter()
            .filter(|t| distance >= t.min_distance && distance <= t.max_distance)
            .min_by(by_min)
            .or_else(|| lod.tiers.iter().max_by(by_min))
            .copied()
    }

    /// Full decision for an effect at `distance` from the camera.
    #[must_use]
    pub fn decide(lod: Option<&LodConfig>, distance: f32) -> LodDecision {
        let Some(lod) = lod else {
            return LodDecision::FULL;
        };
        if lod.allow_sleeping && distance > lod.sleeping_distance {
            return LodDecision {
                sleeping: true,
                emission_scale: 0.0,
            };
        }
        Self::active_tier(lod, distance).map_or(LodDecision::FULL, |tier| LodDecision {
            sleeping: false,
            emission_scale: tier.emission_scale.max(0.0),
        })
    }
}
