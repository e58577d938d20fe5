//! Generational effect handles.

use std::fmt;
use std::sync::Arc;

/// Handle to a live effect.
///
/// `id` slots are recycled after despawn; `generation` is bumped on every
/// despawn so a handle held across frames can be detected as stale without
/// a live lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EffectHandle {
    /// Registry slot.
    pub id: u32,
    /// Slot generation at spawn time.
    pub generation: u32,
    /// Descriptor id the effect was spawned from.
    pub effect_id: Arc<str>,
}

impl EffectHandle {
    /// Creates a handle.
    #[must_use]
    pub fn new(id: u32, generation: u32, effect_id: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            generation,
            effect_id: effect_id.into(),
        }
    }
}

impl fmt::Display for EffectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}v{}", self.effect_id, self.id, self.generation)
    }
}
