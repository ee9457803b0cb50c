//! Per-character morph assignments
//!
//! A profile maps effect hashes to the handle they use and the weight to
//! blend it at. Every entry owns exactly one reference on its handle, so
//! every path that removes an entry goes through the registry to release it.

use std::collections::BTreeMap;

use crate::error::MorphError;
use crate::handle::MorphKey;
use crate::registry::MorphRegistry;
use crate::streaming::StreamingService;

/// One active morph on a character.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MorphAssignment {
    key: MorphKey,
    weight: f32,
}

impl MorphAssignment {
    pub fn key(&self) -> MorphKey {
        self.key
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }
}

/// Iteration order is effect-hash order, not insertion order.
#[derive(Debug, Default)]
pub struct CharacterMorphProfile {
    morphs: BTreeMap<u32, MorphAssignment>,
}

impl CharacterMorphProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, effect: u32) -> Result<&MorphAssignment, MorphError> {
        self.morphs.get(&effect).ok_or(MorphError::NotFound { effect })
    }

    pub fn has(&self, effect: u32) -> bool {
        self.morphs.contains_key(&effect)
    }

    /// Assign `key` at `weight` to `effect`, replacing any previous assignment.
    ///
    /// The previous handle loses its reference before the new one gains one.
    /// Unregistered keys are rejected without touching the profile.
    pub fn assign<S: StreamingService>(
        &mut self,
        registry: &mut MorphRegistry<S>,
        effect: u32,
        key: MorphKey,
        weight: f32,
    ) -> Result<(), MorphError> {
        if !registry.contains(key) {
            return Err(MorphError::UnknownMorph {
                effect: key.effect,
                model: key.model,
            });
        }

        if let Some(previous) = self.morphs.remove(&effect) {
            tracing::debug!("replacing previous assignment of morph {effect:#010x}");
            registry.remove_ref(previous.key);
        }

        self.morphs.insert(effect, MorphAssignment { key, weight });
        registry.add_ref(key);
        Ok(())
    }

    /// Change the weight of an existing assignment without touching references.
    pub fn set_weight(&mut self, effect: u32, weight: f32) -> Result<f32, MorphError> {
        let assignment = self
            .morphs
            .get_mut(&effect)
            .ok_or(MorphError::NotFound { effect })?;
        let previous = assignment.weight;
        assignment.weight = weight;
        Ok(previous)
    }

    /// Remove an assignment and release its reference. Returns whether one existed.
    pub fn unassign<S: StreamingService>(
        &mut self,
        registry: &mut MorphRegistry<S>,
        effect: u32,
    ) -> bool {
        match self.morphs.remove(&effect) {
            Some(assignment) => {
                registry.remove_ref(assignment.key);
                true
            }
            None => false,
        }
    }

    /// Release every assignment, then empty the profile.
    pub fn clear<S: StreamingService>(&mut self, registry: &mut MorphRegistry<S>) {
        for assignment in self.morphs.values() {
            registry.remove_ref(assignment.key);
        }
        self.morphs.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.morphs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.morphs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &MorphAssignment)> {
        self.morphs.iter().map(|(effect, assignment)| (*effect, assignment))
    }
}

impl Drop for CharacterMorphProfile {
    fn drop(&mut self) {
        if !self.morphs.is_empty() {
            tracing::warn!(
                count = self.morphs.len(),
                "morph profile dropped with live assignments; their references leak"
            );
        }
    }
}
