//! Reference-counted morph geometry handle
//!
//! One handle exists per registered (effect, model) pair. Character profiles
//! hold references to it by [`MorphKey`]; the geometry is resident exactly
//! while at least one reference is held.
//!
//! Handles are deliberately not `Clone`: the reference count belongs to one
//! handle, and a copy would release geometry the original still counts on.

use crate::hash::joaat;
use crate::policy::InvariantPolicy;
use crate::streaming::{SlotIndex, StreamingService};

/// Composite registry key: (effect hash, target model hash).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MorphKey {
    pub effect: u32,
    pub model: u32,
}

impl MorphKey {
    pub const fn new(effect: u32, model: u32) -> Self {
        Self { effect, model }
    }

    pub fn from_names(effect_name: &str, target_model: &str) -> Self {
        Self::new(joaat(effect_name), joaat(target_model))
    }
}

/// Streamable resource path of a morph: `"{target_model}/{effect_name}"`.
pub fn resource_path(effect_name: &str, target_model: &str) -> String {
    format!("{target_model}/{effect_name}")
}

/// Outcome of a single reconcile step.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Reconcile {
    /// Residency already matched the reference count.
    Unchanged,
    Loaded,
    /// Load was wanted but the resource could not be made resident.
    LoadFailed,
    Released,
}

#[derive(Debug)]
pub struct GeometryHandle {
    key: MorphKey,
    resource: String,
    ref_count: u32,
    resident: Option<SlotIndex>,
}

impl GeometryHandle {
    pub(crate) fn new(key: MorphKey, resource: String) -> Self {
        Self {
            key,
            resource,
            ref_count: 0,
            resident: None,
        }
    }

    pub fn key(&self) -> MorphKey {
        self.key
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub fn is_resident(&self) -> bool {
        self.resident.is_some()
    }

    /// Geometry buffer to blend with, if the handle's slot is still resident.
    pub fn geometry<'s, S: StreamingService>(&self, streaming: &'s S) -> Option<&'s S::Geometry> {
        streaming.primary_geometry(self.resident?)
    }

    /// Take a reference; the first one loads the geometry.
    pub fn add_ref<S: StreamingService>(&mut self, streaming: &mut S) -> Reconcile {
        self.ref_count += 1;
        tracing::trace!(resource = %self.resource, refs = self.ref_count, "add ref");
        self.reconcile(streaming)
    }

    /// Drop a reference; the last one releases the geometry.
    ///
    /// Releasing an unreferenced handle is reported through `policy` and
    /// otherwise leaves the count at zero.
    pub fn remove_ref<S: StreamingService>(
        &mut self,
        streaming: &mut S,
        policy: InvariantPolicy,
    ) -> Reconcile {
        if self.ref_count == 0 {
            policy.violation(&format!(
                "reference count of '{}' would go negative",
                self.resource
            ));
            return self.reconcile(streaming);
        }

        self.ref_count -= 1;
        tracing::trace!(resource = %self.resource, refs = self.ref_count, "remove ref");
        self.reconcile(streaming)
    }

    /// Bring residency in line with the reference count. At most one load or
    /// one release per call.
    pub fn reconcile<S: StreamingService>(&mut self, streaming: &mut S) -> Reconcile {
        // The service may have evicted the slot behind our back.
        if let Some(slot) = self.resident {
            if streaming.primary_geometry(slot).is_none() {
                tracing::warn!(resource = %self.resource, slot, "resident morph geometry went missing");
                self.resident = None;
            }
        }

        match (self.ref_count > 0, self.resident) {
            (false, Some(slot)) => {
                tracing::trace!(resource = %self.resource, slot, "releasing morph geometry");
                streaming.release(slot);
                self.resident = None;
                Reconcile::Released
            }
            (true, None) => self.request(streaming),
            _ => Reconcile::Unchanged,
        }
    }

    /// Zero the reference count and release any resident geometry.
    pub(crate) fn quiesce<S: StreamingService>(&mut self, streaming: &mut S) -> Reconcile {
        self.ref_count = 0;
        self.reconcile(streaming)
    }

    fn request<S: StreamingService>(&mut self, streaming: &mut S) -> Reconcile {
        let Some(slot) = streaming.find_slot(&self.resource) else {
            tracing::debug!(resource = %self.resource, "morph drawable not found");
            return Reconcile::LoadFailed;
        };

        if !streaming.load_now(slot) {
            tracing::debug!(resource = %self.resource, slot, "morph drawable failed to load");
            return Reconcile::LoadFailed;
        }

        if streaming.primary_geometry(slot).is_none() {
            tracing::debug!(resource = %self.resource, slot, "morph drawable has no geometry");
            streaming.release(slot);
            return Reconcile::LoadFailed;
        }

        tracing::trace!(resource = %self.resource, slot, "morph geometry resident");
        self.resident = Some(slot);
        Reconcile::Loaded
    }
}

impl Drop for GeometryHandle {
    fn drop(&mut self) {
        if self.resident.is_some() {
            tracing::warn!(resource = %self.resource, "morph handle dropped while geometry is resident");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Drawable, Model};
    use crate::streaming::MemoryStreaming;

    const PATH: &str = "model_a/brow_up";

    fn setup() -> (GeometryHandle, MemoryStreaming<u8>) {
        let mut streaming = MemoryStreaming::new();
        streaming.insert(PATH, Drawable::single(1));
        let handle = GeometryHandle::new(MorphKey::from_names("brow_up", "model_a"), PATH.into());
        (handle, streaming)
    }

    #[test]
    fn resource_path_is_model_then_effect() {
        assert_eq!(resource_path("brow_up", "model_a"), PATH);
    }

    #[test]
    fn residency_follows_ref_count() {
        let (mut handle, mut streaming) = setup();
        let policy = InvariantPolicy::FailFast;

        assert_eq!(handle.add_ref(&mut streaming), Reconcile::Loaded);
        assert_eq!(handle.add_ref(&mut streaming), Reconcile::Unchanged);
        assert!(handle.is_resident());
        assert_eq!(handle.geometry(&streaming), Some(&1));

        assert_eq!(handle.remove_ref(&mut streaming, policy), Reconcile::Unchanged);
        assert!(handle.is_resident());
        assert_eq!(handle.remove_ref(&mut streaming, policy), Reconcile::Released);
        assert!(!handle.is_resident());
        assert!(!streaming.is_resident(PATH));

        let stats = streaming.stats(PATH).unwrap();
        assert_eq!((stats.loads, stats.releases), (1, 1));
    }

    #[test]
    fn arbitrary_sequences_keep_invariant() {
        let (mut handle, mut streaming) = setup();
        let policy = InvariantPolicy::FailFast;
        let ops = [true, true, false, true, false, false, true, false];

        for add in ops {
            if add {
                handle.add_ref(&mut streaming);
            } else {
                handle.remove_ref(&mut streaming, policy);
            }
            assert_eq!(handle.is_resident(), handle.ref_count() > 0);
            assert_eq!(streaming.is_resident(PATH), handle.ref_count() > 0);
        }
    }

    #[test]
    fn failed_load_is_retried_by_reconcile() {
        let (mut handle, mut streaming) = setup();
        streaming.fail_next_loads(PATH, 1);

        assert_eq!(handle.add_ref(&mut streaming), Reconcile::LoadFailed);
        assert_eq!(handle.ref_count(), 1);
        assert!(!handle.is_resident());

        assert_eq!(handle.reconcile(&mut streaming), Reconcile::Loaded);
        assert!(handle.is_resident());
        assert_eq!(handle.reconcile(&mut streaming), Reconcile::Unchanged);
    }

    #[test]
    fn missing_resource_stays_unresolved() {
        let mut streaming: MemoryStreaming<u8> = MemoryStreaming::new();
        let mut handle = GeometryHandle::new(MorphKey::new(1, 2), "nowhere/none".into());

        assert_eq!(handle.add_ref(&mut streaming), Reconcile::LoadFailed);
        assert_eq!(handle.remove_ref(&mut streaming, InvariantPolicy::FailFast), Reconcile::Unchanged);
        assert_eq!(handle.ref_count(), 0);
    }

    #[test]
    fn drawable_without_geometry_is_released() {
        let mut streaming: MemoryStreaming<u8> = MemoryStreaming::new();
        streaming.insert(PATH, Drawable { models: vec![Model { geometries: vec![] }] });
        let mut handle = GeometryHandle::new(MorphKey::new(1, 2), PATH.into());

        assert_eq!(handle.add_ref(&mut streaming), Reconcile::LoadFailed);
        assert!(!streaming.is_resident(PATH));
        assert_eq!(streaming.stats(PATH).unwrap().releases, 1);
    }

    #[test]
    fn eviction_is_healed() {
        let (mut handle, mut streaming) = setup();
        handle.add_ref(&mut streaming);
        streaming.evict(PATH);

        assert!(handle.geometry(&streaming).is_none());
        assert_eq!(handle.reconcile(&mut streaming), Reconcile::Loaded);
        assert_eq!(handle.geometry(&streaming), Some(&1));
    }

    #[test]
    #[should_panic(expected = "would go negative")]
    fn negative_count_fails_fast() {
        let (mut handle, mut streaming) = setup();
        handle.remove_ref(&mut streaming, InvariantPolicy::FailFast);
    }

    #[test]
    fn negative_count_floors_when_defensive() {
        let (mut handle, mut streaming) = setup();
        assert_eq!(
            handle.remove_ref(&mut streaming, InvariantPolicy::Defensive),
            Reconcile::Unchanged
        );
        assert_eq!(handle.ref_count(), 0);
        assert_eq!(streaming.stats(PATH).unwrap().releases, 0);
    }
}
