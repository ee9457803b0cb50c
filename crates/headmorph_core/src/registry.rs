//! Morph registry
//!
//! Owns every [`GeometryHandle`] and the streaming service that loads them,
//! plus the map from the engine's blend-session ids to the character each
//! session is blending. Profiles reach handles only through [`MorphKey`]s
//! into this registry.

use std::collections::BTreeMap;

use crate::character::{CharacterHost, Entity};
use crate::config::MorphSettings;
use crate::error::MorphError;
use crate::handle::{resource_path, GeometryHandle, MorphKey, Reconcile};
use crate::policy::InvariantPolicy;
use crate::streaming::StreamingService;

/// Engine-assigned id of an in-flight head blend.
pub type SessionId = u32;

/// What [`MorphRegistry::reset_all`] tore down.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ResetSummary {
    pub profiles_cleared: usize,
    pub handles_quiesced: usize,
    pub handles_dropped: usize,
    pub sessions_dropped: usize,
}

pub struct MorphRegistry<S: StreamingService> {
    streaming: S,
    handles: BTreeMap<MorphKey, GeometryHandle>,
    sessions: BTreeMap<SessionId, Entity>,
    policy: InvariantPolicy,
    ref_warning_threshold: u32,
}

impl<S: StreamingService> MorphRegistry<S> {
    pub fn new(streaming: S, settings: &MorphSettings) -> Self {
        Self {
            streaming,
            handles: BTreeMap::new(),
            sessions: BTreeMap::new(),
            policy: settings.invariant_policy,
            ref_warning_threshold: settings.ref_warning_threshold,
        }
    }

    pub fn streaming(&self) -> &S {
        &self.streaming
    }

    pub fn streaming_mut(&mut self) -> &mut S {
        &mut self.streaming
    }

    /// Give the streaming service back. Handles still resident are not released.
    pub fn into_streaming(mut self) -> S {
        self.handles.clear();
        self.streaming
    }

    pub fn policy(&self) -> InvariantPolicy {
        self.policy
    }

    /// Register the morph `effect_name` for `target_model`.
    ///
    /// The drawable is probe-loaded to check it has primary model geometry and
    /// released straight away; the new handle starts with no references.
    pub fn register(&mut self, effect_name: &str, target_model: &str) -> Result<MorphKey, MorphError> {
        for name in [effect_name, target_model] {
            if name.is_empty() || name.contains('/') {
                return Err(MorphError::InvalidName { name: name.to_string() });
            }
        }

        let key = MorphKey::from_names(effect_name, target_model);
        let resource = resource_path(effect_name, target_model);

        if self.handles.contains_key(&key) {
            return Err(MorphError::AlreadyRegistered { resource });
        }

        self.probe(&resource)?;

        tracing::debug!(%resource, "morph registered");
        self.handles.insert(key, GeometryHandle::new(key, resource));
        Ok(key)
    }

    fn probe(&mut self, resource: &str) -> Result<(), MorphError> {
        let slot = self
            .streaming
            .find_slot(resource)
            .ok_or_else(|| MorphError::ResourceNotFound {
                resource: resource.to_string(),
            })?;

        if !self.streaming.load_now(slot) {
            return Err(MorphError::LoadFailed {
                resource: resource.to_string(),
            });
        }

        let usable = self.streaming.primary_geometry(slot).is_some();
        self.streaming.release(slot);

        if usable {
            Ok(())
        } else {
            Err(MorphError::NoPrimaryGeometry {
                resource: resource.to_string(),
            })
        }
    }

    pub fn has_morph(&self, effect_name: &str, target_model: &str) -> bool {
        self.contains(MorphKey::from_names(effect_name, target_model))
    }

    pub fn contains(&self, key: MorphKey) -> bool {
        self.handles.contains_key(&key)
    }

    pub fn lookup(&self, effect: u32, model: u32) -> Option<&GeometryHandle> {
        self.handle(MorphKey::new(effect, model))
    }

    pub fn handle(&self, key: MorphKey) -> Option<&GeometryHandle> {
        self.handles.get(&key)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Resident geometry of `key`, if any.
    pub fn geometry(&self, key: MorphKey) -> Option<&S::Geometry> {
        self.handles.get(&key)?.geometry(&self.streaming)
    }

    pub fn add_ref(&mut self, key: MorphKey) -> Option<Reconcile> {
        let Some(handle) = self.handles.get_mut(&key) else {
            tracing::warn!(?key, "add ref on unregistered morph");
            return None;
        };

        let outcome = handle.add_ref(&mut self.streaming);
        if handle.ref_count() >= self.ref_warning_threshold {
            tracing::warn!(
                resource = handle.resource(),
                refs = handle.ref_count(),
                "unusually many references to morph"
            );
        }
        Some(outcome)
    }

    pub fn remove_ref(&mut self, key: MorphKey) -> Option<Reconcile> {
        let Some(handle) = self.handles.get_mut(&key) else {
            tracing::warn!(?key, "remove ref on unregistered morph");
            return None;
        };
        Some(handle.remove_ref(&mut self.streaming, self.policy))
    }

    pub fn reconcile(&mut self, key: MorphKey) -> Option<Reconcile> {
        let handle = self.handles.get_mut(&key)?;
        Some(handle.reconcile(&mut self.streaming))
    }

    pub fn bind_session(&mut self, session: SessionId, character: Entity) {
        if let Some(previous) = self.sessions.insert(session, character) {
            if previous != character {
                tracing::debug!(session, ?previous, ?character, "blend session rebound");
            }
        }
        tracing::trace!(session, ?character, "blend session bound");
    }

    pub fn unbind_session(&mut self, session: SessionId) -> Option<Entity> {
        let character = self.sessions.remove(&session);
        if let Some(character) = character {
            tracing::trace!(session, ?character, "blend session unbound");
        }
        character
    }

    pub fn resolve_session_character(&self, session: SessionId) -> Option<Entity> {
        self.sessions.get(&session).copied()
    }

    /// Reverse lookup of the session currently blending `character`.
    pub fn session_of(&self, character: Entity) -> Option<SessionId> {
        self.sessions
            .iter()
            .find(|(_, bound)| **bound == character)
            .map(|(session, _)| *session)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Tear down every profile, release every reference, then forget all
    /// handles and sessions.
    ///
    /// Characters bound to a session are cleared first, then any other
    /// character the host still reports with a profile. Stale or non-character
    /// session bindings are skipped. Handles are quiesced before the catalog is
    /// dropped, so the streaming service never sees a release after the clear.
    pub fn reset_all<H: CharacterHost>(&mut self, host: &mut H) -> ResetSummary {
        let mut summary = ResetSummary::default();

        let bound: Vec<Entity> = self.sessions.values().copied().collect();
        for character in bound {
            if !host.is_character(character) {
                tracing::debug!(?character, "skipping stale blend session character");
                continue;
            }
            if let Some(mut profile) = host.detach_profile(character) {
                tracing::debug!(?character, morphs = profile.len(), "resetting character morphs");
                profile.clear(self);
                summary.profiles_cleared += 1;
            }
        }

        for character in host.profiled_characters() {
            if let Some(mut profile) = host.detach_profile(character) {
                tracing::debug!(?character, morphs = profile.len(), "resetting unbound character morphs");
                profile.clear(self);
                summary.profiles_cleared += 1;
            }
        }

        for handle in self.handles.values_mut() {
            if handle.ref_count() > 0 || handle.is_resident() {
                tracing::warn!(
                    resource = handle.resource(),
                    refs = handle.ref_count(),
                    "morph still referenced at reset"
                );
                handle.quiesce(&mut self.streaming);
                summary.handles_quiesced += 1;
            }
        }

        summary.handles_dropped = self.handles.len();
        summary.sessions_dropped = self.sessions.len();
        tracing::debug!(
            sessions = summary.sessions_dropped,
            morphs = summary.handles_dropped,
            "clearing morph registry"
        );

        self.sessions.clear();
        self.handles.clear();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{CharacterPool, EntityKind};
    use crate::geometry::{Drawable, Model};
    use crate::streaming::MemoryStreaming;

    fn registry() -> MorphRegistry<MemoryStreaming<u8>> {
        let mut streaming = MemoryStreaming::new();
        streaming.insert("model_a/brow_up", Drawable::single(1));
        streaming.insert("model_a/brow_down", Drawable::single(2));
        streaming.insert("model_a/empty", Drawable { models: vec![Model { geometries: vec![] }] });

        let settings = MorphSettings {
            invariant_policy: InvariantPolicy::FailFast,
            ..MorphSettings::default()
        };
        MorphRegistry::new(streaming, &settings)
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = registry();

        let key = registry.register("brow_up", "model_a").unwrap();
        assert_eq!(
            registry.register("BROW_UP", "model_a"),
            Err(MorphError::AlreadyRegistered {
                resource: "model_a/BROW_UP".into()
            })
        );
        assert_eq!(registry.len(), 1);
        assert!(registry.has_morph("brow_up", "model_a"));
        assert_eq!(registry.lookup(key.effect, key.model).map(|h| h.key()), Some(key));
    }

    #[test]
    fn registration_probe_does_not_keep_geometry() {
        let mut registry = registry();
        let key = registry.register("brow_up", "model_a").unwrap();

        let handle = registry.handle(key).unwrap();
        assert_eq!(handle.ref_count(), 0);
        assert!(!handle.is_resident());
        assert_eq!(registry.streaming().resident_count(), 0);

        let stats = registry.streaming().stats("model_a/brow_up").unwrap();
        assert_eq!((stats.loads, stats.releases), (1, 1));
    }

    #[test]
    fn unusable_resources_are_not_registered() {
        let mut registry = registry();

        assert!(matches!(
            registry.register("cheek_up", "model_a"),
            Err(MorphError::ResourceNotFound { .. })
        ));
        assert!(matches!(
            registry.register("empty", "model_a"),
            Err(MorphError::NoPrimaryGeometry { .. })
        ));

        registry.streaming_mut().fail_next_loads("model_a/brow_down", 1);
        assert!(matches!(
            registry.register("brow_down", "model_a"),
            Err(MorphError::LoadFailed { .. })
        ));

        assert!(registry.is_empty());
        assert_eq!(registry.streaming().resident_count(), 0);
    }

    #[test]
    fn names_that_would_alias_a_path_are_rejected() {
        let mut registry = registry();

        assert_eq!(
            registry.register("a/brow_up", "model"),
            Err(MorphError::InvalidName { name: "a/brow_up".into() })
        );
        assert_eq!(
            registry.register("brow_up", "model/a"),
            Err(MorphError::InvalidName { name: "model/a".into() })
        );
        assert!(matches!(registry.register("", "model_a"), Err(MorphError::InvalidName { .. })));
        assert!(registry.is_empty());
        assert_eq!(registry.streaming().stats("model_a/brow_up").unwrap().loads, 0);
    }

    #[test]
    fn lookup_is_pure() {
        let registry = registry();
        assert!(registry.lookup(1, 2).is_none());
        assert!(registry.geometry(MorphKey::new(1, 2)).is_none());
        assert_eq!(registry.streaming().stats("model_a/brow_up").unwrap().loads, 0);
    }

    #[test]
    fn sessions_map_both_ways() {
        let mut registry = registry();
        let mut pool = CharacterPool::new();
        let ped = pool.spawn(EntityKind::Character, "model_a");

        registry.bind_session(4, ped);
        assert_eq!(registry.resolve_session_character(4), Some(ped));
        assert_eq!(registry.session_of(ped), Some(4));

        assert_eq!(registry.unbind_session(4), Some(ped));
        assert_eq!(registry.unbind_session(4), None);
        assert_eq!(registry.resolve_session_character(4), None);
        assert_eq!(registry.session_of(ped), None);
    }

    #[test]
    fn reset_releases_everything() {
        let mut registry = registry();
        let mut pool = CharacterPool::new();
        let up = registry.register("brow_up", "model_a").unwrap();
        let down = registry.register("brow_down", "model_a").unwrap();

        let bound = pool.spawn_blended_character("model_a");
        let unbound = pool.spawn_blended_character("model_a");
        let despawned = pool.spawn_blended_character("model_a");
        registry.bind_session(1, bound);
        registry.bind_session(2, despawned);
        pool.despawn(despawned);

        pool.profile_or_insert(bound)
            .unwrap()
            .assign(&mut registry, up.effect, up, 0.5)
            .unwrap();
        pool.profile_or_insert(unbound)
            .unwrap()
            .assign(&mut registry, up.effect, up, 0.5)
            .unwrap();
        pool.profile_or_insert(unbound)
            .unwrap()
            .assign(&mut registry, down.effect, down, 0.5)
            .unwrap();
        assert_eq!(registry.handle(up).unwrap().ref_count(), 2);

        let summary = registry.reset_all(&mut pool);

        assert_eq!(summary.profiles_cleared, 2);
        assert_eq!(summary.handles_quiesced, 0);
        assert_eq!(summary.handles_dropped, 2);
        assert_eq!(summary.sessions_dropped, 2);
        assert!(registry.is_empty());
        assert_eq!(registry.session_count(), 0);
        assert!(pool.profile(bound).is_none());
        assert!(pool.profile(unbound).is_none());
        assert_eq!(registry.streaming().resident_count(), 0);
    }

    #[test]
    fn reset_skips_sessions_bound_to_non_characters() {
        let mut registry = registry();
        let mut pool = CharacterPool::new();
        let up = registry.register("brow_up", "model_a").unwrap();

        let car = pool.spawn(EntityKind::Vehicle, "adder");
        let ped = pool.spawn_blended_character("model_a");
        registry.bind_session(1, car);
        registry.bind_session(2, ped);
        pool.profile_or_insert(ped)
            .unwrap()
            .assign(&mut registry, up.effect, up, 0.5)
            .unwrap();

        let summary = registry.reset_all(&mut pool);

        assert_eq!(summary.profiles_cleared, 1);
        assert_eq!(summary.sessions_dropped, 2);
        assert!(pool.profile(ped).is_none());
        assert!(pool.profiled_characters().is_empty());
        assert_eq!(pool.model_hash(car), Some(crate::hash::joaat("adder")));
        assert_eq!(registry.streaming().resident_count(), 0);
    }

    #[test]
    fn reset_quiesces_leaked_references() {
        let mut registry = registry();
        let mut pool = CharacterPool::new();
        let up = registry.register("brow_up", "model_a").unwrap();
        registry.add_ref(up);
        assert!(registry.streaming().is_resident("model_a/brow_up"));

        let summary = registry.reset_all(&mut pool);

        assert_eq!(summary.handles_quiesced, 1);
        assert_eq!(registry.streaming().resident_count(), 0);
    }
}
