//! Morph system service
//!
//! [`MorphSystem`] is the one explicitly constructed owner of the registry,
//! the character host, and the blend state. Its public methods are the
//! surface the scripting layer and the engine adapter call into:
//!
//! - script natives: [`register_morph`](MorphSystem::register_morph),
//!   [`set_morph_weight`](MorphSystem::set_morph_weight),
//!   [`reset_morph_weight`](MorphSystem::reset_morph_weight),
//!   [`get_morph_weight`](MorphSystem::get_morph_weight),
//!   [`has_morph_weight`](MorphSystem::has_morph_weight)
//! - blend manager hooks: [`on_blend_created`](MorphSystem::on_blend_created),
//!   [`on_blend_deleted`](MorphSystem::on_blend_deleted),
//!   [`handle_blend`](MorphSystem::handle_blend)
//! - lifecycle: [`reset_session`](MorphSystem::reset_session),
//!   [`shutdown`](MorphSystem::shutdown)
//!
//! Script entry points never fail: bad handles and unknown morphs come back
//! as `false`, `0.0`, or a no-op, with the reason logged at `debug`.

use crate::blend::{BlendIntegration, BlendReport, BlendState};
use crate::character::{CharacterHost, Entity, ScriptGuid};
use crate::config::MorphSettings;
use crate::geometry::MorphBlend;
use crate::handle::MorphKey;
use crate::hash::joaat;
use crate::registry::{MorphRegistry, ResetSummary, SessionId};
use crate::streaming::StreamingService;

pub struct MorphSystem<S: StreamingService, H: CharacterHost> {
    settings: MorphSettings,
    registry: MorphRegistry<S>,
    host: H,
    blend: BlendIntegration,
    pending_reblends: Vec<SessionId>,
}

impl<S: StreamingService, H: CharacterHost> MorphSystem<S, H> {
    pub fn new(settings: MorphSettings, streaming: S, host: H) -> Self {
        tracing::debug!(?settings, "morph system initialized");
        Self {
            registry: MorphRegistry::new(streaming, &settings),
            settings,
            host,
            blend: BlendIntegration::new(),
            pending_reblends: Vec::new(),
        }
    }

    /// Release everything and hand the collaborators back.
    pub fn shutdown(mut self) -> (S, H) {
        self.reset_session();
        let Self { registry, host, .. } = self;
        (registry.into_streaming(), host)
    }

    pub fn registry(&self) -> &MorphRegistry<S> {
        &self.registry
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable access to the host, for the adapter's own entity bookkeeping.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn streaming_mut(&mut self) -> &mut S {
        self.registry.streaming_mut()
    }

    // ------------------------------------------------------------------
    // Script natives
    // ------------------------------------------------------------------

    /// Register `effect_name` as a morph for `target_model`. `false` on duplicates
    /// and on drawables without usable geometry.
    pub fn register_morph(&mut self, target_model: &str, effect_name: &str) -> bool {
        match self.registry.register(effect_name, target_model) {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!("register_morph: {err}");
                false
            }
        }
    }

    /// Create, update, or (for negligible weights) remove a morph on a character,
    /// then queue a re-blend so the change shows without waiting a frame.
    pub fn set_morph_weight(&mut self, guid: ScriptGuid, effect_name: &str, weight: f32) {
        let Some((character, key)) = self.resolve_target(guid, effect_name, "set_morph_weight") else {
            return;
        };
        let remove = self.settings.is_negligible(weight);

        let existing = self
            .host
            .profile(character)
            .and_then(|profile| profile.get(key.effect).ok())
            .map(|assignment| assignment.key());

        match existing {
            Some(_) if remove => {
                self.unassign(character, key.effect);
                tracing::debug!(effect_name, weight, "removed morph with negligible weight");
            }
            Some(current) if current == key => {
                if let Some(profile) = self.host.profile_mut(character) {
                    if let Ok(previous) = profile.set_weight(key.effect, weight) {
                        tracing::debug!(effect_name, previous, weight, "updated morph weight");
                    }
                }
            }
            // The character's model changed since the morph was assigned:
            // retarget the entry so it references the current model's handle.
            Some(_) | None if !remove => {
                let Some(profile) = self.host.profile_or_insert(character) else {
                    return;
                };
                match profile.assign(&mut self.registry, key.effect, key, weight) {
                    Ok(()) => tracing::debug!(effect_name, weight, "assigned morph"),
                    Err(err) => tracing::debug!("set_morph_weight: {err}"),
                }
            }
            _ => {}
        }

        self.request_reblend(character);
    }

    /// Remove a morph from a character if it has one.
    pub fn reset_morph_weight(&mut self, guid: ScriptGuid, effect_name: &str) {
        let Some((character, key)) = self.resolve_target(guid, effect_name, "reset_morph_weight") else {
            return;
        };

        if self.unassign(character, key.effect) {
            tracing::debug!(effect_name, "removed morph as requested");
            self.request_reblend(character);
        }
    }

    /// Current weight of a morph on a character, `0.0` if unset or invalid.
    pub fn get_morph_weight(&self, guid: ScriptGuid, effect_name: &str) -> f32 {
        self.resolve_target(guid, effect_name, "get_morph_weight")
            .and_then(|(character, key)| {
                let profile = self.host.profile(character)?;
                profile.get(key.effect).ok().map(|assignment| assignment.weight())
            })
            .unwrap_or(0.0)
    }

    pub fn has_morph_weight(&self, guid: ScriptGuid, effect_name: &str) -> bool {
        self.resolve_target(guid, effect_name, "has_morph_weight")
            .and_then(|(character, key)| {
                self.host
                    .profile(character)
                    .map(|profile| profile.has(key.effect))
            })
            .unwrap_or(false)
    }

    /// Validate a script call's character and morph: the handle must be a live
    /// character with head-blend data, and the morph must be registered for its model.
    fn resolve_target(
        &self,
        guid: ScriptGuid,
        effect_name: &str,
        caller: &'static str,
    ) -> Option<(Entity, MorphKey)> {
        let Some(character) = self
            .host
            .resolve_guid(guid)
            .filter(|entity| self.host.is_character(*entity) && self.host.has_head_blend(*entity))
        else {
            tracing::debug!(caller, guid, "entity is not a character or has no head blend data");
            return None;
        };

        let model = self.host.model_hash(character)?;
        let key = MorphKey::new(joaat(effect_name), model);
        if !self.registry.contains(key) {
            tracing::debug!(caller, guid, effect_name, "no such morph registered for this model");
            return None;
        }

        Some((character, key))
    }

    /// Remove one assignment; detach the profile once it is empty.
    fn unassign(&mut self, character: Entity, effect: u32) -> bool {
        let Some(profile) = self.host.profile_mut(character) else {
            return false;
        };
        let removed = profile.unassign(&mut self.registry, effect);

        if profile.is_empty() {
            self.host.detach_profile(character);
            tracing::debug!(?character, "detached empty morph profile");
        }
        removed
    }

    fn request_reblend(&mut self, character: Entity) {
        if !self.settings.immediate_reblend {
            return;
        }
        if let Some(session) = self.registry.session_of(character) {
            if !self.pending_reblends.contains(&session) {
                self.pending_reblends.push(session);
            }
        }
    }

    /// Sessions whose head mesh should be recomputed now, oldest request first.
    pub fn take_reblend_requests(&mut self) -> Vec<SessionId> {
        std::mem::take(&mut self.pending_reblends)
    }

    // ------------------------------------------------------------------
    // Blend manager hooks
    // ------------------------------------------------------------------

    /// The engine created blend `session` for `character`.
    pub fn on_blend_created(&mut self, session: SessionId, character: Entity) {
        self.registry.bind_session(session, character);
    }

    /// The engine deleted blend `session`.
    pub fn on_blend_deleted(&mut self, session: SessionId) {
        self.registry.unbind_session(session);
        self.pending_reblends.retain(|pending| *pending != session);
    }

    pub fn begin_blend(&mut self, session: SessionId) {
        self.blend.begin(session, &self.registry);
    }

    /// Apply the current character's morphs to the head geometry being finalized.
    pub fn apply_head_geometry<B>(&mut self, base: &mut S::Geometry, blender: &mut B) -> BlendReport
    where
        B: MorphBlend<S::Geometry>,
    {
        self.blend
            .apply_head_geometry(base, &mut self.registry, &self.host, blender)
    }

    pub fn end_blend(&mut self) {
        self.blend.end();
    }

    pub fn blend_state(&self) -> BlendState {
        self.blend.state()
    }

    /// Run one full blend event for `session` against `base`.
    pub fn handle_blend<B>(&mut self, session: SessionId, base: &mut S::Geometry, blender: &mut B) -> BlendReport
    where
        B: MorphBlend<S::Geometry>,
    {
        self.begin_blend(session);
        let report = self.apply_head_geometry(base, blender);
        self.end_blend();
        report
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Release the character's morphs before the host destroys it.
    pub fn on_character_destroyed(&mut self, character: Entity) {
        if let Some(mut profile) = self.host.detach_profile(character) {
            tracing::debug!(?character, morphs = profile.len(), "releasing morphs of destroyed character");
            profile.clear(&mut self.registry);
        }
        if let Some(session) = self.registry.session_of(character) {
            self.on_blend_deleted(session);
        }
    }

    /// Session or world teardown: every profile, reference, handle, and session goes.
    pub fn reset_session(&mut self) -> ResetSummary {
        self.blend.end();
        self.pending_reblends.clear();
        let summary = self.registry.reset_all(&mut self.host);
        tracing::info!(
            profiles = summary.profiles_cleared,
            morphs = summary.handles_dropped,
            sessions = summary.sessions_dropped,
            "morph session reset"
        );
        summary
    }
}
