//! Head-blend integration
//!
//! The engine recomputes a character's head mesh in one synchronous blend
//! event. The adapter calls [`BlendIntegration::begin`] when the event
//! starts, [`BlendIntegration::apply_head_geometry`] once the engine is about
//! to finalize head geometry, and [`BlendIntegration::end`] afterwards. The
//! blending character is only known between `begin` and `end`; the engine
//! may recycle the session id as soon as the event returns.

use crate::character::{CharacterHost, Entity};
use crate::geometry::MorphBlend;
use crate::registry::{MorphRegistry, SessionId};
use crate::streaming::StreamingService;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum BlendState {
    #[default]
    Idle,
    Blending {
        session: SessionId,
        /// `None` when the session was never bound to a character.
        character: Option<Entity>,
    },
}

/// What one blend event did.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct BlendReport {
    /// Morphs blended into the head geometry.
    pub applied: u32,
    /// Morphs skipped because their geometry was not resident; each got one reconcile attempt.
    pub retried: u32,
    /// Assignments whose handle is no longer registered.
    pub missing: u32,
}

#[derive(Debug, Default)]
pub struct BlendIntegration {
    state: BlendState,
}

impl BlendIntegration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BlendState {
        self.state
    }

    pub fn current_character(&self) -> Option<Entity> {
        match self.state {
            BlendState::Blending { character, .. } => character,
            BlendState::Idle => None,
        }
    }

    /// Enter the blending state for `session`.
    pub fn begin<S: StreamingService>(&mut self, session: SessionId, registry: &MorphRegistry<S>) {
        if let BlendState::Blending { session: active, .. } = self.state {
            registry.policy().violation(&format!(
                "blend session {session} started while session {active} is still blending"
            ));
        }

        let character = registry.resolve_session_character(session);
        tracing::trace!(session, ?character, "blend started");
        self.state = BlendState::Blending { session, character };
    }

    /// Leave the blending state and forget the character.
    pub fn end(&mut self) {
        if let BlendState::Blending { session, .. } = self.state {
            tracing::trace!(session, "blend finished");
        }
        self.state = BlendState::Idle;
    }

    /// Blend every resident morph of the current character into `base`.
    ///
    /// Morphs are applied in the profile's effect-hash order. A morph whose
    /// geometry is not resident is skipped for this event after one reconcile
    /// attempt, so a failed load heals on a later event.
    pub fn apply_head_geometry<S, H, B>(
        &self,
        base: &mut S::Geometry,
        registry: &mut MorphRegistry<S>,
        host: &H,
        blender: &mut B,
    ) -> BlendReport
    where
        S: StreamingService,
        H: CharacterHost,
        B: MorphBlend<S::Geometry>,
    {
        let mut report = BlendReport::default();
        let policy = registry.policy();

        let (session, character) = match self.state {
            BlendState::Idle => {
                policy.violation("head geometry applied outside of a blend event");
                return report;
            }
            BlendState::Blending { session, character: None } => {
                policy.violation(&format!("missing target character for blend session {session}"));
                return report;
            }
            BlendState::Blending { session, character: Some(character) } => (session, character),
        };

        if !host.is_character(character) {
            policy.violation(&format!(
                "blend session {session} target {character:?} is not a live character"
            ));
            return report;
        }

        let Some(profile) = host.profile(character) else {
            return report;
        };

        for (effect, assignment) in profile.iter() {
            let key = assignment.key();
            match registry.geometry(key) {
                Some(morph) => {
                    blender.apply_morph(base, morph, assignment.weight());
                    report.applied += 1;
                    tracing::trace!(
                        effect,
                        weight = assignment.weight(),
                        "applied morph"
                    );
                }
                None if registry.contains(key) => {
                    registry.reconcile(key);
                    report.retried += 1;
                    tracing::debug!(
                        effect,
                        "morph geometry not resident, retrying load"
                    );
                }
                None => {
                    report.missing += 1;
                    tracing::debug!(
                        effect,
                        "morph assignment has no registered handle"
                    );
                }
            }
        }

        report
    }
}
