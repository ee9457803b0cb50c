//! Head Morph Core
//!
//! Runtime side of custom head micro-morphs:
//! - Reference-counted morph geometry handles over a streaming service
//! - Morph registry and blend-session tracking
//! - Per-character morph profiles
//! - Head-blend integration and the script-facing control surface

pub mod blend;
pub mod character;
pub mod config;
pub mod error;
pub mod geometry;
pub mod handle;
pub mod hash;
pub mod policy;
pub mod profile;
pub mod registry;
pub mod streaming;
pub mod system;

pub use blend::{BlendIntegration, BlendReport, BlendState};
pub use character::{CharacterHost, CharacterPool, Entity, EntityKind, ScriptGuid};
pub use config::MorphSettings;
pub use error::{MorphError, SettingsError};
pub use geometry::{Drawable, LinearMorph, MeshGeometry, Model, MorphBlend};
pub use handle::{GeometryHandle, MorphKey};
pub use hash::joaat;
pub use policy::InvariantPolicy;
pub use profile::{CharacterMorphProfile, MorphAssignment};
pub use registry::{MorphRegistry, ResetSummary, SessionId};
pub use streaming::{MemoryStreaming, StreamingService};
pub use system::MorphSystem;

pub use glam;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
