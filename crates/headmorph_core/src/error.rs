use thiserror::Error;

/// Errors produced by the registry and character profiles.
///
/// None of these cross the scripted surface; the control surface turns them
/// into `false`, `0.0`, or a no-op and logs the reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MorphError {
    #[error("morph or model name '{name}' must not be empty or contain '/'")]
    InvalidName { name: String },

    #[error("morph '{resource}' is already registered")]
    AlreadyRegistered { resource: String },

    #[error("no streamable drawable named '{resource}'")]
    ResourceNotFound { resource: String },

    #[error("drawable '{resource}' could not be made resident")]
    LoadFailed { resource: String },

    #[error("drawable '{resource}' has no primary model geometry")]
    NoPrimaryGeometry { resource: String },

    #[error("no morph {effect:#010x} registered for model {model:#010x}")]
    UnknownMorph { effect: u32, model: u32 },

    #[error("profile has no assignment for morph {effect:#010x}")]
    NotFound { effect: u32 },
}

/// Errors loading [`MorphSettings`](crate::config::MorphSettings).
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}
