//! What to do when an internal invariant breaks
//!
//! Negative reference counts and blend events without a character mean the
//! host protocol went out of sync. Test and debug builds stop right there;
//! shipped builds log and keep the host process alive.

use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantPolicy {
    /// Panic on the first violation.
    FailFast,
    /// Log the violation and return without touching state.
    Defensive,
}

impl InvariantPolicy {
    /// `FailFast` when built with debug assertions, `Defensive` otherwise.
    pub fn for_build() -> Self {
        if cfg!(debug_assertions) {
            Self::FailFast
        } else {
            Self::Defensive
        }
    }

    /// Report a violated invariant.
    #[track_caller]
    pub fn violation(self, message: &str) {
        match self {
            Self::FailFast => panic!("invariant violated: {message}"),
            Self::Defensive => tracing::error!("invariant violated: {message}"),
        }
    }
}

impl Default for InvariantPolicy {
    fn default() -> Self {
        Self::for_build()
    }
}
