//! Settings management

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::policy::InvariantPolicy;

/// Morph system settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphSettings {
    /// Weights whose magnitude falls below this remove the assignment.
    pub micro_threshold: f32,
    pub invariant_policy: InvariantPolicy,
    /// A handle reaching this many references logs a warning.
    pub ref_warning_threshold: u32,
    /// Queue a re-blend of the character whenever a script changes its morphs.
    pub immediate_reblend: bool,
}

impl MorphSettings {
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_json_str(&source)
    }

    /// Whether a scripted weight means "remove" rather than "apply".
    pub fn is_negligible(&self, weight: f32) -> bool {
        weight.abs() < self.micro_threshold
    }
}

impl Default for MorphSettings {
    fn default() -> Self {
        Self {
            micro_threshold: 0.001,
            invariant_policy: InvariantPolicy::for_build(),
            ref_warning_threshold: 32,
            immediate_reblend: true,
        }
    }
}
