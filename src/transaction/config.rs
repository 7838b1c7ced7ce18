use super::ForceFlag;
use crate::core::Result;
use serde::{Deserialize, Serialize};

/// Hook deferral configuration
///
/// Can be built in code or loaded from JSON:
///
/// ```json
/// { "default_force": "false", "cascade_nested": false }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeferralConfig {
    /// Flag used when a level has no explicit setting and inherits nothing
    ///
    /// Applies at every such level, not only the outermost one. With
    /// `nested` and no explicit flags, levels alternate `nested`, `true`,
    /// `nested`: the child of a `nested` level inherits `true`, and the
    /// level below that inherits nothing and falls back here again.
    pub default_force: ForceFlag,

    /// Propagate `nested` to every descendant instead of only the immediate child
    pub cascade_nested: bool,
}

impl DeferralConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fallback force flag
    pub fn default_force(mut self, force: ForceFlag) -> Self {
        self.default_force = force;
        self
    }

    /// Enable or disable cascading of `nested`
    pub fn cascade_nested(mut self, cascade: bool) -> Self {
        self.cascade_nested = cascade;
        self
    }

    /// Parse from a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Flag a level inherits from its parent when none is given explicitly
    pub(crate) fn inherited_from(&self, parent: ForceFlag) -> Option<ForceFlag> {
        match parent {
            ForceFlag::Nested if self.cascade_nested => Some(ForceFlag::Nested),
            ForceFlag::Nested => Some(ForceFlag::True),
            _ => None,
        }
    }
}
