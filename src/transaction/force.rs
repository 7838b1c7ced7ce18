// ============================================================================
// Force Flag
// ============================================================================
//
// Tri-state value attached to every nesting level. A truthy flag makes the
// level own a hook bucket, so hooks registered beneath it fire when the level
// itself concludes instead of waiting for the outermost transaction.
//
// ============================================================================

use crate::core::HookError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Per-level deferral setting
///
/// ```text
/// False  ── hooks follow the host's default path
/// True   ── hooks registered at this level are kept in its bucket
/// Nested ── like True, and seeds True into the immediate child level
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForceFlag {
    #[default]
    False,
    True,
    Nested,
}

impl ForceFlag {
    /// Whether a level with this flag owns a hook bucket
    pub fn is_truthy(&self) -> bool {
        !matches!(self, ForceFlag::False)
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, ForceFlag::Nested)
    }
}

impl From<bool> for ForceFlag {
    fn from(value: bool) -> Self {
        if value { ForceFlag::True } else { ForceFlag::False }
    }
}

impl FromStr for ForceFlag {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "false" => Ok(ForceFlag::False),
            "true" => Ok(ForceFlag::True),
            "nested" => Ok(ForceFlag::Nested),
            other => Err(HookError::ConfigError(format!(
                "Invalid force flag '{}': expected true, false or nested",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ForceFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForceFlag::False => write!(f, "false"),
            ForceFlag::True => write!(f, "true"),
            ForceFlag::Nested => write!(f, "nested"),
        }
    }
}
