//! Lifecycle policy attached to every task

use serde::{Deserialize, Serialize};

/// Controls whether divergence from desired state is corrected, reported, or ignored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Create and update freely
    #[default]
    Sync,
    /// Must already exist; changes are logged as warnings and never applied
    ExistsAndWarnIfChanges,
    /// Like `Sync`, but an access-denied response skips the task with a warning
    WarnIfInsufficientAccess,
    /// Excluded from convergence entirely
    Ignore,
}

impl Lifecycle {
    /// Whether the executor may render a non-empty delta for this task
    pub fn allows_mutation(self) -> bool {
        matches!(self, Lifecycle::Sync | Lifecycle::WarnIfInsufficientAccess)
    }

    /// Whether the live resource must be looked up even when the target
    /// does not check existing state
    pub fn requires_existing(self) -> bool {
        matches!(self, Lifecycle::ExistsAndWarnIfChanges)
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lifecycle::Sync => write!(f, "sync"),
            Lifecycle::ExistsAndWarnIfChanges => write!(f, "exists-and-warn-if-changes"),
            Lifecycle::WarnIfInsufficientAccess => write!(f, "warn-if-insufficient-access"),
            Lifecycle::Ignore => write!(f, "ignore"),
        }
    }
}
