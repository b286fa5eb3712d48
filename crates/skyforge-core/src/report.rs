//! Outcome reports of convergence and teardown runs

use crate::deletion::ResourceKey;
use crate::target::TargetKind;
use crate::task::TaskKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the executor did with a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Resource was absent and has been created (or declared)
    Create,
    /// Resource existed and the delta has been applied
    Update,
    /// Resource matches the desired state
    NoOp,
    /// Resource diverges but its lifecycle forbids correcting it
    Warned,
    /// Task was not converged (ignored, or access was denied)
    Skipped,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::NoOp => write!(f, "no-op"),
            ActionType::Warned => write!(f, "warned"),
            ActionType::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result of converging a single task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAction {
    pub task: TaskKey,

    pub action_type: ActionType,

    /// Fields of the delta (empty for creations and no-ops)
    pub changed_fields: Vec<String>,
}

impl TaskAction {
    pub fn new(task: TaskKey, action_type: ActionType) -> Self {
        Self {
            task,
            action_type,
            changed_fields: Vec::new(),
        }
    }

    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.changed_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }
}

/// Result of one convergence pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergeReport {
    pub target: TargetKind,

    /// Actions in execution order
    pub actions: Vec<TaskAction>,

    pub started_at: DateTime<Utc>,

    pub duration_ms: u64,
}

impl ConvergeReport {
    pub fn new(target: TargetKind) -> Self {
        Self {
            target,
            actions: Vec::new(),
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Whether any task was created or updated
    pub fn has_changes(&self) -> bool {
        self.actions
            .iter()
            .any(|a| matches!(a.action_type, ActionType::Create | ActionType::Update))
    }

    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&TaskAction> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Task keys in execution order
    pub fn order(&self) -> Vec<&TaskKey> {
        self.actions.iter().map(|a| &a.task).collect()
    }

    pub fn summary(&self) -> ConvergeSummary {
        ConvergeSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
            warned: self.actions_by_type(ActionType::Warned).len(),
            skipped: self.actions_by_type(ActionType::Skipped).len(),
        }
    }
}

/// Summary of a convergence pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergeSummary {
    pub create: usize,
    pub update: usize,
    pub no_change: usize,
    pub warned: usize,
    pub skipped: usize,
}

impl std::fmt::Display for ConvergeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} unchanged",
            self.create, self.update, self.no_change
        )?;
        if self.warned > 0 {
            write!(f, ", {} diverged", self.warned)?;
        }
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        Ok(())
    }
}

/// Result of a teardown run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeletionReport {
    /// Deleted resources, pass by pass
    pub deleted: Vec<ResourceKey>,

    /// Shared resources left in place
    pub skipped_shared: Vec<ResourceKey>,

    /// Number of deletion passes
    pub passes: usize,

    pub duration_ms: u64,
}

impl std::fmt::Display for DeletionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} deleted in {} passes, {} shared resources kept",
            self.deleted.len(),
            self.passes,
            self.skipped_shared.len()
        )
    }
}
