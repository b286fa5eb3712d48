//! Engine error types

use crate::deletion::ResourceKey;
use crate::target::TargetKind;
use crate::task::TaskKey;
use std::fmt::Display;
use thiserror::Error;

/// Engine errors
///
/// Validation and structural errors always carry enough identity (task key,
/// resource key, cycle members) to act on. Provider failures are classified
/// into `NotFound`, `AccessDenied`, `Transient` and `Api` so the engine can
/// decide whether to retry, tolerate or abort.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{task}: field {field} is required")]
    RequiredField { task: TaskKey, field: &'static str },

    #[error("{task}: field {field} cannot be changed once created")]
    CannotChangeField { task: TaskKey, field: &'static str },

    #[error("{task}: resource was not found but its lifecycle requires it to exist")]
    MustExist { task: TaskKey },

    #[error("cyclic dependency detected: {}", join(.cycle, " -> "))]
    CyclicDependency { cycle: Vec<TaskKey> },

    #[error("{task} depends on {dependency}, which is not part of the task graph")]
    MissingDependency { task: TaskKey, dependency: TaskKey },

    #[error("task {0} was declared more than once")]
    DuplicateTask(TaskKey),

    #[error(
        "deletion cycle detected: {} (remaining: {})",
        join(.cycle, " -> "),
        join(.remaining, ", ")
    )]
    DeletionCycle {
        cycle: Vec<ResourceKey>,
        remaining: Vec<ResourceKey>,
    },

    #[error("unable to make progress deleting resources: {}", join(.stuck, ", "))]
    UnresolvedDependency { stuck: Vec<ResourceKey> },

    #[error("failed to delete {key}: {source} (remaining: {})", join(.remaining, ", "))]
    DeletionFailed {
        key: ResourceKey,
        #[source]
        source: Box<Error>,
        deleted: Vec<ResourceKey>,
        remaining: Vec<ResourceKey>,
    },

    #[error("{task} does not support the {target} render target")]
    UnsupportedTarget { task: TaskKey, target: TargetKind },

    #[error("reference to {task}.{attribute} could not be resolved")]
    UnresolvedReference { task: TaskKey, attribute: String },

    #[error("resource {resource_type}.{name} was declared more than once")]
    DuplicateDeclaration { resource_type: String, name: String },

    #[error("timed out after {attempts} attempts{}", .last_error.as_ref().map(|e| format!(": {e}")).unwrap_or_default())]
    RetryTimeout {
        attempts: u32,
        last_error: Option<String>,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("{task}: {source}")]
    Task {
        task: TaskKey,
        #[source]
        source: Box<Error>,
    },

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("malformed resource ID {id:?}: {reason}")]
    MalformedResourceId { id: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn required(task: &TaskKey, field: &'static str) -> Self {
        Error::RequiredField {
            task: task.clone(),
            field,
        }
    }

    pub fn cannot_change(task: &TaskKey, field: &'static str) -> Self {
        Error::CannotChangeField {
            task: task.clone(),
            field,
        }
    }

    /// Whether the provider reported the resource as absent
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Task { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Whether the provider refused the call for lack of permissions
    pub fn is_access_denied(&self) -> bool {
        match self {
            Error::AccessDenied(_) => true,
            Error::Task { source, .. } => source.is_access_denied(),
            _ => false,
        }
    }

    /// Whether the run stopped because its cancellation token fired
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::Task { source, .. } | Error::DeletionFailed { source, .. } => {
                source.is_cancelled()
            }
            _ => false,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }

    /// Attach the identity of the task being converged.
    ///
    /// Errors that already name their task or resource, and cancellation, are
    /// returned unchanged.
    pub fn for_task(self, task: &TaskKey) -> Self {
        match self {
            Error::NotFound(_)
            | Error::AccessDenied(_)
            | Error::Transient(_)
            | Error::Api(_)
            | Error::RetryTimeout { .. }
            | Error::MalformedResourceId { .. }
            | Error::Json(_) => Error::Task {
                task: task.clone(),
                source: Box::new(self),
            },
            other => other,
        }
    }
}

pub(crate) fn join<T: Display>(items: &[T], separator: &str) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}
