//! Mock provider error types

use crate::records::ResourceKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MockError {
    #[error("{kind} {name} not found")]
    NotFound { kind: ResourceKind, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: ResourceKind, name: String },

    #[error("{kind} {name} is still referenced by {referenced_by}")]
    DependencyViolation {
        kind: ResourceKind,
        name: String,
        referenced_by: String,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("access denied to {operation} on {kind}")]
    AccessDenied {
        operation: &'static str,
        kind: ResourceKind,
    },

    #[error("request rate exceeded for {operation} on {kind}")]
    Throttled {
        operation: &'static str,
        kind: ResourceKind,
    },
}

pub type Result<T> = std::result::Result<T, MockError>;

/// Errors loading a manifest into a task graph
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{kind} {name}: {reason}")]
    Invalid {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error(transparent)]
    Graph(#[from] skyforge_core::Error),
}

impl From<MockError> for skyforge_core::Error {
    fn from(err: MockError) -> Self {
        use skyforge_core::Error;
        match err {
            MockError::NotFound { .. } => Error::NotFound(err.to_string()),
            MockError::AccessDenied { .. } => Error::AccessDenied(err.to_string()),
            MockError::Throttled { .. } => Error::Transient(err.to_string()),
            other => Error::Api(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let throttled = MockError::Throttled {
            operation: "describe",
            kind: ResourceKind::Network,
        };
        assert!(skyforge_core::Error::from(throttled).is_transient());

        let missing = MockError::NotFound {
            kind: ResourceKind::Subnet,
            name: "sub1".into(),
        };
        assert!(skyforge_core::Error::from(missing).is_not_found());

        let conflict = MockError::DependencyViolation {
            kind: ResourceKind::Network,
            name: "vnet1".into(),
            referenced_by: "Subnet sub1".into(),
        };
        assert!(matches!(
            skyforge_core::Error::from(conflict),
            skyforge_core::Error::Api(_)
        ));
    }
}
