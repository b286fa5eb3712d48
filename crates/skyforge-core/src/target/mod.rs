//! Render targets
//!
//! A render target decides what happens to a validated delta: a direct
//! cloud mutation, or a declaration appended to an infrastructure-as-code
//! document. The set of targets is closed; tasks declare which ones they
//! support and the executor refuses to start when a task lacks the selected one.

mod cloudformation;
mod declaration;
mod terraform;

pub use cloudformation::CloudFormationTemplate;
pub use declaration::{Declaration, Literal};
pub use terraform::TerraformDocument;

use crate::error::Result;
use crate::task::TaskKey;
use serde::{Deserialize, Serialize};

/// Tag identifying a render target, independent of its document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    DirectApply,
    TerraformEmit,
    CloudFormationEmit,
}

impl TargetKind {
    /// Whether tasks are looked up in the live cloud before rendering.
    ///
    /// Emit targets render the complete declaration of every task, so the
    /// executor treats the actual state as absent for them.
    pub fn checks_existing(self) -> bool {
        matches!(self, TargetKind::DirectApply)
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::DirectApply => write!(f, "direct"),
            TargetKind::TerraformEmit => write!(f, "terraform"),
            TargetKind::CloudFormationEmit => write!(f, "cloudformation"),
        }
    }
}

impl std::str::FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" | "direct-apply" => Ok(TargetKind::DirectApply),
            "terraform" => Ok(TargetKind::TerraformEmit),
            "cloudformation" => Ok(TargetKind::CloudFormationEmit),
            other => Err(format!(
                "unknown target {other:?} (expected direct, terraform or cloudformation)"
            )),
        }
    }
}

/// Shared behavior of the generated IaC documents
pub trait IacDocument {
    /// Append a declaration for `task`, returning its symbolic address
    fn declare(&mut self, task: &TaskKey, declaration: Declaration) -> Result<String>;

    /// Serialize the document, resolving every symbolic reference
    fn to_json(&self) -> Result<serde_json::Value>;

    /// Number of declared resources
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The backend selected for one convergence run
#[derive(Debug)]
pub enum RenderTarget {
    DirectApply,
    TerraformEmit(TerraformDocument),
    CloudFormationEmit(CloudFormationTemplate),
}

impl RenderTarget {
    pub fn direct() -> Self {
        RenderTarget::DirectApply
    }

    pub fn terraform() -> Self {
        RenderTarget::TerraformEmit(TerraformDocument::new())
    }

    pub fn cloudformation() -> Self {
        RenderTarget::CloudFormationEmit(CloudFormationTemplate::new())
    }

    /// Build an empty target of the given kind
    pub fn for_kind(kind: TargetKind) -> Self {
        match kind {
            TargetKind::DirectApply => Self::direct(),
            TargetKind::TerraformEmit => Self::terraform(),
            TargetKind::CloudFormationEmit => Self::cloudformation(),
        }
    }

    pub fn kind(&self) -> TargetKind {
        match self {
            RenderTarget::DirectApply => TargetKind::DirectApply,
            RenderTarget::TerraformEmit(_) => TargetKind::TerraformEmit,
            RenderTarget::CloudFormationEmit(_) => TargetKind::CloudFormationEmit,
        }
    }

    /// The generated document, if this target emits one
    pub fn document(&self) -> Option<&dyn IacDocument> {
        match self {
            RenderTarget::DirectApply => None,
            RenderTarget::TerraformEmit(doc) => Some(doc),
            RenderTarget::CloudFormationEmit(doc) => Some(doc),
        }
    }

    /// Pretty-printed document, if this target emits one
    pub fn render_document(&self) -> Result<Option<String>> {
        match self.document() {
            Some(doc) => Ok(Some(serde_json::to_string_pretty(&doc.to_json()?)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_kind_parsing() {
        assert_eq!("terraform".parse::<TargetKind>().unwrap(), TargetKind::TerraformEmit);
        assert_eq!(
            "CloudFormation".parse::<TargetKind>().unwrap(),
            TargetKind::CloudFormationEmit
        );
        assert_eq!("direct".parse::<TargetKind>().unwrap(), TargetKind::DirectApply);
        assert!("pulumi".parse::<TargetKind>().is_err());
    }

    #[test]
    fn test_only_direct_checks_existing() {
        assert!(TargetKind::DirectApply.checks_existing());
        assert!(!TargetKind::TerraformEmit.checks_existing());
        assert!(!TargetKind::CloudFormationEmit.checks_existing());
    }

    #[test]
    fn test_direct_target_has_no_document() {
        let target = RenderTarget::for_kind(TargetKind::DirectApply);
        assert!(target.document().is_none());
        assert!(target.render_document().unwrap().is_none());

        let target = RenderTarget::for_kind(TargetKind::TerraformEmit);
        assert_eq!(target.kind(), TargetKind::TerraformEmit);
        assert!(target.document().unwrap().is_empty());
    }
}
