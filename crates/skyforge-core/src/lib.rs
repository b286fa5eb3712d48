//! Skyforge convergence engine
//!
//! Compares declared infrastructure against live cloud state and applies
//! the minimal set of changes, either directly through a provider API or by
//! emitting an infrastructure-as-code document.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                    skyforge CLI                   │
//! │            (order / render / simulate)            │
//! └─────────────────┬────────────────────────────────┘
//!                   │ TaskGraph<C>
//! ┌─────────────────▼────────────────────────────────┐
//! │                  skyforge-core                    │
//! │  graph ──► Executor ──► RenderTarget              │
//! │              │  find / diff / check / render      │
//! │              ▼                                    │
//! │      DirectApply │ TerraformEmit │ CloudFormation │
//! │                                                   │
//! │  ResourceLister ──► DeletionPlanner ──► Deleter   │
//! └───────┬──────────────────────────────────────────┘
//!         │ trait Task<C>, trait Deleter
//! ┌───────▼───────────┐
//! │ provider crates   │
//! │ (cloud-mock, ...) │
//! └───────────────────┘
//! ```

pub mod backoff;
pub mod deletion;
pub mod delta;
pub mod error;
pub mod executor;
pub mod graph;
pub mod lifecycle;
pub mod ownership;
pub mod report;
pub mod resource_id;
pub mod target;
pub mod task;

// Re-exports
pub use backoff::{Backoff, poll_with_backoff, retry_with_backoff};
pub use deletion::{DeletionPlanner, Deleter, DiscoveredResource, ResourceKey, ResourceLister};
pub use error::{Error, Result};
pub use executor::Executor;
pub use lifecycle::Lifecycle;
pub use ownership::{CLUSTER_TAG, is_owned_by_cluster};
pub use report::{ActionType, ConvergeReport, ConvergeSummary, DeletionReport, TaskAction};
pub use resource_id::ResourceId;
pub use target::{
    CloudFormationTemplate, Declaration, IacDocument, Literal, RenderTarget, TargetKind,
    TerraformDocument,
};
pub use task::{Attributes, Context, DynTask, Link, Task, TaskGraph, TaskKey};
