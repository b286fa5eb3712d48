//! The task protocol
//!
//! A task is one unit of desired infrastructure state. Every concrete task
//! type implements [`Task`]: it can look itself up in the live cloud, compute
//! the delta against what it found, validate that delta, and render it for
//! each render target it supports.
//!
//! Tasks refer to each other by [`TaskKey`]. A reference never owns the
//! referenced task; values produced by it (generated IDs and the like) are
//! read through the [`Context`] once that task has been processed.

use crate::error::{Error, Result};
use crate::lifecycle::Lifecycle;
use crate::report::TaskAction;
use crate::target::{Declaration, Literal, RenderTarget, TargetKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Stable identity of a task
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub kind: String,
    pub name: String,
}

impl TaskKey {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Reference from one task to another by identity
///
/// The linked task is not owned; its outputs are read through the
/// [`Context`] once it has been processed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Link {
    key: TaskKey,
}

impl Link {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: TaskKey::new(kind, name),
        }
    }

    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }
}

/// Output values of a processed task (`id`, `arn`, ...)
pub type Attributes = BTreeMap<String, String>;

/// Per-run state shared by all tasks of one convergence pass
pub struct Context<'a, C: ?Sized> {
    cloud: &'a C,
    target: TargetKind,
    outputs: HashMap<TaskKey, Attributes>,
    cancel: CancellationToken,
}

impl<'a, C: ?Sized> Context<'a, C> {
    pub fn new(cloud: &'a C, target: TargetKind, cancel: CancellationToken) -> Self {
        Self {
            cloud,
            target,
            outputs: HashMap::new(),
            cancel,
        }
    }

    /// Provider handle the tasks talk to
    pub fn cloud(&self) -> &'a C {
        self.cloud
    }

    pub fn target(&self) -> TargetKind {
        self.target
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Record outputs of `task`, merging with what is already known
    pub fn record(&mut self, task: &TaskKey, attributes: Attributes) {
        if attributes.is_empty() {
            return;
        }
        self.outputs
            .entry(task.clone())
            .or_default()
            .extend(attributes);
    }

    pub fn outputs(&self, task: &TaskKey) -> Option<&Attributes> {
        self.outputs.get(task)
    }

    /// Concrete value of an output of an already-processed task
    pub fn output(&self, task: &TaskKey, attribute: &str) -> Result<String> {
        self.outputs
            .get(task)
            .and_then(|attrs| attrs.get(attribute))
            .cloned()
            .ok_or_else(|| Error::UnresolvedReference {
                task: task.clone(),
                attribute: attribute.to_string(),
            })
    }

    /// Value for an IaC declaration.
    ///
    /// Outputs observed in the live cloud are inlined; anything else stays a
    /// symbolic reference resolved when the document is serialized.
    pub fn reference(&self, task: &TaskKey, attribute: &str) -> Literal {
        match self.outputs.get(task).and_then(|attrs| attrs.get(attribute)) {
            Some(value) => Literal::from(value.as_str()),
            None => Literal::reference(task, attribute),
        }
    }
}

/// A typed unit of desired infrastructure state
///
/// `C` is the provider handle (cloud client) the task reads from and writes
/// to. The delta of a task is a value of the task's own type in which only
/// the fields that differ are populated.
#[async_trait]
pub trait Task<C: ?Sized + Send + Sync>:
    Clone + PartialEq + fmt::Debug + Send + Sync + 'static
{
    /// Kind name used in the task key (e.g. `Network`)
    const KIND: &'static str;

    /// Render targets this task can be realized against
    const TARGETS: &'static [TargetKind];

    fn name(&self) -> &str;

    fn lifecycle(&self) -> Lifecycle;

    fn key(&self) -> TaskKey {
        TaskKey::new(Self::KIND, <Self as Task<C>>::name(self))
    }

    /// Tasks whose outputs this task reads
    fn dependencies(&self) -> Vec<TaskKey> {
        Vec::new()
    }

    /// Look up the live resource matching this task's identity
    async fn find(&self, ctx: &Context<'_, C>) -> Result<Option<Self>>;

    /// Fields of `expected` that differ from `actual`
    fn diff(actual: &Self, expected: &Self) -> Self;

    /// Names of the fields populated in a delta
    fn changed_fields(changes: &Self) -> Vec<&'static str>;

    /// Output values exposed by an observed resource
    fn attributes(&self) -> Attributes {
        Attributes::new()
    }

    /// Validate a delta before anything is mutated
    fn check_changes(actual: Option<&Self>, expected: &Self, changes: &Self) -> Result<()>;

    /// Create or update the resource through the provider API
    async fn render_direct(
        &self,
        _ctx: &Context<'_, C>,
        _actual: Option<&Self>,
        _changes: &Self,
    ) -> Result<Attributes> {
        Err(self.unsupported(TargetKind::DirectApply))
    }

    fn render_terraform(&self, _ctx: &Context<'_, C>) -> Result<Declaration> {
        Err(self.unsupported(TargetKind::TerraformEmit))
    }

    fn render_cloudformation(&self, _ctx: &Context<'_, C>) -> Result<Declaration> {
        Err(self.unsupported(TargetKind::CloudFormationEmit))
    }

    fn unsupported(&self, target: TargetKind) -> Error {
        Error::UnsupportedTarget {
            task: <Self as Task<C>>::key(self),
            target,
        }
    }
}

/// Object-safe view of a [`Task`], used to hold heterogeneous task graphs
#[async_trait]
pub trait DynTask<C: ?Sized + Send + Sync>: Send + Sync + fmt::Debug {
    fn key(&self) -> TaskKey;

    fn lifecycle(&self) -> Lifecycle;

    fn dependencies(&self) -> Vec<TaskKey>;

    fn supports(&self, target: TargetKind) -> bool;

    /// Converge this task against `target`
    async fn run(&self, ctx: &mut Context<'_, C>, target: &mut RenderTarget) -> Result<TaskAction>;
}

#[async_trait]
impl<C, T> DynTask<C> for T
where
    C: ?Sized + Send + Sync,
    T: Task<C>,
{
    fn key(&self) -> TaskKey {
        <T as Task<C>>::key(self)
    }

    fn lifecycle(&self) -> Lifecycle {
        <T as Task<C>>::lifecycle(self)
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        <T as Task<C>>::dependencies(self)
    }

    fn supports(&self, target: TargetKind) -> bool {
        T::TARGETS.contains(&target)
    }

    async fn run(&self, ctx: &mut Context<'_, C>, target: &mut RenderTarget) -> Result<TaskAction> {
        crate::executor::converge_task(self, ctx, target).await
    }
}

/// A set of tasks keyed by identity
pub struct TaskGraph<C: ?Sized + Send + Sync> {
    tasks: BTreeMap<TaskKey, Box<dyn DynTask<C>>>,
}

impl<C: ?Sized + Send + Sync> TaskGraph<C> {
    pub fn new() -> Self {
        Self {
            tasks: BTreeMap::new(),
        }
    }

    /// Add a task; identities must be unique
    pub fn add<T: Task<C>>(&mut self, task: T) -> Result<()> {
        self.add_boxed(Box::new(task))
    }

    pub fn add_boxed(&mut self, task: Box<dyn DynTask<C>>) -> Result<()> {
        let key = task.key();
        if self.tasks.contains_key(&key) {
            return Err(Error::DuplicateTask(key));
        }
        self.tasks.insert(key, task);
        Ok(())
    }

    pub fn get(&self, key: &TaskKey) -> Option<&dyn DynTask<C>> {
        self.tasks.get(key).map(|task| task.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &TaskKey> {
        self.tasks.keys()
    }

    /// Tasks in dependency order
    pub fn ordered(&self) -> Result<Vec<&dyn DynTask<C>>> {
        let edges = self
            .tasks
            .iter()
            .map(|(key, task)| (key.clone(), task.dependencies()))
            .collect();
        let order = crate::graph::topological_order(&edges)?;
        Ok(order
            .iter()
            .filter_map(|key| self.get(key))
            .collect())
    }
}

impl<C: ?Sized + Send + Sync> Default for TaskGraph<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized + Send + Sync> fmt::Debug for TaskGraph<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.tasks.keys().collect::<Vec<_>>())
            .finish()
    }
}
