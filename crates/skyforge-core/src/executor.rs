//! Convergence executor
//!
//! Drives every task of a graph through find, diff, check and render in
//! dependency order against one render target. Tasks run one at a time;
//! later tasks read outputs recorded by earlier ones.

use crate::error::{Error, Result};
use crate::lifecycle::Lifecycle;
use crate::report::{ActionType, ConvergeReport, TaskAction};
use crate::target::{IacDocument, RenderTarget};
use crate::task::{Context, Task, TaskGraph, TaskKey};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Runs convergence passes over task graphs
#[derive(Debug, Clone, Default)]
pub struct Executor {
    cancel: CancellationToken,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor that stops before the next task once `cancel` fires
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Converge every task of `graph` against `target`.
    ///
    /// Fails before touching anything when the graph cannot be ordered or a
    /// task does not support the target. Aborts on the first task error.
    pub async fn run<C>(
        &self,
        cloud: &C,
        graph: &TaskGraph<C>,
        target: &mut RenderTarget,
    ) -> Result<ConvergeReport>
    where
        C: ?Sized + Send + Sync,
    {
        let started = Instant::now();
        let kind = target.kind();
        let ordered = graph.ordered()?;

        if let Some(task) = ordered
            .iter()
            .find(|task| task.lifecycle() != Lifecycle::Ignore && !task.supports(kind))
        {
            return Err(Error::UnsupportedTarget {
                task: task.key(),
                target: kind,
            });
        }

        tracing::info!(target_kind = %kind, tasks = ordered.len(), "starting convergence");

        let mut ctx = Context::new(cloud, kind, self.cancel.clone());
        let mut report = ConvergeReport::new(kind);

        for task in ordered {
            if self.cancel.is_cancelled() {
                tracing::warn!(task = %task.key(), "convergence cancelled");
                return Err(Error::Cancelled);
            }

            let action = task.run(&mut ctx, target).await?;
            report.actions.push(action);
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            target_kind = %kind,
            duration_ms = report.duration_ms,
            "convergence finished: {}",
            report.summary()
        );
        Ok(report)
    }
}

/// Converge a single task; errors carry the task identity
pub(crate) async fn converge_task<C, T>(
    task: &T,
    ctx: &mut Context<'_, C>,
    target: &mut RenderTarget,
) -> Result<TaskAction>
where
    C: ?Sized + Send + Sync,
    T: Task<C>,
{
    let key = <T as Task<C>>::key(task);
    converge(task, &key, ctx, target)
        .await
        .map_err(|e| e.for_task(&key))
}

async fn converge<C, T>(
    task: &T,
    key: &TaskKey,
    ctx: &mut Context<'_, C>,
    target: &mut RenderTarget,
) -> Result<TaskAction>
where
    C: ?Sized + Send + Sync,
    T: Task<C>,
{
    let lifecycle = <T as Task<C>>::lifecycle(task);
    if lifecycle == Lifecycle::Ignore {
        tracing::debug!(task = %key, "lifecycle is ignore, skipping");
        return Ok(TaskAction::new(key.clone(), ActionType::Skipped));
    }

    let actual = if target.kind().checks_existing() || lifecycle.requires_existing() {
        match task.find(ctx).await {
            Ok(found) => found,
            Err(e) if tolerate_access_denied(lifecycle, &e) => {
                tracing::warn!(
                    task = %key,
                    error = %e,
                    "insufficient access to find resource, skipping"
                );
                return Ok(TaskAction::new(key.clone(), ActionType::Skipped));
            }
            Err(e) => return Err(e),
        }
    } else {
        None
    };

    if let Some(actual) = &actual {
        ctx.record(key, actual.attributes());
    }

    let changes = match &actual {
        Some(actual) => T::diff(actual, task),
        None => task.clone(),
    };
    let fields = T::changed_fields(&changes);

    if actual.is_some() && fields.is_empty() {
        tracing::debug!(task = %key, "resource is up to date");
        return Ok(TaskAction::new(key.clone(), ActionType::NoOp));
    }

    if lifecycle == Lifecycle::ExistsAndWarnIfChanges {
        if actual.is_none() {
            return Err(Error::MustExist { task: key.clone() });
        }
        tracing::warn!(
            task = %key,
            fields = ?fields,
            "resource diverges from desired state; lifecycle forbids changes"
        );
        return Ok(TaskAction::new(key.clone(), ActionType::Warned).with_fields(&fields));
    }

    T::check_changes(actual.as_ref(), task, &changes)?;

    let rendered = render(task, key, ctx, target, actual.as_ref(), &changes).await;
    match rendered {
        Ok(()) => {}
        Err(e) if tolerate_access_denied(lifecycle, &e) => {
            tracing::warn!(
                task = %key,
                error = %e,
                "insufficient access to render resource, skipping"
            );
            return Ok(TaskAction::new(key.clone(), ActionType::Skipped));
        }
        Err(e) => return Err(e),
    }

    let action = match actual {
        None => {
            tracing::info!(task = %key, target_kind = %target.kind(), "created");
            TaskAction::new(key.clone(), ActionType::Create)
        }
        Some(_) => {
            tracing::info!(task = %key, target_kind = %target.kind(), fields = ?fields, "updated");
            TaskAction::new(key.clone(), ActionType::Update).with_fields(&fields)
        }
    };
    Ok(action)
}

async fn render<C, T>(
    task: &T,
    key: &TaskKey,
    ctx: &mut Context<'_, C>,
    target: &mut RenderTarget,
    actual: Option<&T>,
    changes: &T,
) -> Result<()>
where
    C: ?Sized + Send + Sync,
    T: Task<C>,
{
    match target {
        RenderTarget::DirectApply => {
            let attributes = task.render_direct(ctx, actual, changes).await?;
            ctx.record(key, attributes);
        }
        RenderTarget::TerraformEmit(doc) => {
            let declaration = task.render_terraform(ctx)?;
            doc.declare(key, declaration)?;
        }
        RenderTarget::CloudFormationEmit(template) => {
            let declaration = task.render_cloudformation(ctx)?;
            template.declare(key, declaration)?;
        }
    }
    Ok(())
}

fn tolerate_access_denied(lifecycle: Lifecycle, error: &Error) -> bool {
    lifecycle == Lifecycle::WarnIfInsufficientAccess && error.is_access_denied()
}
