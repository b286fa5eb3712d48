//! Dependency-aware teardown
//!
//! Listers discover the live resources of a cluster and annotate each one
//! with the resources it blocks: when X lists Y in `blocks`, X has to be
//! deleted before Y (a subnet blocks its network). The planner deletes in
//! passes. Every pass removes, concurrently, all resources that nothing
//! remaining blocks, and waits for the whole pass before computing the next.

use crate::backoff::{Backoff, retry_with_backoff};
use crate::error::{Error, Result};
use crate::graph::find_cycle;
use crate::report::DeletionReport;
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Identity of a live resource, rendered as `type:id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub resource_type: String,
    pub id: String,
}

impl ResourceKey {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.id)
    }
}

impl std::str::FromStr for ResourceKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((resource_type, id)) if !resource_type.is_empty() && !id.is_empty() => {
                Ok(Self::new(resource_type, id))
            }
            _ => Err(Error::MalformedResourceId {
                id: s.to_string(),
                reason: "expected <type>:<id>".to_string(),
            }),
        }
    }
}

/// Removes one kind of resource from the cloud
#[async_trait]
pub trait Deleter: Send + Sync {
    /// Delete `resource`; `NotFound` means it is already gone
    async fn delete(&self, resource: &DiscoveredResource) -> Result<()>;
}

/// Discovers the resources belonging to a cluster
#[async_trait]
pub trait ResourceLister: Send + Sync {
    /// List every resource of `cluster`; retries stop once `cancel` fires
    async fn list(
        &self,
        cluster: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<DiscoveredResource>>;
}

/// A live resource found while tearing a cluster down
#[derive(Clone)]
pub struct DiscoveredResource {
    pub resource_type: String,
    pub id: String,
    pub name: String,

    /// Raw provider object, kept for deleters and reporting
    pub object: serde_json::Value,

    /// Resources that can only be deleted after this one
    pub blocks: Vec<ResourceKey>,

    /// Shared resources are never deleted
    pub shared: bool,

    pub deleter: Option<Arc<dyn Deleter>>,
}

impl DiscoveredResource {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            resource_type: resource_type.into(),
            name: id.clone(),
            id,
            object: serde_json::Value::Null,
            blocks: Vec::new(),
            shared: false,
            deleter: None,
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.resource_type, &self.id)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_object(mut self, object: serde_json::Value) -> Self {
        self.object = object;
        self
    }

    /// Declare that this resource must be deleted before `key`
    pub fn blocking(mut self, key: ResourceKey) -> Self {
        self.blocks.push(key);
        self
    }

    pub fn shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    pub fn with_deleter(mut self, deleter: Arc<dyn Deleter>) -> Self {
        self.deleter = Some(deleter);
        self
    }
}

impl fmt::Debug for DiscoveredResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveredResource")
            .field("key", &self.key())
            .field("name", &self.name)
            .field("blocks", &self.blocks)
            .field("shared", &self.shared)
            .field("deleter", &self.deleter.is_some())
            .finish()
    }
}

/// Deletes discovered resources in a safe order
#[derive(Debug, Clone)]
pub struct DeletionPlanner {
    backoff: Backoff,
    cancel: CancellationToken,
}

impl Default for DeletionPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl DeletionPlanner {
    /// Planner retrying each deletion under the write policy
    pub fn new() -> Self {
        Self {
            backoff: Backoff::write(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// List the resources of `cluster` and delete them
    pub async fn teardown<L>(&self, lister: &L, cluster: &str) -> Result<DeletionReport>
    where
        L: ResourceLister + ?Sized,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let resources = lister.list(cluster, &self.cancel).await?;
        tracing::info!(cluster, resources = resources.len(), "discovered cluster resources");
        self.delete_all(resources).await
    }

    /// Delete every non-shared resource of `resources`
    pub async fn delete_all(&self, resources: Vec<DiscoveredResource>) -> Result<DeletionReport> {
        let started = Instant::now();
        let mut report = DeletionReport::default();
        let mut remaining: BTreeMap<ResourceKey, DiscoveredResource> = BTreeMap::new();

        for resource in resources {
            let key = resource.key();
            if resource.shared {
                tracing::info!(resource = %key, "skipping shared resource");
                report.skipped_shared.push(key);
                continue;
            }
            if remaining.insert(key.clone(), resource).is_some() {
                tracing::debug!(resource = %key, "resource listed more than once");
            }
        }
        report.skipped_shared.sort();

        while !remaining.is_empty() {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let blocked: BTreeSet<&ResourceKey> = remaining
                .values()
                .flat_map(|resource| resource.blocks.iter())
                .filter(|key| remaining.contains_key(*key))
                .collect();
            let eligible: Vec<ResourceKey> = remaining
                .iter()
                .filter(|(key, resource)| !blocked.contains(key) && resource.deleter.is_some())
                .map(|(key, _)| key.clone())
                .collect();

            if eligible.is_empty() {
                return Err(stuck(&remaining, &blocked));
            }

            report.passes += 1;
            tracing::info!(
                pass = report.passes,
                count = eligible.len(),
                remaining = remaining.len(),
                "deleting resources"
            );

            let results = join_all(eligible.iter().map(|key| {
                let resource = &remaining[key];
                async move { (key, self.delete_one(resource).await) }
            }))
            .await;

            let mut failure = None;
            let mut cancelled = false;
            for (key, result) in results {
                match result {
                    Ok(()) => {
                        remaining.remove(key);
                        report.deleted.push(key.clone());
                    }
                    Err(Error::Cancelled) => cancelled = true,
                    Err(e) => {
                        tracing::error!(resource = %key, error = %e, "deletion failed");
                        failure.get_or_insert((key.clone(), e));
                    }
                }
            }

            if cancelled || (failure.is_some() && self.cancel.is_cancelled()) {
                tracing::warn!(
                    deleted = ?report.deleted,
                    remaining = ?remaining.keys().collect::<Vec<_>>(),
                    "teardown cancelled"
                );
                return Err(Error::Cancelled);
            }

            if let Some((key, source)) = failure {
                return Err(Error::DeletionFailed {
                    key,
                    source: Box::new(source),
                    deleted: report.deleted,
                    remaining: remaining.into_keys().collect(),
                });
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(duration_ms = report.duration_ms, "teardown finished: {}", report);
        Ok(report)
    }

    async fn delete_one(&self, resource: &DiscoveredResource) -> Result<()> {
        let key = resource.key();
        let Some(deleter) = &resource.deleter else {
            return Err(Error::UnresolvedDependency { stuck: vec![key] });
        };

        retry_with_backoff(&self.backoff, &self.cancel, move || async move {
            match deleter.delete(resource).await {
                Ok(()) => Ok(true),
                Err(e) if e.is_not_found() => {
                    tracing::debug!(resource = %resource.key(), "resource already deleted");
                    Ok(true)
                }
                Err(e) => Err(e),
            }
        })
        .await?;

        tracing::info!(resource = %key, name = %resource.name, "deleted");
        Ok(())
    }
}

/// Error for a pass that cannot delete anything
fn stuck(
    remaining: &BTreeMap<ResourceKey, DiscoveredResource>,
    blocked: &BTreeSet<&ResourceKey>,
) -> Error {
    let keys: Vec<ResourceKey> = remaining.keys().cloned().collect();

    // Something is unblocked but has no deleter: no cycle is involved
    if remaining.keys().any(|key| !blocked.contains(key)) {
        return Error::UnresolvedDependency { stuck: keys };
    }

    // Every remaining resource is blocked by another remaining one
    let mut blockers: BTreeMap<&ResourceKey, Vec<&ResourceKey>> = BTreeMap::new();
    for (key, resource) in remaining {
        for target in &resource.blocks {
            if let Some((target, _)) = remaining.get_key_value(target) {
                blockers.entry(target).or_default().push(key);
            }
        }
    }
    let candidates: BTreeSet<&ResourceKey> = remaining.keys().collect();
    let cycle = find_cycle(&candidates, |key| {
        blockers.get(key).cloned().unwrap_or_default()
    });

    Error::DeletionCycle {
        cycle,
        remaining: keys,
    }
}
