//! In-memory cloud
//!
//! All state lives behind one mutex owned by the [`MockCloud`] handle;
//! clones of the handle share it. Every API call is recorded, and faults
//! (throttling, access denial) can be injected per resource kind.

use crate::error::{MockError, Result};
use crate::records::{
    InstanceRecord, KeyPairRecord, NetworkRecord, Record, ResourceKind, SecurityGroupRecord,
    SubnetRecord, Tags,
};
use parking_lot::Mutex;
use skyforge_core::{Backoff, poll_with_backoff};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";
const DEFAULT_PAGE_SIZE: usize = 50;

/// API operations, as recorded in the call log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Describe,
    List,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Describe => "describe",
            Operation::List => "list",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    pub fn is_mutation(self) -> bool {
        matches!(self, Operation::Create | Operation::Update | Operation::Delete)
    }
}

/// One recorded API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    pub kind: Option<ResourceKind>,
    pub name: String,
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{} {} {}", self.operation.as_str(), kind, self.name),
            None => write!(f, "{} {}", self.operation.as_str(), self.name),
        }
    }
}

/// A resource as returned by the list API
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub kind: ResourceKind,
    pub id: String,
    pub name: String,
    pub tags: Tags,
    pub references: Vec<String>,
    pub object: serde_json::Value,
}

/// One page of the list API
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Listing>,
    /// Pass back to fetch the next page; `None` on the last page
    pub next_token: Option<String>,
}

/// Contents of the mock cloud
#[derive(Debug, Default)]
pub struct MockState {
    pub(crate) networks: BTreeMap<String, NetworkRecord>,
    pub(crate) subnets: BTreeMap<String, SubnetRecord>,
    pub(crate) key_pairs: BTreeMap<String, KeyPairRecord>,
    pub(crate) security_groups: BTreeMap<String, SecurityGroupRecord>,
    pub(crate) instances: BTreeMap<String, InstanceRecord>,
    throttled: BTreeMap<ResourceKind, u32>,
    denied: BTreeSet<ResourceKind>,
    calls: Vec<Call>,
}

impl MockState {
    fn admit(&mut self, operation: Operation, kind: ResourceKind, name: &str) -> Result<()> {
        self.calls.push(Call {
            operation,
            kind: Some(kind),
            name: name.to_string(),
        });
        self.fault(operation, kind)
    }

    /// Injected failure for `operation` on `kind`, if any
    fn fault(&mut self, operation: Operation, kind: ResourceKind) -> Result<()> {
        if self.denied.contains(&kind) {
            return Err(MockError::AccessDenied {
                operation: operation.as_str(),
                kind,
            });
        }
        if let Some(remaining) = self.throttled.get_mut(&kind) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(MockError::Throttled {
                    operation: operation.as_str(),
                    kind,
                });
            }
        }
        Ok(())
    }

    /// Every stored resource, ordered by ID
    fn listings(&self) -> Vec<Listing> {
        fn collect<R: Record>(table: &BTreeMap<String, R>, out: &mut Vec<Listing>) {
            out.extend(table.values().map(|record| Listing {
                kind: R::KIND,
                id: record.id().to_string(),
                name: record.name().to_string(),
                tags: record.tags().clone(),
                references: record.references().into_iter().map(String::from).collect(),
                object: serde_json::to_value(record).unwrap_or_default(),
            }));
        }

        let mut out = Vec::new();
        collect(&self.networks, &mut out);
        collect(&self.subnets, &mut out);
        collect(&self.key_pairs, &mut out);
        collect(&self.security_groups, &mut out);
        collect(&self.instances, &mut out);
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}

/// Handle to an in-memory EC2-like cloud
#[derive(Clone)]
pub struct MockCloud {
    cluster: String,
    page_size: usize,
    read_backoff: Backoff,
    write_backoff: Backoff,
    state: Arc<Mutex<MockState>>,
}

impl fmt::Debug for MockCloud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockCloud")
            .field("cluster", &self.cluster)
            .field("resources", &self.len())
            .finish()
    }
}

impl MockCloud {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            page_size: DEFAULT_PAGE_SIZE,
            read_backoff: Backoff::read(),
            write_backoff: Backoff::write(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn with_backoff(mut self, read: Backoff, write: Backoff) -> Self {
        self.read_backoff = read;
        self.write_backoff = write;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Name of the cluster this handle provisions
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn read_backoff(&self) -> &Backoff {
        &self.read_backoff
    }

    pub fn write_backoff(&self) -> &Backoff {
        &self.write_backoff
    }

    fn top_level_id(&self, kind: ResourceKind, name: &str) -> String {
        format!(
            "/subscriptions/{SUBSCRIPTION}/resourceGroups/{}/providers/{}/{}/{}",
            self.cluster,
            kind.namespace(),
            kind.segment(),
            name
        )
    }

    /// Look up a resource by name
    pub fn describe<R: Record>(&self, name: &str) -> Result<Option<R>> {
        let mut state = self.state.lock();
        state.admit(Operation::Describe, R::KIND, name)?;
        Ok(R::table(&state).get(name).cloned())
    }

    /// Create a resource; the returned record carries the assigned ID
    pub fn create<R: Record>(&self, mut record: R) -> Result<R> {
        let mut state = self.state.lock();
        let name = record.name().to_string();
        state.admit(Operation::Create, R::KIND, &name)?;

        if R::table(&state).contains_key(&name) {
            return Err(MockError::AlreadyExists { kind: R::KIND, name });
        }
        let known: BTreeSet<String> = state.listings().into_iter().map(|l| l.id).collect();
        if let Some(missing) = record.references().into_iter().find(|id| !known.contains(*id)) {
            return Err(MockError::InvalidParameter(format!(
                "{} {name} references unknown resource {missing}",
                R::KIND
            )));
        }

        let id = match record.parent_id() {
            Some(parent) => format!("{parent}/{}/{name}", R::KIND.segment()),
            None => self.top_level_id(R::KIND, &name),
        };
        record.set_id(id);
        R::table_mut(&mut state).insert(name.clone(), record.clone());

        tracing::debug!(kind = %R::KIND, name = %name, id = %record.id(), "mock resource created");
        Ok(record)
    }

    /// Replace a resource; its ID is preserved
    pub fn update<R: Record>(&self, mut record: R) -> Result<R> {
        let mut state = self.state.lock();
        let name = record.name().to_string();
        state.admit(Operation::Update, R::KIND, &name)?;

        let Some(existing) = R::table(&state).get(&name) else {
            return Err(MockError::NotFound { kind: R::KIND, name });
        };
        record.set_id(existing.id().to_string());
        R::table_mut(&mut state).insert(name.clone(), record.clone());

        tracing::debug!(kind = %R::KIND, name = %name, "mock resource updated");
        Ok(record)
    }

    /// Delete a resource; fails while other resources reference it
    pub fn delete<R: Record>(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.admit(Operation::Delete, R::KIND, name)?;

        let Some(existing) = R::table(&state).get(name) else {
            return Err(MockError::NotFound {
                kind: R::KIND,
                name: name.to_string(),
            });
        };
        let id = existing.id().to_string();
        if let Some(referrer) = state
            .listings()
            .into_iter()
            .find(|listing| listing.references.contains(&id))
        {
            return Err(MockError::DependencyViolation {
                kind: R::KIND,
                name: name.to_string(),
                referenced_by: format!("{} {}", referrer.kind, referrer.name),
            });
        }

        R::table_mut(&mut state).remove(name);
        tracing::debug!(kind = %R::KIND, name, "mock resource deleted");
        Ok(())
    }

    /// Delete a resource of a kind only known at runtime
    pub fn delete_kind(&self, kind: ResourceKind, name: &str) -> Result<()> {
        match kind {
            ResourceKind::Network => self.delete::<NetworkRecord>(name),
            ResourceKind::Subnet => self.delete::<SubnetRecord>(name),
            ResourceKind::KeyPair => self.delete::<KeyPairRecord>(name),
            ResourceKind::SecurityGroup => self.delete::<SecurityGroupRecord>(name),
            ResourceKind::Instance => self.delete::<InstanceRecord>(name),
        }
    }

    /// List every resource, ordered by ID, one page at a time
    pub fn list(&self, page_token: Option<&str>) -> Result<Page> {
        let mut state = self.state.lock();
        state.calls.push(Call {
            operation: Operation::List,
            kind: None,
            name: page_token.unwrap_or("").to_string(),
        });
        // A page reads every table
        for kind in ResourceKind::ALL {
            state.fault(Operation::List, kind)?;
        }

        let mut items: Vec<Listing> = state
            .listings()
            .into_iter()
            .filter(|listing| page_token.is_none_or(|token| listing.id.as_str() > token))
            .collect();
        let next_token = if items.len() > self.page_size {
            items.truncate(self.page_size);
            items.last().map(|listing| listing.id.clone())
        } else {
            None
        };
        Ok(Page { items, next_token })
    }

    /// Fail the next `times` calls on `kind` with a throttling error
    pub fn throttle(&self, kind: ResourceKind, times: u32) {
        self.state.lock().throttled.insert(kind, times);
    }

    /// Deny every call on `kind` until [`MockCloud::allow`]
    pub fn deny(&self, kind: ResourceKind) {
        self.state.lock().denied.insert(kind);
    }

    pub fn allow(&self, kind: ResourceKind) {
        self.state.lock().denied.remove(&kind);
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Calls that changed state
    pub fn mutations(&self) -> Vec<Call> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.operation.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Drop all resources, faults and recorded calls
    pub fn reset(&self) {
        *self.state.lock() = MockState::default();
    }

    /// Every stored resource keyed by ID
    pub fn all(&self) -> BTreeMap<String, serde_json::Value> {
        self.state
            .lock()
            .listings()
            .into_iter()
            .map(|listing| (listing.id, listing.object))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().listings().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run a provider call under `backoff`, retrying throttled requests
pub(crate) async fn with_retry<T, F>(
    backoff: &Backoff,
    cancel: &CancellationToken,
    mut call: F,
) -> skyforge_core::Result<T>
where
    F: FnMut() -> Result<T>,
{
    poll_with_backoff(backoff, cancel, || {
        std::future::ready(call().map(Some).map_err(skyforge_core::Error::from))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(name: &str) -> NetworkRecord {
        NetworkRecord {
            name: name.to_string(),
            cidr: "10.0.0.0/16".to_string(),
            ..Default::default()
        }
    }

    fn subnet(name: &str, network_id: &str) -> SubnetRecord {
        SubnetRecord {
            name: name.to_string(),
            network_id: network_id.to_string(),
            cidr: "10.0.1.0/24".to_string(),
            zone: "zone-a".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_ids_nest_children_under_parents() {
        let cloud = MockCloud::new("dev");
        let vnet = cloud.create(network("vnet1")).unwrap();
        let sub = cloud.create(subnet("sub1", &vnet.id)).unwrap();

        assert_eq!(
            vnet.id,
            "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/dev/providers/Mock.Network/networks/vnet1"
        );
        assert_eq!(sub.id, format!("{}/subnets/sub1", vnet.id));
        assert_eq!(
            cloud.describe::<SubnetRecord>("sub1").unwrap(),
            Some(sub)
        );
    }

    #[test]
    fn test_create_rejects_duplicates_and_dangling_references() {
        let cloud = MockCloud::new("dev");
        cloud.create(network("vnet1")).unwrap();

        assert!(matches!(
            cloud.create(network("vnet1")),
            Err(MockError::AlreadyExists { .. })
        ));
        assert!(matches!(
            cloud.create(subnet("sub1", "/nowhere")),
            Err(MockError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_update_preserves_id() {
        let cloud = MockCloud::new("dev");
        let created = cloud.create(network("vnet1")).unwrap();

        let mut changed = network("vnet1");
        changed.enable_dns_hostnames = true;
        let updated = cloud.update(changed).unwrap();

        assert_eq!(updated.id, created.id);
        assert!(matches!(
            cloud.update(network("ghost")),
            Err(MockError::NotFound { .. })
        ));
    }

    #[test]
    fn test_delete_refuses_referenced_resources() {
        let cloud = MockCloud::new("dev");
        let vnet = cloud.create(network("vnet1")).unwrap();
        cloud.create(subnet("sub1", &vnet.id)).unwrap();

        match cloud.delete::<NetworkRecord>("vnet1") {
            Err(MockError::DependencyViolation { referenced_by, .. }) => {
                assert_eq!(referenced_by, "Subnet sub1")
            }
            other => panic!("expected DependencyViolation, got {other:?}"),
        }

        cloud.delete_kind(ResourceKind::Subnet, "sub1").unwrap();
        cloud.delete::<NetworkRecord>("vnet1").unwrap();
        assert!(cloud.is_empty());
        assert!(matches!(
            cloud.delete::<NetworkRecord>("vnet1"),
            Err(MockError::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_paginates_in_id_order() {
        let cloud = MockCloud::new("dev").with_page_size(2);
        for name in ["a", "b", "c", "d", "e"] {
            cloud.create(network(name)).unwrap();
        }

        let mut names = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0;
        loop {
            let page = cloud.list(token.as_deref()).unwrap();
            pages += 1;
            names.extend(page.items.into_iter().map(|l| l.name));
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(pages, 3);
    }

    #[test]
    fn test_fault_injection_and_call_log() {
        let cloud = MockCloud::new("dev");
        cloud.throttle(ResourceKind::Network, 1);

        assert!(matches!(
            cloud.create(network("vnet1")),
            Err(MockError::Throttled { .. })
        ));
        cloud.create(network("vnet1")).unwrap();

        cloud.deny(ResourceKind::Network);
        assert!(matches!(
            cloud.describe::<NetworkRecord>("vnet1"),
            Err(MockError::AccessDenied { .. })
        ));
        cloud.allow(ResourceKind::Network);
        assert!(cloud.describe::<NetworkRecord>("vnet1").unwrap().is_some());

        let calls: Vec<String> = cloud.calls().iter().map(|c| c.to_string()).collect();
        assert_eq!(
            calls,
            vec![
                "create Network vnet1",
                "create Network vnet1",
                "describe Network vnet1",
                "describe Network vnet1",
            ]
        );
        assert_eq!(cloud.mutations().len(), 2);

        cloud.reset();
        assert!(cloud.calls().is_empty());
        assert!(cloud.is_empty());
    }

    #[test]
    fn test_list_honors_injected_faults() {
        let cloud = MockCloud::new("dev");
        cloud.create(network("vnet1")).unwrap();

        cloud.throttle(ResourceKind::Subnet, 1);
        assert!(matches!(
            cloud.list(None),
            Err(MockError::Throttled { operation: "list", kind: ResourceKind::Subnet })
        ));
        assert_eq!(cloud.list(None).unwrap().items.len(), 1);

        cloud.deny(ResourceKind::Instance);
        assert!(matches!(cloud.list(None), Err(MockError::AccessDenied { .. })));
        assert_eq!(cloud.calls().iter().filter(|c| c.operation == Operation::List).count(), 3);
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_throttling() {
        let cloud = MockCloud::new("dev");
        cloud.throttle(ResourceKind::Network, 2);

        let created = with_retry(&Backoff::immediate(3), &CancellationToken::new(), || {
            cloud.create(network("vnet1"))
        })
        .await
        .unwrap();

        assert_eq!(created.name, "vnet1");
        assert_eq!(cloud.calls().len(), 3);
    }
}
