//! Discovery of cluster resources for teardown

use crate::records::ResourceKind;
use crate::store::{Listing, MockCloud, with_retry};
use async_trait::async_trait;
use skyforge_core::{
    Deleter, DiscoveredResource, Error, ResourceId, ResourceKey, ResourceLister, Result,
    is_owned_by_cluster,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Deletes mock resources by kind and name
#[derive(Debug, Clone)]
pub struct MockDeleter {
    cloud: MockCloud,
}

#[async_trait]
impl Deleter for MockDeleter {
    async fn delete(&self, resource: &DiscoveredResource) -> Result<()> {
        let kind: ResourceKind = resource
            .resource_type
            .parse()
            .map_err(|e: String| Error::Api(e))?;
        self.cloud
            .delete_kind(kind, &resource.name)
            .map_err(Error::from)
    }
}

/// Kind of the resource an ID points at
fn kind_of(id: &str) -> Result<ResourceKind> {
    let parsed = ResourceId::parse(id)?;
    ResourceKind::from_segment(parsed.resource_type()).ok_or_else(|| Error::MalformedResourceId {
        id: id.to_string(),
        reason: format!("unknown resource type '{}'", parsed.resource_type()),
    })
}

impl MockCloud {
    fn discovered(&self, listing: Listing, cluster: &str) -> Result<DiscoveredResource> {
        // A resource is blocked by everything that references it, so each
        // reference becomes an edge from this resource to its target.
        let mut resource = DiscoveredResource::new(listing.kind.as_str(), &listing.id)
            .with_name(&listing.name)
            .with_object(listing.object)
            .shared(!is_owned_by_cluster(&listing.tags, cluster))
            .with_deleter(Arc::new(MockDeleter {
                cloud: self.clone(),
            }));
        for reference in &listing.references {
            resource = resource.blocking(ResourceKey::new(kind_of(reference)?.as_str(), reference));
        }
        Ok(resource)
    }
}

#[async_trait]
impl ResourceLister for MockCloud {
    async fn list(
        &self,
        cluster: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<DiscoveredResource>> {
        let mut resources = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = with_retry(self.read_backoff(), cancel, || {
                MockCloud::list(self, token.as_deref())
            })
            .await?;
            tracing::debug!(items = page.items.len(), "listed page");

            for listing in page.items {
                resources.push(self.discovered(listing, cluster)?);
            }
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(resources)
    }
}
