//! Tasks converging resources of the mock cloud
//!
//! Every task reads through [`MockCloud::describe`] under the read backoff
//! and writes under the write backoff. The cluster ownership tag is added
//! to everything the tasks create and hidden from what they find, so
//! declared tags compare cleanly against observed ones.

mod instance;
mod key_pair;
mod network;
mod security_group;
mod subnet;

pub use instance::Instance;
pub use key_pair::KeyPair;
pub use network::Network;
pub use security_group::SecurityGroup;
pub use subnet::Subnet;

use crate::records::Tags;
use crate::store::MockCloud;
use skyforge_core::ownership::{strip_owned, tag_owned};
use skyforge_core::{Attributes, Context, Link, Literal, ResourceId, Result};
use std::collections::BTreeMap;

/// Tags written to the cloud: the declared ones plus cluster ownership
pub(crate) fn owned_tags(cloud: &MockCloud, declared: Option<&Tags>) -> Tags {
    let mut tags = declared.cloned().unwrap_or_default();
    tag_owned(&mut tags, cloud.cluster());
    tags
}

/// Observed tags without the ownership marker
pub(crate) fn declared_tags(mut observed: Tags) -> Tags {
    strip_owned(&mut observed);
    observed
}

/// Terraform `tags` map
pub(crate) fn terraform_tags(tags: &Tags) -> Literal {
    Literal::from(tags)
}

/// CloudFormation `Tags` list of `{Key, Value}` entries
pub(crate) fn cloudformation_tags(tags: &Tags) -> Literal {
    Literal::List(
        tags.iter()
            .map(|(key, value)| {
                Literal::Map(BTreeMap::from([
                    ("Key".to_string(), Literal::from(key)),
                    ("Value".to_string(), Literal::from(value)),
                ]))
            })
            .collect(),
    )
}

/// Link to the task owning the resource with the given ID
pub(crate) fn link_from_id(kind: &str, id: &str) -> Result<Link> {
    let parsed = ResourceId::parse(id)?;
    Ok(Link::new(kind, parsed.name()))
}

/// Concrete ID of a linked, already converged task
pub(crate) fn linked_id<C: ?Sized>(ctx: &Context<'_, C>, link: &Link) -> Result<String> {
    ctx.output(link.key(), "id")
}

pub(crate) fn id_attributes(id: Option<&String>) -> Attributes {
    id.map(|id| Attributes::from([("id".to_string(), id.clone())]))
        .unwrap_or_default()
}
