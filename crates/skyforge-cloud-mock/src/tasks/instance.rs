use super::{
    cloudformation_tags, declared_tags, id_attributes, link_from_id, linked_id, owned_tags,
    terraform_tags,
};
use crate::records::{InstanceRecord, Tags};
use crate::store::{MockCloud, with_retry};
use async_trait::async_trait;
use skyforge_core::delta::{changed, immutable, populated, required};
use skyforge_core::{
    Attributes, Context, Declaration, Error, Lifecycle, Link, Literal, Result, TargetKind, Task,
    TaskKey,
};

/// A virtual machine in a subnet
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Instance {
    pub name: String,
    pub lifecycle: Lifecycle,
    pub id: Option<String>,

    pub subnet: Option<Link>,
    pub image: Option<String>,
    pub instance_type: Option<String>,
    pub key_pair: Option<Link>,
    pub security_groups: Option<Vec<Link>>,
    pub tags: Option<Tags>,
}

fn sorted(links: &Option<Vec<Link>>) -> Option<Vec<Link>> {
    links.as_ref().map(|links| {
        let mut links = links.clone();
        links.sort();
        links.dedup();
        links
    })
}

impl Instance {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    fn record(&self, ctx: &Context<'_, MockCloud>) -> Result<InstanceRecord> {
        let subnet = self
            .subnet
            .as_ref()
            .ok_or_else(|| Error::required(&TaskKey::new("Instance", &self.name), "subnet"))?;
        let security_group_ids = sorted(&self.security_groups)
            .unwrap_or_default()
            .iter()
            .map(|link| linked_id(ctx, link))
            .collect::<Result<Vec<_>>>()?;

        Ok(InstanceRecord {
            id: self.id.clone().unwrap_or_default(),
            name: self.name.clone(),
            subnet_id: linked_id(ctx, subnet)?,
            image: self.image.clone().unwrap_or_default(),
            instance_type: self.instance_type.clone().unwrap_or_default(),
            key_pair_id: self
                .key_pair
                .as_ref()
                .map(|link| linked_id(ctx, link))
                .transpose()?,
            security_group_ids,
            tags: owned_tags(ctx.cloud(), self.tags.as_ref()),
        })
    }

    fn group_references(&self, ctx: &Context<'_, MockCloud>) -> Option<Literal> {
        sorted(&self.security_groups).map(|links| {
            Literal::List(
                links
                    .iter()
                    .map(|link| ctx.reference(link.key(), "id"))
                    .collect(),
            )
        })
    }
}

#[async_trait]
impl Task<MockCloud> for Instance {
    const KIND: &'static str = "Instance";
    const TARGETS: &'static [TargetKind] = &[
        TargetKind::DirectApply,
        TargetKind::TerraformEmit,
        TargetKind::CloudFormationEmit,
    ];

    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        self.subnet
            .iter()
            .chain(self.key_pair.iter())
            .chain(self.security_groups.iter().flatten())
            .map(|link| link.key().clone())
            .collect()
    }

    async fn find(&self, ctx: &Context<'_, MockCloud>) -> Result<Option<Self>> {
        let cloud = ctx.cloud();
        let Some(record) = with_retry(cloud.read_backoff(), ctx.cancellation(), || {
            cloud.describe::<InstanceRecord>(&self.name)
        })
        .await?
        else {
            return Ok(None);
        };

        let security_groups = record
            .security_group_ids
            .iter()
            .map(|id| link_from_id("SecurityGroup", id))
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Instance {
            name: record.name,
            lifecycle: self.lifecycle,
            id: Some(record.id),
            subnet: Some(link_from_id("Subnet", &record.subnet_id)?),
            image: Some(record.image),
            instance_type: Some(record.instance_type),
            key_pair: record
                .key_pair_id
                .as_deref()
                .map(|id| link_from_id("KeyPair", id))
                .transpose()?,
            security_groups: sorted(&Some(security_groups)),
            tags: Some(declared_tags(record.tags)),
        }))
    }

    fn diff(actual: &Self, expected: &Self) -> Self {
        Instance {
            name: expected.name.clone(),
            lifecycle: expected.lifecycle,
            id: None,
            subnet: changed(&actual.subnet, &expected.subnet),
            image: changed(&actual.image, &expected.image),
            instance_type: changed(&actual.instance_type, &expected.instance_type),
            key_pair: changed(&actual.key_pair, &expected.key_pair),
            security_groups: changed(
                &sorted(&actual.security_groups),
                &sorted(&expected.security_groups),
            ),
            tags: changed(&actual.tags, &expected.tags),
        }
    }

    fn changed_fields(changes: &Self) -> Vec<&'static str> {
        populated([
            ("subnet", changes.subnet.is_some()),
            ("image", changes.image.is_some()),
            ("instance_type", changes.instance_type.is_some()),
            ("key_pair", changes.key_pair.is_some()),
            ("security_groups", changes.security_groups.is_some()),
            ("tags", changes.tags.is_some()),
        ])
    }

    fn attributes(&self) -> Attributes {
        id_attributes(self.id.as_ref())
    }

    fn check_changes(actual: Option<&Self>, expected: &Self, changes: &Self) -> Result<()> {
        let key = TaskKey::new(Self::KIND, &expected.name);
        let exists = actual.is_some();
        required(&key, "subnet", exists, &expected.subnet)?;
        required(&key, "image", exists, &expected.image)?;
        required(&key, "instance_type", exists, &expected.instance_type)?;
        immutable(&key, "subnet", exists, &changes.subnet)?;
        immutable(&key, "image", exists, &changes.image)?;
        immutable(&key, "key_pair", exists, &changes.key_pair)
    }

    async fn render_direct(
        &self,
        ctx: &Context<'_, MockCloud>,
        actual: Option<&Self>,
        changes: &Self,
    ) -> Result<Attributes> {
        let cloud = ctx.cloud();
        let stored = match actual {
            None => {
                let record = self.record(ctx)?;
                with_retry(cloud.write_backoff(), ctx.cancellation(), || {
                    cloud.create(record.clone())
                })
                .await?
            }
            Some(actual) => {
                let desired = Instance {
                    instance_type: changes
                        .instance_type
                        .clone()
                        .or_else(|| actual.instance_type.clone()),
                    security_groups: changes
                        .security_groups
                        .clone()
                        .or_else(|| actual.security_groups.clone()),
                    tags: changes.tags.clone().or_else(|| actual.tags.clone()),
                    ..actual.clone()
                };
                let record = desired.record(ctx)?;
                with_retry(cloud.write_backoff(), ctx.cancellation(), || {
                    cloud.update(record.clone())
                })
                .await?
            }
        };

        Ok(Attributes::from([("id".to_string(), stored.id)]))
    }

    fn render_terraform(&self, ctx: &Context<'_, MockCloud>) -> Result<Declaration> {
        Ok(Declaration::new("aws_instance", &self.name)
            .optional("ami", self.image.as_ref())
            .optional("instance_type", self.instance_type.as_ref())
            .optional(
                "subnet_id",
                self.subnet.as_ref().map(|link| ctx.reference(link.key(), "id")),
            )
            .optional(
                "key_name",
                self.key_pair
                    .as_ref()
                    .map(|link| ctx.reference(link.key(), "key_name")),
            )
            .optional("vpc_security_group_ids", self.group_references(ctx))
            .field(
                "tags",
                terraform_tags(&owned_tags(ctx.cloud(), self.tags.as_ref())),
            ))
    }

    fn render_cloudformation(&self, ctx: &Context<'_, MockCloud>) -> Result<Declaration> {
        Ok(Declaration::new("AWS::EC2::Instance", &self.name)
            .optional("ImageId", self.image.as_ref())
            .optional("InstanceType", self.instance_type.as_ref())
            .optional(
                "SubnetId",
                self.subnet.as_ref().map(|link| ctx.reference(link.key(), "id")),
            )
            .optional(
                "KeyName",
                self.key_pair
                    .as_ref()
                    .map(|link| ctx.reference(link.key(), "id")),
            )
            .optional("SecurityGroupIds", self.group_references(ctx))
            .field(
                "Tags",
                cloudformation_tags(&owned_tags(ctx.cloud(), self.tags.as_ref())),
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected() -> Instance {
        Instance {
            subnet: Some(Link::new("Subnet", "sub1")),
            image: Some("img-ubuntu".into()),
            instance_type: Some("small".into()),
            key_pair: Some(Link::new("KeyPair", "admin")),
            security_groups: Some(vec![
                Link::new("SecurityGroup", "web"),
                Link::new("SecurityGroup", "ssh"),
            ]),
            ..Instance::new("vm1")
        }
    }

    #[test]
    fn test_dependencies_cover_every_link() {
        let deps = <Instance as Task<MockCloud>>::dependencies(&expected());
        assert_eq!(
            deps,
            vec![
                TaskKey::new("Subnet", "sub1"),
                TaskKey::new("KeyPair", "admin"),
                TaskKey::new("SecurityGroup", "web"),
                TaskKey::new("SecurityGroup", "ssh"),
            ]
        );
    }

    #[test]
    fn test_resizing_is_an_update() {
        let actual = Instance {
            instance_type: Some("tiny".into()),
            security_groups: Some(vec![
                Link::new("SecurityGroup", "ssh"),
                Link::new("SecurityGroup", "web"),
            ]),
            ..expected()
        };
        let changes = Instance::diff(&actual, &expected());

        assert_eq!(
            <Instance as Task<MockCloud>>::changed_fields(&changes),
            vec!["instance_type"]
        );
        assert!(Instance::check_changes(Some(&actual), &expected(), &changes).is_ok());
    }

    #[test]
    fn test_image_cannot_change() {
        let actual = Instance {
            image: Some("img-debian".into()),
            ..expected()
        };
        let changes = Instance::diff(&actual, &expected());
        let err = Instance::check_changes(Some(&actual), &expected(), &changes).unwrap_err();
        assert!(matches!(err, Error::CannotChangeField { field: "image", .. }));
    }

    #[test]
    fn test_instance_type_required_on_create() {
        let expected = Instance {
            instance_type: None,
            ..expected()
        };
        let err = Instance::check_changes(None, &expected, &expected).unwrap_err();
        assert!(matches!(
            err,
            Error::RequiredField {
                field: "instance_type",
                ..
            }
        ));
    }
}
