use super::{
    cloudformation_tags, declared_tags, id_attributes, link_from_id, linked_id, owned_tags,
    terraform_tags,
};
use crate::records::{SubnetRecord, Tags};
use crate::store::{MockCloud, with_retry};
use async_trait::async_trait;
use skyforge_core::delta::{changed, immutable, populated, required};
use skyforge_core::{
    Attributes, Context, Declaration, Error, Lifecycle, Link, Result, TargetKind, Task, TaskKey,
};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Subnet {
    pub name: String,
    pub lifecycle: Lifecycle,
    pub id: Option<String>,

    pub network: Option<Link>,
    pub cidr: Option<String>,
    pub zone: Option<String>,
    pub tags: Option<Tags>,
}

impl Subnet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    fn record(&self, ctx: &Context<'_, MockCloud>) -> Result<SubnetRecord> {
        let network = self
            .network
            .as_ref()
            .ok_or_else(|| Error::required(&TaskKey::new("Subnet", &self.name), "network"))?;
        Ok(SubnetRecord {
            id: self.id.clone().unwrap_or_default(),
            name: self.name.clone(),
            network_id: linked_id(ctx, network)?,
            cidr: self.cidr.clone().unwrap_or_default(),
            zone: self.zone.clone().unwrap_or_default(),
            tags: owned_tags(ctx.cloud(), self.tags.as_ref()),
        })
    }
}

#[async_trait]
impl Task<MockCloud> for Subnet {
    const KIND: &'static str = "Subnet";
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
        self.network.iter().map(|link| link.key().clone()).collect()
    }

    async fn find(&self, ctx: &Context<'_, MockCloud>) -> Result<Option<Self>> {
        let cloud = ctx.cloud();
        let Some(record) = with_retry(cloud.read_backoff(), ctx.cancellation(), || {
            cloud.describe::<SubnetRecord>(&self.name)
        })
        .await?
        else {
            return Ok(None);
        };

        Ok(Some(Subnet {
            name: record.name,
            lifecycle: self.lifecycle,
            id: Some(record.id),
            network: Some(link_from_id("Network", &record.network_id)?),
            cidr: Some(record.cidr),
            zone: Some(record.zone),
            tags: Some(declared_tags(record.tags)),
        }))
    }

    fn diff(actual: &Self, expected: &Self) -> Self {
        Subnet {
            name: expected.name.clone(),
            lifecycle: expected.lifecycle,
            id: None,
            network: changed(&actual.network, &expected.network),
            cidr: changed(&actual.cidr, &expected.cidr),
            zone: changed(&actual.zone, &expected.zone),
            tags: changed(&actual.tags, &expected.tags),
        }
    }

    fn changed_fields(changes: &Self) -> Vec<&'static str> {
        populated([
            ("network", changes.network.is_some()),
            ("cidr", changes.cidr.is_some()),
            ("zone", changes.zone.is_some()),
            ("tags", changes.tags.is_some()),
        ])
    }

    fn attributes(&self) -> Attributes {
        id_attributes(self.id.as_ref())
    }

    fn check_changes(actual: Option<&Self>, expected: &Self, changes: &Self) -> Result<()> {
        let key = TaskKey::new(Self::KIND, &expected.name);
        let exists = actual.is_some();
        required(&key, "network", exists, &expected.network)?;
        required(&key, "cidr", exists, &expected.cidr)?;
        immutable(&key, "network", exists, &changes.network)?;
        immutable(&key, "cidr", exists, &changes.cidr)?;
        immutable(&key, "zone", exists, &changes.zone)
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
                let desired = Subnet {
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
        Ok(Declaration::new("aws_subnet", &self.name)
            .optional(
                "vpc_id",
                self.network.as_ref().map(|link| ctx.reference(link.key(), "id")),
            )
            .optional("cidr_block", self.cidr.as_ref())
            .optional("availability_zone", self.zone.as_ref())
            .field(
                "tags",
                terraform_tags(&owned_tags(ctx.cloud(), self.tags.as_ref())),
            ))
    }

    fn render_cloudformation(&self, ctx: &Context<'_, MockCloud>) -> Result<Declaration> {
        Ok(Declaration::new("AWS::EC2::Subnet", &self.name)
            .optional(
                "VpcId",
                self.network.as_ref().map(|link| ctx.reference(link.key(), "id")),
            )
            .optional("CidrBlock", self.cidr.as_ref())
            .optional("AvailabilityZone", self.zone.as_ref())
            .field(
                "Tags",
                cloudformation_tags(&owned_tags(ctx.cloud(), self.tags.as_ref())),
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected() -> Subnet {
        Subnet {
            network: Some(Link::new("Network", "vnet1")),
            cidr: Some("10.0.1.0/24".into()),
            zone: Some("zone-a".into()),
            ..Subnet::new("sub1")
        }
    }

    #[test]
    fn test_depends_on_network() {
        assert_eq!(
            <Subnet as Task<MockCloud>>::dependencies(&expected()),
            vec![TaskKey::new("Network", "vnet1")]
        );
        assert!(<Subnet as Task<MockCloud>>::dependencies(&Subnet::new("loose")).is_empty());
    }

    #[test]
    fn test_moving_to_another_network_is_rejected() {
        let actual = Subnet {
            network: Some(Link::new("Network", "vnet0")),
            ..expected()
        };
        let changes = Subnet::diff(&actual, &expected());

        let err = Subnet::check_changes(Some(&actual), &expected(), &changes).unwrap_err();
        assert!(matches!(err, Error::CannotChangeField { field: "network", .. }));
    }

    #[test]
    fn test_network_is_required_on_create() {
        let expected = Subnet {
            network: None,
            ..expected()
        };
        let err = Subnet::check_changes(None, &expected, &expected).unwrap_err();
        assert!(matches!(err, Error::RequiredField { field: "network", .. }));
    }

    #[test]
    fn test_tag_changes_are_mutable() {
        let actual = Subnet {
            tags: Some(Tags::new()),
            ..expected()
        };
        let expected = Subnet {
            tags: Some(Tags::from([("env".to_string(), "dev".to_string())])),
            ..expected()
        };
        let changes = Subnet::diff(&actual, &expected);

        assert_eq!(<Subnet as Task<MockCloud>>::changed_fields(&changes), vec!["tags"]);
        assert!(Subnet::check_changes(Some(&actual), &expected, &changes).is_ok());
    }
}
