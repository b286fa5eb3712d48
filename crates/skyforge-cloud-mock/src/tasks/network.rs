use super::{cloudformation_tags, declared_tags, id_attributes, owned_tags, terraform_tags};
use crate::records::{NetworkRecord, Tags};
use crate::store::{MockCloud, with_retry};
use async_trait::async_trait;
use skyforge_core::delta::{changed, immutable, populated, required};
use skyforge_core::{
    Attributes, Context, Declaration, Lifecycle, Result, TargetKind, Task, TaskKey,
};

/// A virtual network
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Network {
    pub name: String,
    pub lifecycle: Lifecycle,

    /// Assigned by the cloud; set on found resources only
    pub id: Option<String>,

    pub cidr: Option<String>,
    pub enable_dns_hostnames: Option<bool>,
    pub tags: Option<Tags>,
}

impl Network {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    fn record(&self, cloud: &MockCloud) -> NetworkRecord {
        NetworkRecord {
            id: self.id.clone().unwrap_or_default(),
            name: self.name.clone(),
            cidr: self.cidr.clone().unwrap_or_default(),
            enable_dns_hostnames: self.enable_dns_hostnames.unwrap_or(false),
            tags: owned_tags(cloud, self.tags.as_ref()),
        }
    }
}

#[async_trait]
impl Task<MockCloud> for Network {
    const KIND: &'static str = "Network";
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

    async fn find(&self, ctx: &Context<'_, MockCloud>) -> Result<Option<Self>> {
        let cloud = ctx.cloud();
        let found = with_retry(cloud.read_backoff(), ctx.cancellation(), || {
            cloud.describe::<NetworkRecord>(&self.name)
        })
        .await?;

        Ok(found.map(|record| Network {
            name: record.name,
            lifecycle: self.lifecycle,
            id: Some(record.id),
            cidr: Some(record.cidr),
            enable_dns_hostnames: Some(record.enable_dns_hostnames),
            tags: Some(declared_tags(record.tags)),
        }))
    }

    fn diff(actual: &Self, expected: &Self) -> Self {
        Network {
            name: expected.name.clone(),
            lifecycle: expected.lifecycle,
            id: None,
            cidr: changed(&actual.cidr, &expected.cidr),
            enable_dns_hostnames: changed(
                &actual.enable_dns_hostnames,
                &expected.enable_dns_hostnames,
            ),
            tags: changed(&actual.tags, &expected.tags),
        }
    }

    fn changed_fields(changes: &Self) -> Vec<&'static str> {
        populated([
            ("cidr", changes.cidr.is_some()),
            ("enable_dns_hostnames", changes.enable_dns_hostnames.is_some()),
            ("tags", changes.tags.is_some()),
        ])
    }

    fn attributes(&self) -> Attributes {
        let mut attributes = id_attributes(self.id.as_ref());
        if let Some(cidr) = &self.cidr {
            attributes.insert("cidr_block".to_string(), cidr.clone());
        }
        attributes
    }

    fn check_changes(actual: Option<&Self>, expected: &Self, changes: &Self) -> Result<()> {
        let key = TaskKey::new(Self::KIND, &expected.name);
        required(&key, "cidr", actual.is_some(), &expected.cidr)?;
        immutable(&key, "cidr", actual.is_some(), &changes.cidr)
    }

    async fn render_direct(
        &self,
        ctx: &Context<'_, MockCloud>,
        actual: Option<&Self>,
        changes: &Self,
    ) -> Result<Attributes> {
        let cloud = ctx.cloud();
        let stored = match actual {
            None => with_retry(cloud.write_backoff(), ctx.cancellation(), || {
                cloud.create(self.record(cloud))
            })
            .await?,
            Some(actual) => {
                let desired = Network {
                    enable_dns_hostnames: changes
                        .enable_dns_hostnames
                        .or(actual.enable_dns_hostnames),
                    tags: changes.tags.clone().or_else(|| actual.tags.clone()),
                    ..actual.clone()
                };
                with_retry(cloud.write_backoff(), ctx.cancellation(), || {
                    cloud.update(desired.record(cloud))
                })
                .await?
            }
        };

        Ok(Attributes::from([
            ("id".to_string(), stored.id),
            ("cidr_block".to_string(), stored.cidr),
        ]))
    }

    fn render_terraform(&self, ctx: &Context<'_, MockCloud>) -> Result<Declaration> {
        Ok(Declaration::new("aws_vpc", &self.name)
            .optional("cidr_block", self.cidr.as_ref())
            .optional("enable_dns_hostnames", self.enable_dns_hostnames)
            .field(
                "tags",
                terraform_tags(&owned_tags(ctx.cloud(), self.tags.as_ref())),
            ))
    }

    fn render_cloudformation(&self, ctx: &Context<'_, MockCloud>) -> Result<Declaration> {
        Ok(Declaration::new("AWS::EC2::VPC", &self.name)
            .optional("CidrBlock", self.cidr.as_ref())
            .optional("EnableDnsHostnames", self.enable_dns_hostnames)
            .field(
                "Tags",
                cloudformation_tags(&owned_tags(ctx.cloud(), self.tags.as_ref())),
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyforge_core::Error;

    fn expected() -> Network {
        Network {
            cidr: Some("10.0.0.0/16".into()),
            enable_dns_hostnames: Some(true),
            ..Network::new("vnet1")
        }
    }

    #[test]
    fn test_diff_only_reports_divergent_fields() {
        let actual = Network {
            id: Some("id-1".into()),
            enable_dns_hostnames: Some(false),
            tags: Some(Tags::new()),
            ..expected()
        };

        let changes = Network::diff(&actual, &expected());
        assert_eq!(
            <Network as Task<MockCloud>>::changed_fields(&changes),
            vec!["enable_dns_hostnames"]
        );
    }

    #[test]
    fn test_cidr_cannot_change() {
        let actual = Network {
            cidr: Some("10.1.0.0/16".into()),
            ..expected()
        };
        let changes = Network::diff(&actual, &expected());

        let err = Network::check_changes(Some(&actual), &expected(), &changes).unwrap_err();
        assert!(matches!(err, Error::CannotChangeField { field: "cidr", .. }));
    }

    #[test]
    fn test_cidr_is_required() {
        let expected = Network::new("vnet1");
        let err = Network::check_changes(None, &expected, &expected).unwrap_err();
        assert!(matches!(err, Error::RequiredField { field: "cidr", .. }));
    }
}
