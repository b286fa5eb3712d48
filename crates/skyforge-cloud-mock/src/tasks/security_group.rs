use super::{declared_tags, id_attributes, link_from_id, linked_id, owned_tags, terraform_tags};
use crate::records::{IngressRule, SecurityGroupRecord, Tags};
use crate::store::{MockCloud, with_retry};
use async_trait::async_trait;
use skyforge_core::delta::{changed, immutable, populated, required};
use skyforge_core::{
    Attributes, Context, Declaration, Error, Lifecycle, Link, Literal, Result, TargetKind, Task,
    TaskKey,
};
use std::collections::BTreeMap;

/// A firewall attached to a network
///
/// Has no CloudFormation rendering.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SecurityGroup {
    pub name: String,
    pub lifecycle: Lifecycle,
    pub id: Option<String>,

    pub network: Option<Link>,
    pub description: Option<String>,
    pub ingress: Option<Vec<IngressRule>>,
    pub tags: Option<Tags>,
}

fn normalized(rules: &Option<Vec<IngressRule>>) -> Option<Vec<IngressRule>> {
    rules.as_ref().map(|rules| {
        let mut rules = rules.clone();
        rules.sort();
        rules.dedup();
        rules
    })
}

impl SecurityGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    fn record(&self, ctx: &Context<'_, MockCloud>) -> Result<SecurityGroupRecord> {
        let network = self.network.as_ref().ok_or_else(|| {
            Error::required(&TaskKey::new("SecurityGroup", &self.name), "network")
        })?;
        Ok(SecurityGroupRecord {
            id: self.id.clone().unwrap_or_default(),
            name: self.name.clone(),
            network_id: linked_id(ctx, network)?,
            description: self.description.clone().unwrap_or_default(),
            ingress: normalized(&self.ingress).unwrap_or_default(),
            tags: owned_tags(ctx.cloud(), self.tags.as_ref()),
        })
    }
}

#[async_trait]
impl Task<MockCloud> for SecurityGroup {
    const KIND: &'static str = "SecurityGroup";
    const TARGETS: &'static [TargetKind] = &[TargetKind::DirectApply, TargetKind::TerraformEmit];

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
            cloud.describe::<SecurityGroupRecord>(&self.name)
        })
        .await?
        else {
            return Ok(None);
        };

        Ok(Some(SecurityGroup {
            name: record.name,
            lifecycle: self.lifecycle,
            id: Some(record.id),
            network: Some(link_from_id("Network", &record.network_id)?),
            description: Some(record.description),
            ingress: Some(record.ingress),
            tags: Some(declared_tags(record.tags)),
        }))
    }

    fn diff(actual: &Self, expected: &Self) -> Self {
        SecurityGroup {
            name: expected.name.clone(),
            lifecycle: expected.lifecycle,
            id: None,
            network: changed(&actual.network, &expected.network),
            description: changed(&actual.description, &expected.description),
            ingress: changed(&normalized(&actual.ingress), &normalized(&expected.ingress)),
            tags: changed(&actual.tags, &expected.tags),
        }
    }

    fn changed_fields(changes: &Self) -> Vec<&'static str> {
        populated([
            ("network", changes.network.is_some()),
            ("description", changes.description.is_some()),
            ("ingress", changes.ingress.is_some()),
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
        immutable(&key, "network", exists, &changes.network)?;
        immutable(&key, "description", exists, &changes.description)
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
                let desired = SecurityGroup {
                    ingress: changes.ingress.clone().or_else(|| actual.ingress.clone()),
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
        let ingress = normalized(&self.ingress).map(|rules| {
            Literal::List(
                rules
                    .iter()
                    .map(|rule| {
                        Literal::Map(BTreeMap::from([
                            ("protocol".to_string(), Literal::from(&rule.protocol)),
                            ("from_port".to_string(), Literal::from(rule.port)),
                            ("to_port".to_string(), Literal::from(rule.port)),
                            (
                                "cidr_blocks".to_string(),
                                Literal::List(vec![Literal::from(&rule.cidr)]),
                            ),
                        ]))
                    })
                    .collect(),
            )
        });

        Ok(Declaration::new("aws_security_group", &self.name)
            .field("name", &self.name)
            .optional(
                "vpc_id",
                self.network.as_ref().map(|link| ctx.reference(link.key(), "id")),
            )
            .optional("description", self.description.as_ref())
            .optional("ingress", ingress)
            .field(
                "tags",
                terraform_tags(&owned_tags(ctx.cloud(), self.tags.as_ref())),
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(port: u16) -> IngressRule {
        IngressRule {
            protocol: "tcp".into(),
            port,
            cidr: "0.0.0.0/0".into(),
        }
    }

    fn expected() -> SecurityGroup {
        SecurityGroup {
            network: Some(Link::new("Network", "vnet1")),
            description: Some("web".into()),
            ingress: Some(vec![rule(443), rule(22)]),
            ..SecurityGroup::new("web")
        }
    }

    #[test]
    fn test_rule_order_is_not_a_change() {
        let actual = SecurityGroup {
            ingress: Some(vec![rule(22), rule(443)]),
            ..expected()
        };
        let changes = SecurityGroup::diff(&actual, &expected());
        assert!(<SecurityGroup as Task<MockCloud>>::changed_fields(&changes).is_empty());
    }

    #[test]
    fn test_rules_can_change_in_place() {
        let actual = SecurityGroup {
            ingress: Some(vec![rule(22)]),
            ..expected()
        };
        let changes = SecurityGroup::diff(&actual, &expected());

        assert_eq!(
            <SecurityGroup as Task<MockCloud>>::changed_fields(&changes),
            vec!["ingress"]
        );
        assert_eq!(changes.ingress, Some(vec![rule(22), rule(443)]));
        assert!(SecurityGroup::check_changes(Some(&actual), &expected(), &changes).is_ok());
    }

    #[test]
    fn test_no_cloudformation_support() {
        let targets = <SecurityGroup as Task<MockCloud>>::TARGETS;
        assert!(!targets.contains(&TargetKind::CloudFormationEmit));
    }
}
