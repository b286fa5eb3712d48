use super::{cloudformation_tags, declared_tags, owned_tags, terraform_tags};
use crate::records::{KeyPairRecord, Tags, fingerprint};
use crate::store::{MockCloud, with_retry};
use async_trait::async_trait;
use skyforge_core::delta::{changed, immutable, populated, required};
use skyforge_core::{
    Attributes, Context, Declaration, Lifecycle, Result, TargetKind, Task, TaskKey,
};

/// An imported SSH public key
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyPair {
    pub name: String,
    pub lifecycle: Lifecycle,
    pub id: Option<String>,

    pub public_key: Option<String>,
    /// Computed by the cloud; never part of a delta
    pub fingerprint: Option<String>,
    pub tags: Option<Tags>,
}

impl KeyPair {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    fn outputs(record: &KeyPairRecord) -> Attributes {
        Attributes::from([
            ("id".to_string(), record.id.clone()),
            ("fingerprint".to_string(), record.fingerprint.clone()),
            ("key_name".to_string(), record.name.clone()),
        ])
    }
}

#[async_trait]
impl Task<MockCloud> for KeyPair {
    const KIND: &'static str = "KeyPair";
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
            cloud.describe::<KeyPairRecord>(&self.name)
        })
        .await?;

        Ok(found.map(|record| KeyPair {
            name: record.name,
            lifecycle: self.lifecycle,
            id: Some(record.id),
            public_key: Some(record.public_key),
            fingerprint: Some(record.fingerprint),
            tags: Some(declared_tags(record.tags)),
        }))
    }

    fn diff(actual: &Self, expected: &Self) -> Self {
        KeyPair {
            name: expected.name.clone(),
            lifecycle: expected.lifecycle,
            id: None,
            public_key: changed(&actual.public_key, &expected.public_key),
            fingerprint: None,
            tags: changed(&actual.tags, &expected.tags),
        }
    }

    fn changed_fields(changes: &Self) -> Vec<&'static str> {
        populated([
            ("public_key", changes.public_key.is_some()),
            ("tags", changes.tags.is_some()),
        ])
    }

    fn attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        if let Some(id) = &self.id {
            attributes.insert("id".to_string(), id.clone());
            attributes.insert("key_name".to_string(), self.name.clone());
        }
        if let Some(fingerprint) = &self.fingerprint {
            attributes.insert("fingerprint".to_string(), fingerprint.clone());
        }
        attributes
    }

    fn check_changes(actual: Option<&Self>, expected: &Self, changes: &Self) -> Result<()> {
        let key = TaskKey::new(Self::KIND, &expected.name);
        required(&key, "public_key", actual.is_some(), &expected.public_key)?;
        immutable(&key, "public_key", actual.is_some(), &changes.public_key)
    }

    async fn render_direct(
        &self,
        ctx: &Context<'_, MockCloud>,
        actual: Option<&Self>,
        changes: &Self,
    ) -> Result<Attributes> {
        let cloud = ctx.cloud();
        let source = actual.unwrap_or(self);
        let public_key = source.public_key.clone().unwrap_or_default();
        let record = KeyPairRecord {
            id: String::new(),
            name: self.name.clone(),
            fingerprint: fingerprint(&public_key),
            public_key,
            tags: owned_tags(
                cloud,
                changes.tags.as_ref().or(source.tags.as_ref()),
            ),
        };

        let stored = match actual {
            None => with_retry(cloud.write_backoff(), ctx.cancellation(), || {
                cloud.create(record.clone())
            })
            .await?,
            Some(_) => with_retry(cloud.write_backoff(), ctx.cancellation(), || {
                cloud.update(record.clone())
            })
            .await?,
        };

        Ok(Self::outputs(&stored))
    }

    fn render_terraform(&self, ctx: &Context<'_, MockCloud>) -> Result<Declaration> {
        Ok(Declaration::new("aws_key_pair", &self.name)
            .field("key_name", &self.name)
            .optional("public_key", self.public_key.as_ref())
            .field(
                "tags",
                terraform_tags(&owned_tags(ctx.cloud(), self.tags.as_ref())),
            ))
    }

    fn render_cloudformation(&self, ctx: &Context<'_, MockCloud>) -> Result<Declaration> {
        Ok(Declaration::new("AWS::EC2::KeyPair", &self.name)
            .field("KeyName", &self.name)
            .optional("PublicKeyMaterial", self.public_key.as_ref())
            .field(
                "Tags",
                cloudformation_tags(&owned_tags(ctx.cloud(), self.tags.as_ref())),
            ))
    }
}
