//! CloudFormation template
//!
//! Declarations become entries of `Resources`, keyed by a logical ID derived
//! from the task identity. References resolve to `{"Ref": id}` for the `id`
//! attribute and to `{"Fn::GetAtt": [id, attribute]}` otherwise.

use super::IacDocument;
use super::declaration::{Declaration, Literal};
use crate::error::{Error, Result};
use crate::task::TaskKey;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};

const TEMPLATE_VERSION: &str = "2010-09-09";

#[derive(Debug)]
struct Entry {
    resource_type: String,
    properties: BTreeMap<String, Literal>,
}

#[derive(Debug, Default)]
pub struct CloudFormationTemplate {
    description: Option<String>,
    resources: BTreeMap<String, Entry>,
    logical_ids: HashMap<TaskKey, String>,
}

impl CloudFormationTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Logical ID assigned to `task`
    pub fn logical_id_of(&self, task: &TaskKey) -> Option<&str> {
        self.logical_ids.get(task).map(String::as_str)
    }
}

impl IacDocument for CloudFormationTemplate {
    fn declare(&mut self, task: &TaskKey, declaration: Declaration) -> Result<String> {
        let logical_id = logical_id(&task.kind, &declaration.name);
        if self.resources.contains_key(&logical_id) || self.logical_ids.contains_key(task) {
            return Err(Error::DuplicateDeclaration {
                resource_type: declaration.resource_type,
                name: logical_id,
            });
        }

        self.resources.insert(
            logical_id.clone(),
            Entry {
                resource_type: declaration.resource_type,
                properties: declaration.fields,
            },
        );
        self.logical_ids.insert(task.clone(), logical_id.clone());

        tracing::debug!(task = %task, logical_id = %logical_id, "declared cloudformation resource");
        Ok(logical_id)
    }

    fn to_json(&self) -> Result<Value> {
        let resolve = |task: &TaskKey, attribute: &str| match self.logical_ids.get(task) {
            Some(id) if attribute == "id" => Ok(json!({ "Ref": id })),
            Some(id) => Ok(json!({ "Fn::GetAtt": [id, attribute] })),
            None => Err(Error::UnresolvedReference {
                task: task.clone(),
                attribute: attribute.to_string(),
            }),
        };

        let mut resources = Map::new();
        for (logical_id, entry) in &self.resources {
            let mut properties = Map::new();
            for (key, literal) in &entry.properties {
                properties.insert(key.clone(), literal.resolve(&resolve)?);
            }
            resources.insert(
                logical_id.clone(),
                json!({ "Type": entry.resource_type, "Properties": properties }),
            );
        }

        let mut template = Map::new();
        template.insert("AWSTemplateFormatVersion".into(), json!(TEMPLATE_VERSION));
        if let Some(description) = &self.description {
            template.insert("Description".into(), json!(description));
        }
        template.insert("Resources".into(), Value::Object(resources));
        Ok(Value::Object(template))
    }

    fn len(&self) -> usize {
        self.resources.len()
    }
}

/// Logical IDs are alphanumeric only: `Subnet` + `private-a` -> `SubnetPrivateA`
fn logical_id(kind: &str, name: &str) -> String {
    let mut out = String::new();
    for part in std::iter::once(kind).chain(name.split(|c: char| !c.is_ascii_alphanumeric())) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.extend(chars);
        }
    }
    out
}
