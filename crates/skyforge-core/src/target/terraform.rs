//! Terraform JSON document
//!
//! Declarations land under `resource.<type>.<name>`. References to other
//! tasks become `${type.name.attribute}` interpolations once the document is
//! serialized.

use super::IacDocument;
use super::declaration::{Declaration, Literal};
use crate::error::{Error, Result};
use crate::task::TaskKey;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
pub struct TerraformDocument {
    /// type -> name -> fields
    resources: BTreeMap<String, BTreeMap<String, BTreeMap<String, Literal>>>,

    /// task -> (type, name)
    addresses: HashMap<TaskKey, (String, String)>,
}

impl TerraformDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address of the resource declared for `task`
    pub fn address_of(&self, task: &TaskKey) -> Option<String> {
        self.addresses
            .get(task)
            .map(|(resource_type, name)| format!("{resource_type}.{name}"))
    }
}

impl IacDocument for TerraformDocument {
    fn declare(&mut self, task: &TaskKey, declaration: Declaration) -> Result<String> {
        let name = sanitize_name(&declaration.name);
        let taken = self
            .resources
            .get(&declaration.resource_type)
            .is_some_and(|by_name| by_name.contains_key(&name));
        if taken || self.addresses.contains_key(task) {
            return Err(Error::DuplicateDeclaration {
                resource_type: declaration.resource_type,
                name,
            });
        }

        self.resources
            .entry(declaration.resource_type.clone())
            .or_default()
            .insert(name.clone(), declaration.fields);
        let address = format!("{}.{}", declaration.resource_type, name);
        self.addresses
            .insert(task.clone(), (declaration.resource_type, name));

        tracing::debug!(task = %task, address = %address, "declared terraform resource");
        Ok(address)
    }

    fn to_json(&self) -> Result<Value> {
        let resolve = |task: &TaskKey, attribute: &str| match self.addresses.get(task) {
            Some((resource_type, name)) => Ok(Value::String(format!(
                "${{{resource_type}.{name}.{attribute}}}"
            ))),
            None => Err(Error::UnresolvedReference {
                task: task.clone(),
                attribute: attribute.to_string(),
            }),
        };

        let mut resource = Map::new();
        for (resource_type, by_name) in &self.resources {
            let mut blocks = Map::new();
            for (name, fields) in by_name {
                let mut body = Map::new();
                for (key, literal) in fields {
                    body.insert(key.clone(), literal.resolve(&resolve)?);
                }
                blocks.insert(name.clone(), Value::Object(body));
            }
            resource.insert(resource_type.clone(), Value::Object(blocks));
        }

        Ok(json!({ "resource": resource }))
    }

    fn len(&self) -> usize {
        self.addresses.len()
    }
}

/// Terraform names may only contain letters, digits, underscores and dashes,
/// and must not start with a digit.
fn sanitize_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        out.insert(0, '_');
    }
    out
}
