//! Typed resource declarations for the IaC emit targets

use crate::task::TaskKey;
use std::collections::BTreeMap;

/// A field value inside a declaration
///
/// References to other tasks stay symbolic until the document is serialized,
/// so a declaration can point at a resource whose ID does not exist yet.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Value(serde_json::Value),
    Reference { task: TaskKey, attribute: String },
    List(Vec<Literal>),
    Map(BTreeMap<String, Literal>),
}

impl Literal {
    pub fn reference(task: &TaskKey, attribute: impl Into<String>) -> Self {
        Literal::Reference {
            task: task.clone(),
            attribute: attribute.into(),
        }
    }

    /// Resolve every nested reference with `resolve`, producing plain JSON
    pub fn resolve<F>(&self, resolve: &F) -> crate::Result<serde_json::Value>
    where
        F: Fn(&TaskKey, &str) -> crate::Result<serde_json::Value>,
    {
        Ok(match self {
            Literal::Value(value) => value.clone(),
            Literal::Reference { task, attribute } => resolve(task, attribute)?,
            Literal::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|item| item.resolve(resolve))
                    .collect::<crate::Result<_>>()?,
            ),
            Literal::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.resolve(resolve)?)))
                    .collect::<crate::Result<_>>()?,
            ),
        })
    }
}

impl From<serde_json::Value> for Literal {
    fn from(value: serde_json::Value) -> Self {
        Literal::Value(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Value(serde_json::Value::String(value.to_string()))
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Value(serde_json::Value::String(value))
    }
}

impl From<&String> for Literal {
    fn from(value: &String) -> Self {
        Literal::from(value.as_str())
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Value(serde_json::Value::Bool(value))
    }
}

impl From<u16> for Literal {
    fn from(value: u16) -> Self {
        Literal::Value(serde_json::Value::from(value))
    }
}

impl From<u32> for Literal {
    fn from(value: u32) -> Self {
        Literal::Value(serde_json::Value::from(value))
    }
}

impl From<Vec<Literal>> for Literal {
    fn from(items: Vec<Literal>) -> Self {
        Literal::List(items)
    }
}

impl From<&BTreeMap<String, String>> for Literal {
    fn from(map: &BTreeMap<String, String>) -> Self {
        Literal::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), Literal::from(v)))
                .collect(),
        )
    }
}

/// One resource to be written into an IaC document
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// Target-specific resource type (e.g. `aws_vpc`, `AWS::EC2::VPC`)
    pub resource_type: String,

    /// Resource name inside the document
    pub name: String,

    pub fields: BTreeMap<String, Literal>,
}

impl Declaration {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Set a field only when a value is present
    pub fn optional<V: Into<Literal>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.field(key, value),
            None => self,
        }
    }

    /// Tasks this declaration refers to
    pub fn references(&self) -> Vec<&TaskKey> {
        fn collect<'a>(literal: &'a Literal, out: &mut Vec<&'a TaskKey>) {
            match literal {
                Literal::Value(_) => {}
                Literal::Reference { task, .. } => out.push(task),
                Literal::List(items) => items.iter().for_each(|item| collect(item, out)),
                Literal::Map(entries) => entries.values().for_each(|item| collect(item, out)),
            }
        }

        let mut out = Vec::new();
        for literal in self.fields.values() {
            collect(literal, &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_skips_absent_fields() {
        let decl = Declaration::new("aws_vpc", "main")
            .field("cidr_block", "10.0.0.0/16")
            .optional::<&str>("instance_tenancy", None)
            .optional("enable_dns_support", Some(true));

        assert_eq!(decl.fields.len(), 2);
        assert!(!decl.fields.contains_key("instance_tenancy"));
    }

    #[test]
    fn test_resolve_nested_references() {
        let network = TaskKey::new("Network", "vnet1");
        let literal = Literal::List(vec![
            Literal::reference(&network, "id"),
            Literal::from("static"),
        ]);

        let resolved = literal
            .resolve(&|task, attr| Ok(json!(format!("{}:{}", task.name, attr))))
            .unwrap();

        assert_eq!(resolved, json!(["vnet1:id", "static"]));
    }

    #[test]
    fn test_references_are_collected() {
        let network = TaskKey::new("Network", "vnet1");
        let mut tags = BTreeMap::new();
        tags.insert("Name".to_string(), Literal::reference(&network, "name"));

        let decl = Declaration::new("aws_subnet", "sub1")
            .field("vpc_id", Literal::reference(&network, "id"))
            .field("tags", Literal::Map(tags));

        assert_eq!(decl.references(), vec![&network, &network]);
    }
}
