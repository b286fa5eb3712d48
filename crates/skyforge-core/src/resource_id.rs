//! Compound resource identifiers
//!
//! Grammar (keywords match case-insensitively, every segment is non-empty):
//!
//! ```text
//! id       = "/subscriptions/" sub "/resourceGroups/" group [ provider ]
//! provider = "/providers/" namespace "/" type "/" name *( "/" type "/" name )
//! ```
//!
//! For example a subnet:
//! `/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet1/subnets/sub1`
//! has the resource chain `[(virtualNetworks, vnet1), (subnets, sub1)]`.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    pub subscription: String,
    pub resource_group: String,

    /// Provider namespace (e.g. `Microsoft.Network`); absent for group IDs
    pub namespace: Option<String>,

    /// `(type, name)` pairs from the top-level resource down to the child
    /// this ID denotes
    pub resources: Vec<(String, String)>,
}

impl ResourceId {
    pub fn parse(id: &str) -> Result<Self> {
        let malformed = |reason: &str| Error::MalformedResourceId {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        let rest = id
            .strip_prefix('/')
            .ok_or_else(|| malformed("must start with '/'"))?;
        let segments: Vec<&str> = rest.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(malformed("empty path segment"));
        }

        let mut segments = segments.into_iter();
        let subscription =
            keyword_value(&mut segments, "subscriptions").map_err(|r| malformed(&r))?;
        let resource_group =
            keyword_value(&mut segments, "resourceGroups").map_err(|r| malformed(&r))?;

        let mut parsed = ResourceId {
            subscription: subscription.to_string(),
            resource_group: resource_group.to_string(),
            namespace: None,
            resources: Vec::new(),
        };

        let Some(keyword) = segments.next() else {
            return Ok(parsed);
        };
        if !keyword.eq_ignore_ascii_case("providers") {
            return Err(malformed(&format!("expected 'providers', found '{keyword}'")));
        }
        let namespace = segments
            .next()
            .ok_or_else(|| malformed("missing provider namespace"))?;
        parsed.namespace = Some(namespace.to_string());

        let rest: Vec<&str> = segments.collect();
        if rest.is_empty() {
            return Err(malformed("missing resource type and name"));
        }
        if rest.len() % 2 != 0 {
            return Err(malformed("resource type without a name"));
        }
        parsed.resources = rest
            .chunks(2)
            .map(|pair| (pair[0].to_string(), pair[1].to_string()))
            .collect();

        Ok(parsed)
    }

    /// Whether the ID denotes a resource group rather than a resource in it
    pub fn is_resource_group(&self) -> bool {
        self.resources.is_empty()
    }

    /// Name of the resource this ID denotes
    pub fn name(&self) -> &str {
        self.resources
            .last()
            .map(|(_, name)| name.as_str())
            .unwrap_or(self.resource_group.as_str())
    }

    /// Type of the resource this ID denotes (`resourceGroups` for groups)
    pub fn resource_type(&self) -> &str {
        self.resources
            .last()
            .map(|(kind, _)| kind.as_str())
            .unwrap_or("resourceGroups")
    }

    /// Name of the resource of `kind` along the chain, matched case-insensitively
    pub fn name_of(&self, kind: &str) -> Option<&str> {
        self.resources
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(kind))
            .map(|(_, name)| name.as_str())
    }

    /// ID of the parent resource, if this denotes a child resource
    pub fn parent(&self) -> Option<ResourceId> {
        (self.resources.len() > 1).then(|| ResourceId {
            resources: self.resources[..self.resources.len() - 1].to_vec(),
            ..self.clone()
        })
    }
}

fn keyword_value<'a>(
    segments: &mut impl Iterator<Item = &'a str>,
    keyword: &str,
) -> std::result::Result<&'a str, String> {
    match segments.next() {
        Some(found) if found.eq_ignore_ascii_case(keyword) => segments
            .next()
            .ok_or_else(|| format!("missing value after '{keyword}'")),
        Some(found) => Err(format!("expected '{keyword}', found '{found}'")),
        None => Err(format!("missing '{keyword}'")),
    }
}

impl FromStr for ResourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}",
            self.subscription, self.resource_group
        )?;
        if let Some(namespace) = &self.namespace {
            write!(f, "/providers/{namespace}")?;
            for (kind, name) in &self.resources {
                write!(f, "/{kind}/{name}")?;
            }
        }
        Ok(())
    }
}
