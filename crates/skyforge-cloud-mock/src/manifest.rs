//! YAML manifests describing the desired state of a mock cluster
//!
//! ```yaml
//! cluster: dev.example.com
//! networks:
//!   - name: vnet1
//!     cidr: 10.0.0.0/16
//! subnets:
//!   - name: sub1
//!     network: vnet1
//!     cidr: 10.0.1.0/24
//!     zone: zone-a
//! instances:
//!   - name: vm1
//!     subnet: sub1
//!     image: img-ubuntu
//!     instance_type: small
//!     lifecycle: exists_and_warn_if_changes
//! ```
//!
//! Links are written as plain task names; their kind follows from the field.

use crate::error::ManifestError;
use crate::records::{IngressRule, Tags};
use crate::store::MockCloud;
use crate::tasks::{Instance, KeyPair, Network, SecurityGroup, Subnet};
use serde::Deserialize;
use skyforge_core::{Lifecycle, Link, TaskGraph};
use std::path::Path;

pub type Result<T> = std::result::Result<T, ManifestError>;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub cluster: Option<String>,
    #[serde(default)]
    pub networks: Vec<NetworkSpec>,
    #[serde(default)]
    pub subnets: Vec<SubnetSpec>,
    #[serde(default)]
    pub key_pairs: Vec<KeyPairSpec>,
    #[serde(default)]
    pub security_groups: Vec<SecurityGroupSpec>,
    #[serde(default)]
    pub instances: Vec<InstanceSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkSpec {
    pub name: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub cidr: Option<String>,
    pub enable_dns_hostnames: Option<bool>,
    pub tags: Option<Tags>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubnetSpec {
    pub name: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub network: Option<String>,
    pub cidr: Option<String>,
    pub zone: Option<String>,
    pub tags: Option<Tags>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyPairSpec {
    pub name: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub public_key: Option<String>,
    pub tags: Option<Tags>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityGroupSpec {
    pub name: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub network: Option<String>,
    pub description: Option<String>,
    pub ingress: Option<Vec<IngressRule>>,
    pub tags: Option<Tags>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceSpec {
    pub name: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub subnet: Option<String>,
    pub image: Option<String>,
    pub instance_type: Option<String>,
    pub key_pair: Option<String>,
    pub security_groups: Option<Vec<String>>,
    pub tags: Option<Tags>,
}

fn link(kind: &str, name: Option<String>) -> Option<Link> {
    name.map(|name| Link::new(kind, name))
}

fn check_name(kind: &'static str, name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains('/') {
        return Err(ManifestError::Invalid {
            kind,
            name: name.to_string(),
            reason: "names must be non-empty and must not contain '/'".to_string(),
        });
    }
    Ok(())
}

impl Manifest {
    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Number of declared resources
    pub fn len(&self) -> usize {
        self.networks.len()
            + self.subnets.len()
            + self.key_pairs.len()
            + self.security_groups.len()
            + self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the task graph; duplicate names of one kind are rejected
    pub fn into_graph(self) -> Result<TaskGraph<MockCloud>> {
        let mut graph = TaskGraph::new();

        for spec in self.networks {
            check_name("Network", &spec.name)?;
            graph.add(Network {
                lifecycle: spec.lifecycle,
                cidr: spec.cidr,
                enable_dns_hostnames: spec.enable_dns_hostnames,
                tags: spec.tags,
                ..Network::new(spec.name)
            })?;
        }

        for spec in self.subnets {
            check_name("Subnet", &spec.name)?;
            graph.add(Subnet {
                lifecycle: spec.lifecycle,
                network: link("Network", spec.network),
                cidr: spec.cidr,
                zone: spec.zone,
                tags: spec.tags,
                ..Subnet::new(spec.name)
            })?;
        }

        for spec in self.key_pairs {
            check_name("KeyPair", &spec.name)?;
            graph.add(KeyPair {
                lifecycle: spec.lifecycle,
                public_key: spec.public_key,
                tags: spec.tags,
                ..KeyPair::new(spec.name)
            })?;
        }

        for spec in self.security_groups {
            check_name("SecurityGroup", &spec.name)?;
            graph.add(SecurityGroup {
                lifecycle: spec.lifecycle,
                network: link("Network", spec.network),
                description: spec.description,
                ingress: spec.ingress,
                tags: spec.tags,
                ..SecurityGroup::new(spec.name)
            })?;
        }

        for spec in self.instances {
            check_name("Instance", &spec.name)?;
            graph.add(Instance {
                lifecycle: spec.lifecycle,
                subnet: link("Subnet", spec.subnet),
                image: spec.image,
                instance_type: spec.instance_type,
                key_pair: link("KeyPair", spec.key_pair),
                security_groups: spec.security_groups.map(|names| {
                    names
                        .into_iter()
                        .map(|name| Link::new("SecurityGroup", name))
                        .collect()
                }),
                tags: spec.tags,
                ..Instance::new(spec.name)
            })?;
        }

        Ok(graph)
    }
}
