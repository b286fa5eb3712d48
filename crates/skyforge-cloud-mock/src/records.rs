//! Resource records held by the mock cloud

use crate::store::MockState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type Tags = BTreeMap<String, String>;

/// Kinds of resources the mock cloud knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Network,
    Subnet,
    KeyPair,
    SecurityGroup,
    Instance,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Network,
        ResourceKind::Subnet,
        ResourceKind::KeyPair,
        ResourceKind::SecurityGroup,
        ResourceKind::Instance,
    ];

    /// Provider namespace used in resource IDs
    pub fn namespace(self) -> &'static str {
        match self {
            ResourceKind::Network | ResourceKind::Subnet | ResourceKind::SecurityGroup => {
                "Mock.Network"
            }
            ResourceKind::KeyPair | ResourceKind::Instance => "Mock.Compute",
        }
    }

    /// Type segment used in resource IDs
    pub fn segment(self) -> &'static str {
        match self {
            ResourceKind::Network => "networks",
            ResourceKind::Subnet => "subnets",
            ResourceKind::KeyPair => "keyPairs",
            ResourceKind::SecurityGroup => "securityGroups",
            ResourceKind::Instance => "instances",
        }
    }

    pub fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.segment().eq_ignore_ascii_case(segment))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Network => "Network",
            ResourceKind::Subnet => "Subnet",
            ResourceKind::KeyPair => "KeyPair",
            ResourceKind::SecurityGroup => "SecurityGroup",
            ResourceKind::Instance => "Instance",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown resource kind {s:?}"))
    }
}

/// A resource stored by the mock cloud
///
/// Records are keyed by name within their kind; the ID is assigned by the
/// store on creation.
pub trait Record: Clone + Serialize + Send + Sync + 'static {
    const KIND: ResourceKind;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    fn name(&self) -> &str;

    fn tags(&self) -> &Tags;

    /// ID of the resource this one is nested under
    fn parent_id(&self) -> Option<&str> {
        None
    }

    /// IDs of other resources this one points at
    fn references(&self) -> Vec<&str>;

    fn table(state: &MockState) -> &BTreeMap<String, Self>;

    fn table_mut(state: &mut MockState) -> &mut BTreeMap<String, Self>;
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub id: String,
    pub name: String,
    pub cidr: String,
    pub enable_dns_hostnames: bool,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubnetRecord {
    pub id: String,
    pub name: String,
    pub network_id: String,
    pub cidr: String,
    pub zone: String,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeyPairRecord {
    pub id: String,
    pub name: String,
    pub public_key: String,
    pub fingerprint: String,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IngressRule {
    pub protocol: String,
    pub port: u16,
    pub cidr: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SecurityGroupRecord {
    pub id: String,
    pub name: String,
    pub network_id: String,
    pub description: String,
    pub ingress: Vec<IngressRule>,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: String,
    pub name: String,
    pub subnet_id: String,
    pub image: String,
    pub instance_type: String,
    pub key_pair_id: Option<String>,
    pub security_group_ids: Vec<String>,
    pub tags: Tags,
}

macro_rules! record_identity {
    ($kind:expr, $table:ident) => {
        const KIND: ResourceKind = $kind;

        fn id(&self) -> &str {
            &self.id
        }

        fn set_id(&mut self, id: String) {
            self.id = id;
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn tags(&self) -> &Tags {
            &self.tags
        }

        fn table(state: &MockState) -> &BTreeMap<String, Self> {
            &state.$table
        }

        fn table_mut(state: &mut MockState) -> &mut BTreeMap<String, Self> {
            &mut state.$table
        }
    };
}

impl Record for NetworkRecord {
    record_identity!(ResourceKind::Network, networks);

    fn references(&self) -> Vec<&str> {
        Vec::new()
    }
}

impl Record for SubnetRecord {
    record_identity!(ResourceKind::Subnet, subnets);

    fn parent_id(&self) -> Option<&str> {
        Some(self.network_id.as_str())
    }

    fn references(&self) -> Vec<&str> {
        vec![self.network_id.as_str()]
    }
}

impl Record for KeyPairRecord {
    record_identity!(ResourceKind::KeyPair, key_pairs);

    fn references(&self) -> Vec<&str> {
        Vec::new()
    }
}

impl Record for SecurityGroupRecord {
    record_identity!(ResourceKind::SecurityGroup, security_groups);

    fn references(&self) -> Vec<&str> {
        vec![self.network_id.as_str()]
    }
}

impl Record for InstanceRecord {
    record_identity!(ResourceKind::Instance, instances);

    fn references(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = vec![self.subnet_id.as_str()];
        refs.extend(self.key_pair_id.as_deref());
        refs.extend(self.security_group_ids.iter().map(String::as_str));
        refs
    }
}

/// Fingerprint of a public key, formatted as colon-separated hex
pub fn fingerprint(public_key: &str) -> String {
    // 64-bit FNV-1a
    let hash = public_key
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
        });
    hash.to_be_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}
