//! In-memory cloud provider for Skyforge
//!
//! [`MockCloud`] behaves like a small EC2-style API: networks, subnets, key
//! pairs, security groups and instances, addressed by hierarchical resource
//! IDs. Every call is recorded and faults can be injected, which makes it the
//! provider of choice for tests and dry runs.
//!
//! # Example
//!
//! ```ignore
//! use skyforge_cloud_mock::{Manifest, MockCloud};
//! use skyforge_core::{Executor, RenderTarget};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let cloud = MockCloud::new("dev.example.com");
//! let graph = Manifest::load("cluster.yaml".as_ref())?.into_graph()?;
//!
//! let report = Executor::new()
//!     .run(&cloud, &graph, &mut RenderTarget::direct())
//!     .await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod lister;
pub mod manifest;
pub mod records;
pub mod store;
pub mod tasks;

pub use error::{ManifestError, MockError, Result};
pub use lister::MockDeleter;
pub use manifest::Manifest;
pub use records::{IngressRule, ResourceKind, Tags};
pub use store::{Call, MockCloud, Operation};
pub use tasks::{Instance, KeyPair, Network, SecurityGroup, Subnet};
