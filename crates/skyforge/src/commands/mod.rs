pub mod order;
pub mod render;
pub mod simulate;

use anyhow::Context as _;
use colored::Colorize;
use skyforge_cloud_mock::{Manifest, MockCloud};
use skyforge_config::EngineConfig;
use skyforge_core::{ActionType, ConvergeReport, TaskGraph};
use std::path::Path;
use tokio_util::sync::CancellationToken;

const DEFAULT_CLUSTER: &str = "skyforge.local";

/// Settings shared by every command of one invocation
pub struct Session {
    settings: EngineConfig,
    cluster: Option<String>,
}

/// A manifest loaded into a task graph
pub struct Loaded {
    pub cluster: String,
    pub graph: TaskGraph<MockCloud>,
}

impl Session {
    pub fn new(settings: EngineConfig, cluster: Option<String>) -> Self {
        Self { settings, cluster }
    }

    pub fn settings(&self) -> &EngineConfig {
        &self.settings
    }

    /// Load `path` and resolve the cluster name: flag, manifest, settings
    pub fn load(&self, path: &Path) -> anyhow::Result<Loaded> {
        let manifest = Manifest::load(path)
            .with_context(|| format!("could not load manifest {}", path.display()))?;
        let cluster = self
            .cluster
            .clone()
            .or_else(|| manifest.cluster.clone())
            .or_else(|| self.settings.cluster_name.clone())
            .unwrap_or_else(|| DEFAULT_CLUSTER.to_string());
        tracing::debug!(cluster = %cluster, resources = manifest.len(), "loaded manifest");

        Ok(Loaded {
            cluster,
            graph: manifest.into_graph()?,
        })
    }

    /// Empty in-memory cloud using the configured backoff policies
    pub fn cloud(&self, cluster: &str) -> MockCloud {
        MockCloud::new(cluster).with_backoff(
            self.settings.read_backoff.clone(),
            self.settings.write_backoff.clone(),
        )
    }
}

/// Token cancelled on Ctrl-C
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            child.cancel();
        }
    });
    token
}

pub fn print_report(report: &ConvergeReport) {
    for action in &report.actions {
        let label = match action.action_type {
            ActionType::Create => "+ create".green(),
            ActionType::Update => "~ update".yellow(),
            ActionType::NoOp => "  no-op ".dimmed(),
            ActionType::Warned => "! warned".red(),
            ActionType::Skipped => "- skip  ".dimmed(),
        };
        if action.changed_fields.is_empty() {
            println!("  {} {}", label, action.task.to_string().cyan());
        } else {
            println!(
                "  {} {} ({})",
                label,
                action.task.to_string().cyan(),
                action.changed_fields.join(", ")
            );
        }
    }
    println!("{}", report.summary().to_string().bold());
}
