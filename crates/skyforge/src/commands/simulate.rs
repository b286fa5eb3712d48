use super::{Session, cancel_on_ctrl_c, print_report};
use colored::Colorize;
use skyforge_core::{DeletionPlanner, Executor, RenderTarget};
use std::path::Path;

/// Converge, converge again expecting no changes, then tear down
pub async fn handle(session: &Session, manifest: &Path) -> anyhow::Result<()> {
    let loaded = session.load(manifest)?;
    let cloud = session.cloud(&loaded.cluster);
    let cancel = cancel_on_ctrl_c();
    let executor = Executor::with_cancellation(cancel.clone());

    println!("{}", format!("Converging {}...", loaded.cluster).blue());
    let first = executor
        .run(&cloud, &loaded.graph, &mut RenderTarget::direct())
        .await?;
    print_report(&first);

    println!();
    println!("{}", "Converging again...".blue());
    cloud.clear_calls();
    let second = executor
        .run(&cloud, &loaded.graph, &mut RenderTarget::direct())
        .await?;
    print_report(&second);
    if second.has_changes() || !cloud.mutations().is_empty() {
        anyhow::bail!("second pass was not idempotent");
    }
    println!("{}", "✓ second pass made no changes".green());

    println!();
    println!("{}", "Tearing down...".blue());
    let report = DeletionPlanner::new()
        .with_backoff(session.settings().write_backoff.clone())
        .with_cancellation(cancel)
        .teardown(&cloud, &loaded.cluster)
        .await?;
    for (i, key) in report.deleted.iter().enumerate() {
        println!("  {:>3}. {} {}", i + 1, "delete".red(), key.to_string().cyan());
    }
    for key in &report.skipped_shared {
        println!("       {} {}", "kept".dimmed(), key.to_string().cyan());
    }
    println!("{}", report.to_string().bold());

    Ok(())
}
